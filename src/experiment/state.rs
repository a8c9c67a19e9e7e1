//! Measurement run state.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Lifecycle of the scan sequencer.
///
/// ```text
/// Idle ──run──> Running ──> Completed
///                  │
///                  └──capture failure──> Failed
/// ```
///
/// `Completed` and `Failed` are terminal for a run; the next run starts again
/// from either.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SequencerState {
    /// No run started yet, or the last protocol was rejected.
    Idle,
    /// A measurement is executing.
    Running,
    /// The last run captured every frame.
    Completed,
    /// The last run ended on a fatal error.
    Failed,
}

impl std::fmt::Display for SequencerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SequencerState::Idle => write!(f, "Idle"),
            SequencerState::Running => write!(f, "Running"),
            SequencerState::Completed => write!(f, "Completed"),
            SequencerState::Failed => write!(f, "Failed"),
        }
    }
}

/// Observable status of the sequencer.
#[derive(Debug, Clone, PartialEq)]
pub struct SequencerStatus {
    /// Lifecycle state.
    pub state: SequencerState,
    /// Identifier of the current or last run
    pub run_id: Option<Uuid>,
    /// Frames written so far in the current or last run
    pub frames_captured: usize,
    /// Message of the error that ended the last run, or of a rejected protocol
    pub last_error: Option<String>,
}

impl Default for SequencerStatus {
    fn default() -> Self {
        Self {
            state: SequencerState::Idle,
            run_id: None,
            frames_captured: 0,
            last_error: None,
        }
    }
}

/// Outcome of a completed measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Identifier logged on every event of the run.
    pub run_id: Uuid,
    /// Dataset root the run wrote to.
    pub run_dir: PathBuf,
    /// Frames written, backgrounds included.
    pub frames_captured: usize,
    /// Actuator and illumination calls that failed and were skipped
    pub hardware_faults: usize,
    /// Moves rejected because the angle was outside the servo range
    pub skipped_moves: usize,
}
