//! Acquisition control.
//!
//! [`ScanSequencer`] runs one measurement protocol against the rig ports.
//! [`RigSession`] wraps it with the live preview and run-folder naming.

pub mod preview;
pub mod sequencer;
pub mod session;
pub mod state;

pub use preview::PreviewWorker;
pub use sequencer::{RigPorts, ScanSequencer};
pub use session::RigSession;
pub use state::{RunSummary, SequencerState, SequencerStatus};
