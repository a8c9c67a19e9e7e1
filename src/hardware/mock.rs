//! Mock Hardware Implementations
//!
//! Simulated rig ports for running the capture protocol without a bench.
//! Every call is appended to a shared [`RigJournal`], so tests can assert on the
//! exact interleaving of moves, LED switches and captures across all three ports.
//!
//! # Available Mocks
//!
//! - `MockActuator` - accepts moves, optionally failing on chosen channels
//! - `MockIllumination` - accepts LED switches, optionally failing on chosen addresses
//! - `MockImager` - writes synthetic 16-bit frames, optionally failing the n-th capture
//! - `MockRig` - the three above wired to one journal
//!
//! All mocks complete immediately; settle times belong to the caller.

use anyhow::anyhow;
use async_trait::async_trait;
use ndarray::Array2;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::data::frame_io;
use crate::error::{ActuatorError, BusError, CaptureError};
use crate::hardware::capabilities::{
    angle_in_range, Actuator, CameraControls, FrameSize, Illumination, Imager, ImagerMode,
};

/// One call made against a mock port.
#[derive(Debug, Clone, PartialEq)]
pub enum RigEvent {
    /// `Actuator::move_axis`
    Move {
        /// Actuator channel.
        channel: u8,
        /// Target angle in degrees.
        angle: f64,
    },
    /// `Illumination::set_channel`
    Led {
        /// Relay register.
        address: u8,
        /// Requested state.
        on: bool,
    },
    /// `Imager::configure`
    Configure {
        /// Selected mode.
        mode: ImagerMode,
        /// Selected geometry.
        size: FrameSize,
    },
    /// `Imager::apply_controls`
    Controls(CameraControls),
    /// `Imager::start`
    Start,
    /// `Imager::stop`
    Stop,
    /// Successful `Imager::capture_to`
    Capture(PathBuf),
}

/// Shared, ordered record of port calls.
#[derive(Debug, Clone, Default)]
pub struct RigJournal {
    events: Arc<RwLock<Vec<RigEvent>>>,
}

impl RigJournal {
    /// Empty journal.
    pub fn new() -> Self {
        Self::default()
    }

    async fn record(&self, event: RigEvent) {
        self.events.write().await.push(event);
    }

    /// Snapshot of every call so far.
    pub async fn events(&self) -> Vec<RigEvent> {
        self.events.read().await.clone()
    }

    /// Paths of completed captures, in order.
    pub async fn captures(&self) -> Vec<PathBuf> {
        self.events
            .read()
            .await
            .iter()
            .filter_map(|e| match e {
                RigEvent::Capture(path) => Some(path.clone()),
                _ => None,
            })
            .collect()
    }

    /// Angles sent to `channel`, in order.
    pub async fn moves_on(&self, channel: u8) -> Vec<f64> {
        self.events
            .read()
            .await
            .iter()
            .filter_map(|e| match e {
                RigEvent::Move { channel: c, angle } if *c == channel => Some(*angle),
                _ => None,
            })
            .collect()
    }

    /// True when no call was recorded.
    pub async fn is_empty(&self) -> bool {
        self.events.read().await.is_empty()
    }
}

// =============================================================================
// MockActuator
// =============================================================================

/// Mock servo bank.
pub struct MockActuator {
    journal: RigJournal,
    failing_channels: HashSet<u8>,
}

impl MockActuator {
    /// Healthy actuator.
    pub fn new(journal: RigJournal) -> Self {
        Self {
            journal,
            failing_channels: HashSet::new(),
        }
    }

    /// Make every move on `channel` fail with a hardware error.
    pub fn with_failing_channel(mut self, channel: u8) -> Self {
        self.failing_channels.insert(channel);
        self
    }
}

#[async_trait]
impl Actuator for MockActuator {
    async fn move_axis(&self, channel: u8, angle_deg: f64) -> Result<(), ActuatorError> {
        if !angle_in_range(angle_deg) {
            return Err(ActuatorError::OutOfRange { angle: angle_deg });
        }
        self.journal
            .record(RigEvent::Move {
                channel,
                angle: angle_deg,
            })
            .await;
        if self.failing_channels.contains(&channel) {
            return Err(ActuatorError::Hardware {
                channel,
                source: anyhow!("simulated servo fault"),
            });
        }
        Ok(())
    }
}

// =============================================================================
// MockIllumination
// =============================================================================

/// Mock LED relay board.
pub struct MockIllumination {
    journal: RigJournal,
    failing_addresses: HashSet<u8>,
}

impl MockIllumination {
    /// Healthy LED board.
    pub fn new(journal: RigJournal) -> Self {
        Self {
            journal,
            failing_addresses: HashSet::new(),
        }
    }

    /// Fail every write to `address`, after journaling it.
    pub fn with_failing_address(mut self, address: u8) -> Self {
        self.failing_addresses.insert(address);
        self
    }
}

#[async_trait]
impl Illumination for MockIllumination {
    async fn set_channel(&self, address: u8, on: bool) -> Result<(), BusError> {
        self.journal.record(RigEvent::Led { address, on }).await;
        if self.failing_addresses.contains(&address) {
            return Err(BusError {
                address,
                source: anyhow!("simulated bus NACK"),
            });
        }
        Ok(())
    }
}

// =============================================================================
// MockImager
// =============================================================================

/// Pixel generator: `(frame path, row, col) -> counts`.
pub type FramePattern = Arc<dyn Fn(&Path, usize, usize) -> u16 + Send + Sync>;

#[derive(Debug, Clone, Copy)]
struct ImagerState {
    mode: ImagerMode,
    size: FrameSize,
    running: bool,
    still_frames: usize,
}

/// Mock camera writing synthetic frames to disk.
///
/// Frames have the geometry of the last `configure` call. Pixel values come from
/// the pattern, which sees the target path so a test can give each wavelength or
/// polarization its own value. Each capture switches to [`ImagerMode::Still`] for
/// the frame and returns to the configured mode afterwards.
pub struct MockImager {
    journal: RigJournal,
    state: RwLock<ImagerState>,
    pattern: FramePattern,
    fail_capture_at: Option<usize>,
    captures: AtomicUsize,
}

impl MockImager {
    /// Imager producing uniform frames of `level` counts.
    pub fn new(journal: RigJournal, level: u16) -> Self {
        Self::with_pattern(journal, Arc::new(move |_: &Path, _: usize, _: usize| level))
    }

    /// Imager producing frames from `pattern`.
    pub fn with_pattern(journal: RigJournal, pattern: FramePattern) -> Self {
        Self {
            journal,
            state: RwLock::new(ImagerState {
                mode: ImagerMode::Preview,
                size: FrameSize::new(8, 6),
                running: false,
                still_frames: 0,
            }),
            pattern,
            fail_capture_at: None,
            captures: AtomicUsize::new(0),
        }
    }

    /// Fail the capture with zero-based index `n` (and every one after it).
    pub fn failing_capture(mut self, n: usize) -> Self {
        self.fail_capture_at = Some(n);
        self
    }

    /// True between `start` and `stop`.
    pub async fn is_running(&self) -> bool {
        self.state.read().await.running
    }

    /// Mode of the last `configure`.
    pub async fn mode(&self) -> ImagerMode {
        self.state.read().await.mode
    }

    /// Frames written in still mode so far.
    pub async fn still_frames(&self) -> usize {
        self.state.read().await.still_frames
    }
}

#[async_trait]
impl Imager for MockImager {
    async fn configure(&self, mode: ImagerMode, size: FrameSize) -> Result<(), CaptureError> {
        {
            let mut state = self.state.write().await;
            state.mode = mode;
            state.size = size;
        }
        self.journal.record(RigEvent::Configure { mode, size }).await;
        Ok(())
    }

    async fn apply_controls(&self, controls: &CameraControls) -> Result<(), CaptureError> {
        self.journal
            .record(RigEvent::Controls(controls.clone()))
            .await;
        Ok(())
    }

    async fn start(&self) -> Result<(), CaptureError> {
        self.state.write().await.running = true;
        self.journal.record(RigEvent::Start).await;
        Ok(())
    }

    async fn stop(&self) -> Result<(), CaptureError> {
        self.state.write().await.running = false;
        self.journal.record(RigEvent::Stop).await;
        Ok(())
    }

    async fn capture_to(&self, path: &Path) -> Result<(), CaptureError> {
        let state = *self.state.read().await;
        if !state.running {
            return Err(CaptureError::NotStarted);
        }

        let index = self.captures.fetch_add(1, Ordering::SeqCst);
        if self.fail_capture_at.is_some_and(|n| index >= n) {
            return Err(CaptureError::Backend(anyhow!(
                "simulated sensor timeout on capture {index}"
            )));
        }

        self.state.write().await.mode = ImagerMode::Still;
        let (rows, cols) = state.size.shape();
        let pixels = Array2::from_shape_fn((rows, cols), |(r, c)| (self.pattern)(path, r, c));
        let written = frame_io::write_frame(&pixels, path);
        {
            let mut current = self.state.write().await;
            current.mode = state.mode;
            if written.is_ok() {
                current.still_frames += 1;
            }
        }
        written?;

        self.journal.record(RigEvent::Capture(path.to_path_buf())).await;
        Ok(())
    }
}

// =============================================================================
// MockRig
// =============================================================================

/// Mock actuator, illumination and imager sharing one journal.
pub struct MockRig {
    /// Servo axes.
    pub actuator: Arc<MockActuator>,
    /// LED board.
    pub illumination: Arc<MockIllumination>,
    /// Camera.
    pub imager: Arc<MockImager>,
    /// Journal shared by the three mocks.
    pub journal: RigJournal,
}

impl MockRig {
    /// Healthy rig producing uniform frames of `level` counts.
    pub fn new(level: u16) -> Self {
        let journal = RigJournal::new();
        Self::from_parts(
            MockActuator::new(journal.clone()),
            MockIllumination::new(journal.clone()),
            MockImager::new(journal.clone(), level),
            journal,
        )
    }

    /// Assemble from individually configured mocks. They must share `journal`.
    pub fn from_parts(
        actuator: MockActuator,
        illumination: MockIllumination,
        imager: MockImager,
        journal: RigJournal,
    ) -> Self {
        Self {
            actuator: Arc::new(actuator),
            illumination: Arc::new(illumination),
            imager: Arc::new(imager),
            journal,
        }
    }
}
