//! Rig Hardware Ports
//!
//! This module defines the narrow capability traits the acquisition core needs from
//! the rig. Instead of driving servos, relays and the camera inline, the sequencer is
//! handed three ports and only ever talks to them:
//!
//! - [`Actuator`] moves one mechanical axis (sampler stage, polarizer, LED carousel)
//! - [`Illumination`] switches one LED channel on or off
//! - [`Imager`] configures the camera and writes frames to disk
//!
//! This approach enables:
//! - Swapping real drivers for simulated ones without touching sequencing logic
//! - Explicit, typed failures per call, so continue-vs-abort is a visible decision
//! - Testing the capture protocol by inspecting what each port was asked to do
//!
//! # Design Philosophy
//!
//! Each port trait:
//! - Is async (uses #[async_trait])
//! - Is thread-safe (requires Send + Sync)
//! - Returns its own error type rather than `anyhow::Result`
//! - Blocks (awaits) until the hardware has confirmed the operation
//!
//! # Example
//!
//! ```rust,ignore
//! async fn park<A: Actuator + ?Sized>(actuator: &A, bindings: &AxisBindings) {
//!     for axis in Axis::ALL {
//!         if let Err(e) = actuator.move_axis(bindings.channel(axis), 0.0).await {
//!             tracing::warn!(%axis, error = %e, "Failed to park axis");
//!         }
//!     }
//! }
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::error::{ActuatorError, BusError, CaptureError};

/// Lowest angle a servo axis accepts, in degrees.
pub const MIN_ANGLE_DEG: f64 = 0.0;
/// Highest angle a servo axis accepts, in degrees.
pub const MAX_ANGLE_DEG: f64 = 180.0;

/// Whether `angle` lies inside the servo travel range.
pub fn angle_in_range(angle: f64) -> bool {
    (MIN_ANGLE_DEG..=MAX_ANGLE_DEG).contains(&angle)
}

/// Mechanical axes of the rig.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    /// Sample stage rotation.
    Sampler,
    /// Polarizing filter rotation (0° copol, 90° depol).
    Polarizer,
    /// Carousel positioning one LED in front of the sample.
    LedCarousel,
}

impl Axis {
    /// All axes in binding order.
    pub const ALL: [Axis; 3] = [Axis::Sampler, Axis::Polarizer, Axis::LedCarousel];
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::Sampler => write!(f, "sampler"),
            Axis::Polarizer => write!(f, "polarizer"),
            Axis::LedCarousel => write!(f, "led_carousel"),
        }
    }
}

/// Capture mode of the imager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImagerMode {
    /// Low-latency streaming mode used while aligning the sample.
    Preview,
    /// Full-quality single-frame mode used for every stored frame.
    Still,
}

/// Frame geometry in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSize {
    /// Columns.
    pub width: u32,
    /// Rows.
    pub height: u32,
}

impl FrameSize {
    /// Size from width and height in pixels.
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Shape as `(rows, cols)`, the order used by image arrays.
    pub fn shape(&self) -> (usize, usize) {
        (self.height as usize, self.width as usize)
    }
}

impl fmt::Display for FrameSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Camera controls applied before a measurement and persisted with the dataset.
///
/// Field names follow the camera stack's control names when written to the
/// control record (`ExposureTime`, `AnalogueGain`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraControls {
    /// Automatic white balance. Kept off so LED channels are comparable.
    pub awb_enable: bool,
    /// Red/blue colour gains used when white balance is off.
    pub colour_gains: (f64, f64),
    /// Exposure time in microseconds.
    pub exposure_time: i64,
    /// Analogue gain in dB.
    pub analogue_gain: f64,
    /// Autofocus mode (0 = manual).
    pub af_mode: i64,
    /// Autofocus trigger (0 = idle).
    pub af_trigger: i64,
    /// Manual lens position in dioptres.
    pub lens_position: f64,
    /// Brightness offset, -1 to 1.
    pub brightness: f64,
    /// Contrast multiplier.
    pub contrast: f64,
    /// Colour saturation multiplier.
    pub saturation: f64,
    /// Sharpening strength.
    pub sharpness: f64,
}

impl Default for CameraControls {
    fn default() -> Self {
        Self {
            awb_enable: false,
            colour_gains: (1.0, 1.0),
            exposure_time: 100_000,
            analogue_gain: 1.0,
            af_mode: 0,
            af_trigger: 0,
            lens_position: 1.0,
            brightness: 0.0,
            contrast: 1.0,
            saturation: 1.0,
            sharpness: 1.0,
        }
    }
}

/// Port: Motion Control
///
/// Moves one mechanical axis, identified by its bound channel, to an absolute angle.
///
/// # Contract
/// - Angles are degrees in [0, 180]; callers reject out-of-range values before
///   invoking the port, implementations reject them again with
///   [`ActuatorError::OutOfRange`]
/// - Returns once the motion command has been executed
/// - Settling after motion is the caller's responsibility
#[async_trait]
pub trait Actuator: Send + Sync {
    /// Move the axis bound to `channel` to `angle_deg`.
    async fn move_axis(&self, channel: u8, angle_deg: f64) -> Result<(), ActuatorError>;
}

/// Port: LED Switching
///
/// # Contract
/// - `on == true` means the LED emits light, regardless of how the underlying
///   relay board encodes it
/// - Implementations translate to the physical logic level internally
#[async_trait]
pub trait Illumination: Send + Sync {
    /// Turn the LED at `address` on or off.
    async fn set_channel(&self, address: u8, on: bool) -> Result<(), BusError>;
}

/// Port: Image Capture
///
/// # Contract
/// - `configure` selects the mode and frame geometry used by `start`
/// - `capture_to` switches to still mode for a single frame, writes it to `path`
///   and returns once the file exists
/// - `stop` is idempotent
#[async_trait]
pub trait Imager: Send + Sync {
    /// Select capture mode and frame geometry.
    async fn configure(&self, mode: ImagerMode, size: FrameSize) -> Result<(), CaptureError>;

    /// Apply exposure, gain and focus controls.
    async fn apply_controls(&self, controls: &CameraControls) -> Result<(), CaptureError>;

    /// Start the configured mode.
    async fn start(&self) -> Result<(), CaptureError>;

    /// Stop any active mode.
    async fn stop(&self) -> Result<(), CaptureError>;

    /// Capture one still frame into `path`.
    async fn capture_to(&self, path: &Path) -> Result<(), CaptureError>;
}
