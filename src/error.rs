//! Custom error types for the application.
//!
//! This module defines the primary error type, `HyperPiError`, for the whole crate.
//! Using the `thiserror` crate, it provides a centralized and consistent way to handle
//! the different kinds of errors that can occur, from parsing an angle protocol to
//! rebuilding a reflectance cube from disk.
//!
//! ## Error Hierarchy
//!
//! `HyperPiError` consolidates the failures the core can raise:
//!
//! - **`MalformedProtocol`**: A textual angle protocol could not be parsed. Fails the
//!   parse, never a run.
//! - **`UnsupportedProtocol`**: The polarizer protocol is not the dual `[0.0, 90.0]`
//!   copol/depol protocol. Raised before any hardware is touched.
//! - **`CaptureFailed`**: The imager could not write a frame. Fatal to a run, the
//!   partial dataset stays on disk.
//! - **`CorruptMetadata`** / **`InvalidMetadata`**: A control record could not be read
//!   back, or a value cannot be represented in the on-disk format.
//! - **`CalibrationShapeMismatch`**, **`DegenerateReference`**: Reference data that
//!   cannot produce a flat-field map.
//! - **`IncompleteDataset`**: Copol/Depol folders do not pair up.
//! - **`Io`**, **`Image`**, **`Config`**: Wrapped errors from the standard library,
//!   the `image` crate and `figment`.
//!
//! Hardware ports do not return `HyperPiError`. They have their own narrow error types
//! (`ActuatorError`, `BusError`, `CaptureError`) so the sequencer can decide, per call,
//! whether a failure is logged and skipped or propagated.

use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, HyperPiError>;

/// Primary error type for acquisition and reconstruction.
#[derive(Error, Debug)]
pub enum HyperPiError {
    /// Text protocol that cannot be parsed.
    #[error("Malformed angle protocol '{input}': {reason}")]
    MalformedProtocol {
        /// Text as typed.
        input: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Polarizer protocol other than the dual copol/depol pair.
    #[error("Unsupported polarizer protocol {0:?}: only [0.0, 90.0] is supported")]
    UnsupportedProtocol(Vec<f64>),

    /// Imager failed to write a frame; ends the run.
    #[error("Capture to {path:?} failed: {source}")]
    CaptureFailed {
        /// Frame that was being written.
        path: PathBuf,
        /// Imager error.
        #[source]
        source: CaptureError,
    },

    /// Control record missing, unreadable or lacking a required key.
    #[error("Corrupt metadata in {path:?}: {reason}")]
    CorruptMetadata {
        /// Control record file.
        path: PathBuf,
        /// What could not be read.
        reason: String,
    },

    /// Value that the control record format cannot hold.
    #[error("Metadata cannot be encoded: {0}")]
    InvalidMetadata(String),

    /// Frame or flat field whose shape differs from the expected geometry.
    #[error("Calibration shape mismatch: expected {expected:?}, found {found:?} in {path:?}")]
    CalibrationShapeMismatch {
        /// Expected `(rows, cols)`.
        expected: (usize, usize),
        /// Actual `(rows, cols)`.
        found: (usize, usize),
        /// Offending frame or dataset.
        path: PathBuf,
    },

    /// Reference data that normalizes to zero or a non-finite value.
    #[error("Degenerate reference data: {0}")]
    DegenerateReference(String),

    /// Dataset whose folders or frames are missing or unpaired.
    #[error("Incomplete dataset in {path:?}: {reason}")]
    IncompleteDataset {
        /// Dataset root or missing file.
        path: PathBuf,
        /// What is missing.
        reason: String,
    },

    /// Index, mask or polygon that selects nothing valid in a cube.
    #[error("Invalid selection: {0}")]
    InvalidSelection(String),

    /// Configuration that loaded but failed validation.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Configuration that could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// Filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Frame decode or encode failure.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl From<figment::Error> for HyperPiError {
    fn from(value: figment::Error) -> Self {
        HyperPiError::Config(Box::new(value))
    }
}

impl HyperPiError {
    /// Whether a run or reconstruction can reasonably continue after this error.
    ///
    /// Only protocol mistakes are recoverable: the operator fixes the text and
    /// tries again. Everything else leaves a dataset or calibration unusable.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            HyperPiError::MalformedProtocol { .. }
                | HyperPiError::UnsupportedProtocol(_)
                | HyperPiError::InvalidSelection(_)
        )
    }
}

/// Failure reported by an [`Actuator`](crate::hardware::Actuator) port.
///
/// Non-fatal to a run: the sequencer logs it and the axis position becomes unverified.
#[derive(Error, Debug)]
pub enum ActuatorError {
    /// Angle outside the servo travel; never sent to the hardware.
    #[error("Angle {angle}° outside the servo range [0, 180]")]
    OutOfRange {
        /// Requested angle in degrees.
        angle: f64,
    },

    /// Driver failure on `channel`.
    #[error("Actuator channel {channel} failed: {source}")]
    Hardware {
        /// Actuator channel that failed.
        channel: u8,
        /// Driver error.
        #[source]
        source: anyhow::Error,
    },
}

/// Failure reported by an [`Illumination`](crate::hardware::Illumination) port.
#[derive(Error, Debug)]
#[error("Illumination bus write to channel {address} failed: {source}")]
pub struct BusError {
    /// Relay register that was being written.
    pub address: u8,
    /// Underlying bus failure.
    #[source]
    pub source: anyhow::Error,
}

/// Failure reported by an [`Imager`](crate::hardware::Imager) port.
#[derive(Error, Debug)]
pub enum CaptureError {
    /// Capture requested before `start`.
    #[error("Imager is not started")]
    NotStarted,

    /// Camera back-end failure.
    #[error("Imager backend error: {0}")]
    Backend(#[source] anyhow::Error),

    /// Frame file could not be written.
    #[error("Failed to write frame: {0}")]
    Io(#[from] std::io::Error),

    /// Frame could not be encoded.
    #[error("Failed to encode frame: {0}")]
    Encode(#[from] image::ImageError),
}
