//! Hyperspectral analysis.
//!
//! Reference calibration and cube reconstruction run synchronously on datasets
//! already on disk; nothing here touches hardware.

pub mod calibration;
pub mod flatfield;
pub mod products;
pub mod reconstruction;

pub use calibration::{ReferenceCalibration, ReferenceCalibrator};
pub use reconstruction::{CubeReconstructor, ReflectanceCube};
