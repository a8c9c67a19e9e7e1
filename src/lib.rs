//! # HyperPi Core Library
//!
//! Acquisition and reconstruction core for the HyperPi hyperspectral rig: a
//! camera looking at a sample on a rotating sampler stage, lit in turn by a
//! carousel of narrow-band LEDs through a rotating linear polarizer.
//!
//! ## Crate Structure
//!
//! - **`config`**: Layered rig configuration (`RigConfig`) loaded with `figment` from
//!   defaults, `hyperpi.toml` and `HYPERPI_` environment variables.
//! - **`error`**: The `HyperPiError` enum and the narrow per-port error types.
//! - **`hardware`**: The `Actuator`, `Illumination` and `Imager` ports, the servo and
//!   relay drivers behind them, and journaling mocks.
//! - **`protocol`**: Parsing of textual angle protocols (`"0-90-10"`, `"0,90"`).
//! - **`data`**: Dataset layout on disk, the control record and frame files.
//! - **`experiment`**: The scan sequencer, live preview and rig session.
//! - **`analysis`**: Reference calibration, flat-field fitting, cube reconstruction
//!   and derived products.
//! - **`tracing_setup`**: Structured logging initialization.

pub mod analysis;
pub mod config;
pub mod data;
pub mod error;
pub mod experiment;
pub mod hardware;
pub mod protocol;
pub mod tracing_setup;

pub use config::RigConfig;
pub use error::{AppResult, HyperPiError};
