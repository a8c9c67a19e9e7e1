//! Rig Configuration using Figment
//!
//! This module provides strongly-typed configuration for the rig and the analysis
//! pipeline. Configuration is layered:
//! 1. Built-in defaults (the bench as it is wired today)
//! 2. A TOML file (`hyperpi.toml` by default)
//! 3. Environment variables prefixed with `HYPERPI_`, nested with `__`
//!
//! The struct is built once and handed to the sequencer and session by reference;
//! nothing mutates channel or pin bindings at runtime.
//!
//! # Example
//! ```no_run
//! use hyperpi::config::RigConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RigConfig::load_from("hyperpi.toml")?;
//! config.validate()?;
//! println!("{} LED channels", config.illumination.channels.len());
//! # Ok(())
//! # }
//! ```
//!
//! Environment override example: `HYPERPI_AXES__SAMPLER=32`.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crate::error::{AppResult, HyperPiError};
use crate::hardware::capabilities::{angle_in_range, Axis, CameraControls, FrameSize};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "hyperpi.toml";

/// Top-level rig configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RigConfig {
    /// Logging settings
    pub logging: LoggingConfig,
    /// Physical channel bound to each axis
    pub axes: AxisBindings,
    /// LED bus and wavelength catalogue
    pub illumination: IlluminationConfig,
    /// Frame geometry and camera controls
    pub camera: CameraConfig,
    /// Settle and hold intervals of the capture protocol
    pub timing: TimingConfig,
    /// Dataset file naming
    pub storage: StorageConfig,
    /// Reference calibration settings
    pub analysis: AnalysisConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error)
    pub level: String,
    /// Output format (pretty, compact, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// Channel (board pin) each axis servo is wired to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AxisBindings {
    /// Sample rotation stage.
    pub sampler: u8,
    /// Linear polarizer in front of the lens.
    pub polarizer: u8,
    /// Carousel placing one LED in the beam.
    pub led_carousel: u8,
}

impl Default for AxisBindings {
    fn default() -> Self {
        Self {
            sampler: 40,
            polarizer: 38,
            led_carousel: 36,
        }
    }
}

impl AxisBindings {
    /// Channel bound to `axis`.
    pub fn channel(&self, axis: Axis) -> u8 {
        match axis {
            Axis::Sampler => self.sampler,
            Axis::Polarizer => self.polarizer,
            Axis::LedCarousel => self.led_carousel,
        }
    }
}

/// One LED of the wavelength catalogue.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LedChannel {
    /// Relay register switching this LED.
    pub address: u8,
    /// Nominal wavelength in nm, used to name frames.
    pub wavelength_nm: u32,
    /// Carousel angle placing this LED in front of the sample.
    pub carousel_angle: f64,
}

/// LED bus and catalogue configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IlluminationConfig {
    /// I2C address of the relay controller.
    pub bus_address: u8,
    /// Ordered wavelength catalogue; capture order follows this list.
    pub channels: Vec<LedChannel>,
}

const DEFAULT_LED_ADDRESSES: [u8; 15] = [2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 14, 15, 16, 17];
const DEFAULT_WAVELENGTHS_NM: [u32; 15] = [
    445, 490, 520, 560, 580, 600, 620, 660, 680, 730, 800, 850, 880, 940, 980,
];
const CAROUSEL_STEP_DEG: f64 = 12.0;

impl Default for IlluminationConfig {
    fn default() -> Self {
        let channels = DEFAULT_LED_ADDRESSES
            .iter()
            .zip(DEFAULT_WAVELENGTHS_NM.iter())
            .enumerate()
            .map(|(i, (&address, &wavelength_nm))| LedChannel {
                address,
                wavelength_nm,
                carousel_angle: CAROUSEL_STEP_DEG * i as f64,
            })
            .collect();
        Self {
            bus_address: 0x08,
            channels,
        }
    }
}

impl IlluminationConfig {
    /// Wavelengths in catalogue order.
    pub fn wavelengths(&self) -> Vec<u32> {
        self.channels.iter().map(|c| c.wavelength_nm).collect()
    }
}

/// Camera configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Exposure, gain and focus applied before capturing.
    pub controls: CameraControls,
    /// Time the sensor runs before the first capture of a measurement.
    #[serde(with = "humantime_serde")]
    pub warmup: Duration,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            controls: CameraControls::default(),
            warmup: Duration::from_secs(7),
        }
    }
}

impl CameraConfig {
    /// Configured frame geometry.
    pub fn frame_size(&self) -> FrameSize {
        FrameSize::new(self.width, self.height)
    }
}

/// Settle and hold intervals
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Wait after moving an axis before capturing.
    #[serde(with = "humantime_serde")]
    pub settle: Duration,
    /// How long a servo holds its PWM pulse before releasing.
    #[serde(with = "humantime_serde")]
    pub servo_pulse: Duration,
    /// Pause after each capture.
    #[serde(with = "humantime_serde")]
    pub capture_cooldown: Duration,
    /// Pause after switching an LED off.
    #[serde(with = "humantime_serde")]
    pub channel_off_delay: Duration,
    /// Interval at which the preview worker checks its stop flag.
    #[serde(with = "humantime_serde")]
    pub preview_poll: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            settle: Duration::from_secs(1),
            servo_pulse: Duration::from_millis(500),
            capture_cooldown: Duration::from_millis(500),
            channel_off_delay: Duration::from_secs(1),
            preview_poll: Duration::from_secs(10),
        }
    }
}

impl TimingConfig {
    /// All intervals zeroed. Used with simulated hardware.
    pub fn immediate() -> Self {
        Self {
            settle: Duration::ZERO,
            servo_pulse: Duration::ZERO,
            capture_cooldown: Duration::ZERO,
            channel_off_delay: Duration::ZERO,
            preview_poll: Duration::from_millis(5),
        }
    }
}

/// Dataset naming configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Extension of frame files (lossless raster format).
    pub frame_extension: String,
    /// Name of the control record inside a run folder.
    pub metadata_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            frame_extension: "tiff".to_string(),
            metadata_file: "Controls.txt".to_string(),
        }
    }
}

/// Analysis configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Known reflectance of the reference target (0-1].
    pub reference_reflectance: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            reference_reflectance: 0.7,
        }
    }
}

const LOSSLESS_EXTENSIONS: [&str; 3] = ["tiff", "tif", "png"];

impl RigConfig {
    /// Load configuration from `hyperpi.toml` in the working directory and the environment.
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Load configuration from a specific file path.
    ///
    /// Missing files are not an error; defaults and environment still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let config = Figment::from(Serialized::defaults(RigConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("HYPERPI_").split("__"))
            .extract()?;
        Ok(config)
    }

    /// Render the configuration as TOML, e.g. to seed a new `hyperpi.toml`.
    pub fn to_toml_string(&self) -> AppResult<String> {
        toml::to_string_pretty(self).map_err(|e| HyperPiError::Configuration(e.to_string()))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AppResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(HyperPiError::Configuration(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_levels.join(", ")
            )));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.logging.format.to_lowercase().as_str()) {
            return Err(HyperPiError::Configuration(format!(
                "Invalid log format '{}'. Must be one of: {}",
                self.logging.format,
                valid_formats.join(", ")
            )));
        }

        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(HyperPiError::Configuration(format!(
                "Invalid frame size {}",
                self.camera.frame_size()
            )));
        }

        let bound: HashSet<u8> = Axis::ALL.iter().map(|&a| self.axes.channel(a)).collect();
        if bound.len() != Axis::ALL.len() {
            return Err(HyperPiError::Configuration(format!(
                "Axes must be bound to distinct channels: {:?}",
                self.axes
            )));
        }

        if self.illumination.channels.is_empty() {
            return Err(HyperPiError::Configuration(
                "LED catalogue is empty".to_string(),
            ));
        }

        let mut addresses = HashSet::new();
        let mut wavelengths = HashSet::new();
        for channel in &self.illumination.channels {
            if !addresses.insert(channel.address) {
                return Err(HyperPiError::Configuration(format!(
                    "Duplicate LED address: {}",
                    channel.address
                )));
            }
            if !wavelengths.insert(channel.wavelength_nm) {
                return Err(HyperPiError::Configuration(format!(
                    "Duplicate LED wavelength: {} nm",
                    channel.wavelength_nm
                )));
            }
            if !angle_in_range(channel.carousel_angle) {
                return Err(HyperPiError::Configuration(format!(
                    "Carousel angle {} for {} nm outside [0, 180]",
                    channel.carousel_angle, channel.wavelength_nm
                )));
            }
        }

        let reflectance = self.analysis.reference_reflectance;
        if !(reflectance > 0.0 && reflectance <= 1.0) {
            return Err(HyperPiError::Configuration(format!(
                "Reference reflectance {} must be in (0, 1]",
                reflectance
            )));
        }

        let extension = self.storage.frame_extension.to_lowercase();
        if !LOSSLESS_EXTENSIONS.contains(&extension.as_str()) {
            return Err(HyperPiError::Configuration(format!(
                "Frame extension '{}' is not a lossless format ({})",
                self.storage.frame_extension,
                LOSSLESS_EXTENSIONS.join(", ")
            )));
        }

        if self.storage.metadata_file.trim().is_empty() {
            return Err(HyperPiError::Configuration(
                "Metadata file name is empty".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        let config = RigConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.illumination.channels.len(), 15);
        assert_eq!(config.illumination.channels[0].wavelength_nm, 445);
        assert_eq!(config.illumination.channels[14].carousel_angle, 168.0);
        assert_eq!(config.illumination.channels[11].address, 14);
    }

    #[test]
    fn test_load_from_toml_overrides_defaults() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "rig.toml",
                r#"
[axes]
sampler = 32

[camera]
width = 640
height = 480
warmup = "2s"

[timing]
settle = "250ms"

[[illumination.channels]]
address = 2
wavelength_nm = 525
carousel_angle = 0.0
"#,
            )?;

            let config = RigConfig::load_from("rig.toml").map_err(|e| e.to_string())?;
            assert_eq!(config.axes.sampler, 32);
            assert_eq!(config.axes.polarizer, 38);
            assert_eq!(config.camera.frame_size(), FrameSize::new(640, 480));
            assert_eq!(config.camera.warmup, Duration::from_secs(2));
            assert_eq!(config.timing.settle, Duration::from_millis(250));
            assert_eq!(config.illumination.wavelengths(), vec![525]);
            assert!(config.validate().is_ok());
            Ok(())
        });
    }

    #[test]
    fn test_env_overrides_file_and_defaults() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "rig.toml",
                r#"
[axes]
sampler = 30
polarizer = 34

[timing]
settle = "2s"
"#,
            )?;
            jail.set_env("HYPERPI_AXES__SAMPLER", "32");
            jail.set_env("HYPERPI_TIMING__SETTLE", "250ms");
            jail.set_env("HYPERPI_ILLUMINATION__BUS_ADDRESS", "32");

            let config = RigConfig::load_from("rig.toml").map_err(|e| e.to_string())?;
            // env wins over the file
            assert_eq!(config.axes.sampler, 32);
            assert_eq!(config.timing.settle, Duration::from_millis(250));
            // file wins over defaults where env is silent
            assert_eq!(config.axes.polarizer, 34);
            // env wins over defaults
            assert_eq!(config.illumination.bus_address, 32);
            assert_eq!(config.axes.led_carousel, 36);
            Ok(())
        });
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        figment::Jail::expect_with(|_| {
            let config = RigConfig::load_from("absent.toml").map_err(|e| e.to_string())?;
            assert_eq!(config, RigConfig::default());
            Ok(())
        });
    }

    #[test]
    fn test_toml_round_trip() {
        figment::Jail::expect_with(|jail| {
            let config = RigConfig::default();
            let text = config.to_toml_string().map_err(|e| e.to_string())?;
            jail.create_file("seed.toml", &text)?;
            let loaded = RigConfig::load_from("seed.toml").map_err(|e| e.to_string())?;
            assert_eq!(loaded.illumination, config.illumination);
            assert_eq!(loaded.timing, config.timing);
            Ok(())
        });
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = RigConfig::default();
        config.logging.level = "verbose".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_shared_axis_channel_rejected() {
        let mut config = RigConfig::default();
        config.axes.polarizer = config.axes.sampler;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_led_address_rejected() {
        let mut config = RigConfig::default();
        config.illumination.channels[1].address = config.illumination.channels[0].address;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Duplicate LED address"));
    }

    #[test]
    fn test_lossy_extension_rejected() {
        let mut config = RigConfig::default();
        config.storage.frame_extension = "jpg".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_reference_reflectance_bounds() {
        let mut config = RigConfig::default();
        config.analysis.reference_reflectance = 0.0;
        assert!(config.validate().is_err());
        config.analysis.reference_reflectance = 1.0;
        assert!(config.validate().is_ok());
    }
}
