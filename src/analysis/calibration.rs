//! Reference calibration.
//!
//! A reference dataset is a capture of a target of known reflectance taken with
//! the same optics as the samples. From it the calibrator derives:
//!
//! - the **reference intensity**: background-subtracted brightness of the target,
//!   normalized by exposure, gain and the target's reflectance
//! - the **flat-field map**: a unit-mean smooth surface describing how unevenly
//!   the field of view is lit
//!
//! Only `Copol_*` folders are used; the reference is read at whatever sampler
//! angles it was captured at and every angle contributes equally.

use ndarray::Array2;
use std::path::{Path, PathBuf};

use crate::analysis::flatfield::fit_surface;
use crate::config::{RigConfig, StorageConfig};
use crate::data::dataset::{DatasetLayout, Polarization};
use crate::data::frame_io::read_frame;
use crate::data::metadata::{MetadataRecord, ANALOGUE_GAIN, EXPOSURE_TIME};
use crate::error::{AppResult, HyperPiError};

/// Output of [`ReferenceCalibrator::calibrate`].
#[derive(Debug, Clone)]
pub struct ReferenceCalibration {
    /// Mean over wavelengths of the per-wavelength accumulator.
    pub reference_intensity: f64,
    /// Unit-mean illumination profile, frame-shaped.
    pub flat_field: Array2<f64>,
    /// Normalized intensity per catalogue wavelength, summed over folders.
    pub wavelength_intensity: Vec<f64>,
    /// Number of `Copol_*` folders that contributed.
    pub folder_count: usize,
}

/// Exposure normalization `t · 10^(g/10)` shared by calibration and reconstruction.
pub fn exposure_scale(exposure_time: f64, analogue_gain_db: f64) -> f64 {
    exposure_time * 10f64.powf(analogue_gain_db / 10.0)
}

/// Read exposure time and gain from the control record of `root`.
pub(crate) fn read_exposure(record: &MetadataRecord, path: &Path) -> AppResult<(f64, f64)> {
    Ok((
        record.require_float(EXPOSURE_TIME, path)?,
        record.require_float(ANALOGUE_GAIN, path)?,
    ))
}

/// Load a frame of a dataset that must be complete.
fn load_required(path: &Path) -> AppResult<Array2<f64>> {
    read_frame(path).map_err(|e| HyperPiError::IncompleteDataset {
        path: path.to_path_buf(),
        reason: format!("cannot read frame: {e}"),
    })
}

/// Derives calibration data from a reference dataset.
pub struct ReferenceCalibrator {
    wavelengths: Vec<u32>,
    reference_reflectance: f64,
    storage: StorageConfig,
}

impl ReferenceCalibrator {
    /// Calibrator for the given catalogue and target reflectance.
    pub fn new(wavelengths: Vec<u32>, reference_reflectance: f64, storage: StorageConfig) -> Self {
        Self {
            wavelengths,
            reference_reflectance,
            storage,
        }
    }

    /// Calibrator for the configured LED catalogue and reference target.
    pub fn from_config(config: &RigConfig) -> Self {
        Self::new(
            config.illumination.wavelengths(),
            config.analysis.reference_reflectance,
            config.storage.clone(),
        )
    }

    /// Derive the reference intensity and flat-field map from the dataset at `root`.
    ///
    /// # Errors
    ///
    /// - `CorruptMetadata` if the control record lacks exposure time or gain
    /// - `IncompleteDataset` if there are no `Copol_*` folders or a frame is unreadable
    /// - `CalibrationShapeMismatch` if any frame differs in shape from the first background
    /// - `DegenerateReference` if the normalization or the flat-field mean is zero
    pub fn calibrate(&self, root: &Path) -> AppResult<ReferenceCalibration> {
        let layout = DatasetLayout::new(root, &self.storage);
        let metadata_path = layout.metadata_path();
        let record = MetadataRecord::read_from(&metadata_path)?;
        let (exposure, gain) = read_exposure(&record, &metadata_path)?;

        let divisor = exposure_scale(exposure, gain) * self.reference_reflectance;
        if !divisor.is_finite() || divisor <= 0.0 {
            return Err(HyperPiError::DegenerateReference(format!(
                "normalization t·10^(g/10)·ρ = {divisor} (t = {exposure}, g = {gain}, ρ = {})",
                self.reference_reflectance
            )));
        }

        let mut folders = layout.list_folders(Polarization::Copolarized)?;
        if folders.is_empty() {
            return Err(HyperPiError::IncompleteDataset {
                path: root.to_path_buf(),
                reason: "no Copol folders in reference dataset".to_string(),
            });
        }
        folders.sort_by(|a, b| a.0.cmp(&b.0));

        tracing::info!(
            root = ?root,
            folders = folders.len(),
            wavelengths = self.wavelengths.len(),
            "Calibrating reference"
        );

        let mut intensity = vec![0.0; self.wavelengths.len()];
        let mut homogeneity: Option<Array2<f64>> = None;
        let mut maps = 0usize;

        for (suffix, folder) in &folders {
            let background_path = layout.background_in(folder);
            let background = load_required(&background_path)?;
            let expected = homogeneity
                .get_or_insert_with(|| Array2::zeros(background.dim()))
                .dim();
            check_shape(expected, &background, &background_path)?;

            for (w, &wavelength) in self.wavelengths.iter().enumerate() {
                let frame_path = layout.frame_in(folder, wavelength);
                let frame = load_required(&frame_path)?;
                check_shape(expected, &frame, &frame_path)?;

                let corrected = frame - &background;
                intensity[w] += corrected.mean().unwrap_or(0.0) / divisor;

                let surface = fit_surface(&corrected) / divisor;
                if let Some(sum) = homogeneity.as_mut() {
                    *sum += &surface;
                }
                maps += 1;
            }
            tracing::debug!(folder = %suffix, "Reference folder processed");
        }

        let reference_intensity =
            intensity.iter().sum::<f64>() / self.wavelengths.len().max(1) as f64;
        if !reference_intensity.is_finite() || reference_intensity <= 0.0 {
            return Err(HyperPiError::DegenerateReference(format!(
                "reference intensity {reference_intensity} is not positive"
            )));
        }

        let mut flat_field = homogeneity.unwrap_or_else(|| Array2::zeros((0, 0)));
        if maps > 0 {
            flat_field /= maps as f64;
        }
        let mean = flat_field.mean().unwrap_or(0.0);
        if !mean.is_finite() || mean == 0.0 {
            return Err(HyperPiError::DegenerateReference(format!(
                "flat-field mean is {mean}"
            )));
        }
        flat_field /= mean;

        tracing::info!(reference_intensity, "Reference calibration complete");
        Ok(ReferenceCalibration {
            reference_intensity,
            flat_field,
            wavelength_intensity: intensity,
            folder_count: folders.len(),
        })
    }
}

fn check_shape(expected: (usize, usize), frame: &Array2<f64>, path: &Path) -> AppResult<()> {
    if frame.dim() != expected {
        return Err(HyperPiError::CalibrationShapeMismatch {
            expected,
            found: frame.dim(),
            path: PathBuf::from(path),
        });
    }
    Ok(())
}
