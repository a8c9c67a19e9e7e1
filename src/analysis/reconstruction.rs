//! Reflectance cube reconstruction.
//!
//! Turns a sample dataset into a 5-D reflectance cube indexed
//! `[row, col, wavelength, sampler angle, polarization]`. Each slice is
//!
//! ```text
//! (frame - background) · flat_field / (t · 10^(g/10) · reference_intensity)
//! ```
//!
//! clipped at zero. Slices whose frames are missing, unreadable or of the wrong
//! shape are left at zero and logged: a partially corrupted capture still yields
//! every slice that survived.

use ndarray::{s, Array2, Array5, ArrayView2};
use std::path::Path;

use crate::analysis::calibration::{exposure_scale, read_exposure, ReferenceCalibration};
use crate::config::{RigConfig, StorageConfig};
use crate::data::dataset::{DatasetLayout, Polarization};
use crate::data::frame_io::read_frame;
use crate::data::metadata::MetadataRecord;
use crate::error::{AppResult, HyperPiError};
use crate::hardware::capabilities::FrameSize;

/// Calibrated reflectance of one sample dataset.
#[derive(Debug, Clone)]
pub struct ReflectanceCube {
    /// `[row, col, wavelength, angle, polarization]`
    pub data: Array5<f32>,
    /// Wavelength (nm) of each index along axis 2.
    pub wavelengths: Vec<u32>,
    /// `Copol_*` folder name of each index along axis 3.
    pub folder_names: Vec<String>,
    /// Sampler angle of each index along axis 3, when the folder name carries one.
    pub angles: Vec<Option<f64>>,
    /// Number of slices left at zero.
    pub skipped_slices: usize,
}

impl ReflectanceCube {
    /// `(rows, cols)` of every slice.
    pub fn frame_shape(&self) -> (usize, usize) {
        let shape = self.data.shape();
        (shape[0], shape[1])
    }

    /// Index of `wavelength_nm` along the wavelength axis.
    pub fn wavelength_index(&self, wavelength_nm: u32) -> Option<usize> {
        self.wavelengths.iter().position(|&w| w == wavelength_nm)
    }

    /// One `(rows, cols)` image.
    ///
    /// # Panics
    ///
    /// Panics if an index is out of bounds.
    pub fn slice(
        &self,
        wavelength: usize,
        angle: usize,
        polarization: Polarization,
    ) -> ArrayView2<'_, f32> {
        self.data
            .slice(s![.., .., wavelength, angle, polarization.index()])
    }
}

/// Rebuilds reflectance cubes from sample datasets.
pub struct CubeReconstructor {
    wavelengths: Vec<u32>,
    storage: StorageConfig,
}

impl CubeReconstructor {
    /// Reconstructor for the given LED catalogue and file naming.
    pub fn new(wavelengths: Vec<u32>, storage: StorageConfig) -> Self {
        Self {
            wavelengths,
            storage,
        }
    }

    /// Reconstructor for the configured LED catalogue.
    pub fn from_config(config: &RigConfig) -> Self {
        Self::new(config.illumination.wavelengths(), config.storage.clone())
    }

    /// Reconstruct the dataset at `root` with a reference calibration.
    pub fn reconstruct(
        &self,
        root: &Path,
        calibration: &ReferenceCalibration,
    ) -> AppResult<ReflectanceCube> {
        self.reconstruct_with(
            root,
            calibration.reference_intensity,
            &calibration.flat_field,
        )
    }

    /// Reconstruct with an explicit reference intensity and flat-field map.
    ///
    /// # Errors
    ///
    /// - `CorruptMetadata` if Width, Height, ExposureTime or AnalogueGain is missing
    /// - `CalibrationShapeMismatch` if the flat-field is not `(Height, Width)`
    /// - `IncompleteDataset` if Copol and Depol folders do not pair up
    /// - `DegenerateReference` if the normalization divisor is not positive
    pub fn reconstruct_with(
        &self,
        root: &Path,
        reference_intensity: f64,
        flat_field: &Array2<f64>,
    ) -> AppResult<ReflectanceCube> {
        let layout = DatasetLayout::new(root, &self.storage);
        let metadata_path = layout.metadata_path();
        let record = MetadataRecord::read_from(&metadata_path)?;
        let size: FrameSize = record.require_frame_size(&metadata_path)?;
        let (exposure, gain) = read_exposure(&record, &metadata_path)?;

        let divisor = exposure_scale(exposure, gain) * reference_intensity;
        if !divisor.is_finite() || divisor <= 0.0 {
            return Err(HyperPiError::DegenerateReference(format!(
                "normalization t·10^(g/10)·I_ref = {divisor}"
            )));
        }

        let (rows, cols) = size.shape();
        if flat_field.dim() != (rows, cols) {
            return Err(HyperPiError::CalibrationShapeMismatch {
                expected: (rows, cols),
                found: flat_field.dim(),
                path: root.to_path_buf(),
            });
        }

        let pairs = layout.angle_folders()?;
        let mut data = Array5::<f32>::zeros((rows, cols, self.wavelengths.len(), pairs.len(), 2));
        let mut skipped = 0usize;

        tracing::info!(
            root = ?root,
            size = %size,
            angles = pairs.len(),
            wavelengths = self.wavelengths.len(),
            "Reconstructing reflectance cube"
        );

        for (a, pair) in pairs.iter().enumerate() {
            for polarization in Polarization::ALL {
                let folder = pair.folder(polarization);
                let background_path = layout.background_in(folder);
                let background = match read_frame(&background_path) {
                    Ok(bg) if bg.dim() == (rows, cols) => bg,
                    Ok(bg) => {
                        tracing::warn!(
                            path = ?background_path,
                            found = ?bg.dim(),
                            expected = ?(rows, cols),
                            "Background shape mismatch, skipping folder"
                        );
                        skipped += self.wavelengths.len();
                        continue;
                    }
                    Err(e) => {
                        tracing::warn!(path = ?background_path, error = %e, "Unreadable background, skipping folder");
                        skipped += self.wavelengths.len();
                        continue;
                    }
                };

                for (w, &wavelength) in self.wavelengths.iter().enumerate() {
                    let frame_path = layout.frame_in(folder, wavelength);
                    let frame = match read_frame(&frame_path) {
                        Ok(frame) => frame,
                        Err(e) => {
                            tracing::warn!(path = ?frame_path, error = %e, "Unreadable frame, slice left empty");
                            skipped += 1;
                            continue;
                        }
                    };
                    if frame.dim() != (rows, cols) {
                        tracing::warn!(
                            path = ?frame_path,
                            found = ?frame.dim(),
                            expected = ?(rows, cols),
                            "Frame shape mismatch, slice left empty"
                        );
                        skipped += 1;
                        continue;
                    }

                    let reflectance = (frame - &background) * flat_field / divisor;
                    data.slice_mut(s![.., .., w, a, polarization.index()])
                        .assign(&reflectance.mapv(|v| v.max(0.0) as f32));
                }
            }
        }

        if skipped > 0 {
            tracing::warn!(skipped, "Cube reconstructed with empty slices");
        } else {
            tracing::info!("Cube reconstructed");
        }

        Ok(ReflectanceCube {
            data,
            wavelengths: self.wavelengths.clone(),
            folder_names: pairs.iter().map(|p| p.copol_name()).collect(),
            angles: pairs.iter().map(|p| p.angle).collect(),
            skipped_slices: skipped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::frame_io::write_frame;
    use crate::hardware::capabilities::CameraControls;
    use tracing_test::traced_test;

    const WAVELENGTHS: [u32; 3] = [445, 520, 660];
    const SHAPE: (usize, usize) = (4, 5);

    /// Copol frames are `base + w`, Depol frames `base / 2 + w`, backgrounds 10.
    fn write_sample(root: &Path, angles: &[f64], base: u16) -> DatasetLayout {
        let layout = DatasetLayout::new(root, &StorageConfig::default());
        let controls = CameraControls {
            exposure_time: 100,
            analogue_gain: 0.0,
            ..Default::default()
        };
        MetadataRecord::from_capture_settings(FrameSize::new(5, 4), &controls)
            .write_to(&layout.metadata_path())
            .unwrap();
        for &angle in angles {
            layout.create_angle_folders(angle).unwrap();
            for polarization in Polarization::ALL {
                let folder = layout.angle_folder(polarization, angle);
                write_frame(&Array2::from_elem(SHAPE, 10u16), layout.background_in(&folder))
                    .unwrap();
                for (w, wavelength) in WAVELENGTHS.iter().enumerate() {
                    let level = match polarization {
                        Polarization::Copolarized => base,
                        Polarization::Depolarized => base / 2,
                    } + w as u16;
                    write_frame(
                        &Array2::from_elem(SHAPE, level),
                        layout.frame_in(&folder, *wavelength),
                    )
                    .unwrap();
                }
            }
        }
        layout
    }

    fn reconstructor() -> CubeReconstructor {
        CubeReconstructor::new(WAVELENGTHS.to_vec(), StorageConfig::default())
    }

    #[test]
    fn cube_matches_analytic_values() {
        let dir = tempfile::tempdir().unwrap();
        write_sample(dir.path(), &[45.0, 0.0], 210);
        let flat = Array2::from_elem(SHAPE, 2.0);

        let cube = reconstructor()
            .reconstruct_with(dir.path(), 4.0, &flat)
            .unwrap();

        assert_eq!(cube.data.shape(), &[4, 5, 3, 2, 2]);
        assert_eq!(cube.angles, vec![Some(0.0), Some(45.0)]);
        assert_eq!(
            cube.folder_names,
            vec!["Copol_Sampler_0.0", "Copol_Sampler_45.0"]
        );
        assert_eq!(cube.skipped_slices, 0);

        let divisor = 100.0 * 4.0;
        for w in 0..3 {
            for a in 0..2 {
                let copol = (210.0 + w as f64 - 10.0) * 2.0 / divisor;
                let depol = (105.0 + w as f64 - 10.0) * 2.0 / divisor;
                for &v in cube.slice(w, a, Polarization::Copolarized) {
                    assert!((f64::from(v) - copol).abs() < 1e-6);
                }
                for &v in cube.slice(w, a, Polarization::Depolarized) {
                    assert!((f64::from(v) - depol).abs() < 1e-6);
                }
            }
        }
    }

    #[test]
    fn negative_reflectance_is_clipped() {
        let dir = tempfile::tempdir().unwrap();
        // frames darker than the background
        write_sample(dir.path(), &[0.0], 4);
        let cube = reconstructor()
            .reconstruct_with(dir.path(), 1.0, &Array2::ones(SHAPE))
            .unwrap();
        assert!(cube.data.iter().all(|&v| v >= 0.0));
        assert!(cube.slice(0, 0, Polarization::Copolarized).iter().all(|&v| v == 0.0));
    }

    #[test]
    #[traced_test]
    fn mismatched_slice_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let layout = write_sample(dir.path(), &[0.0], 110);
        let bad = layout.frame_path(Polarization::Depolarized, 0.0, 520);
        write_frame(&Array2::from_elem((3, 5), 500u16), &bad).unwrap();

        let cube = reconstructor()
            .reconstruct_with(dir.path(), 1.0, &Array2::ones(SHAPE))
            .unwrap();

        assert_eq!(cube.skipped_slices, 1);
        assert!(cube.slice(1, 0, Polarization::Depolarized).iter().all(|&v| v == 0.0));
        assert!(cube.slice(1, 0, Polarization::Copolarized).iter().all(|&v| v > 0.0));
        assert!(logs_contain("Frame shape mismatch"));
    }

    #[test]
    fn missing_frame_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let layout = write_sample(dir.path(), &[0.0, 10.0], 110);
        std::fs::remove_file(layout.frame_path(Polarization::Copolarized, 10.0, 660)).unwrap();

        let cube = reconstructor()
            .reconstruct_with(dir.path(), 1.0, &Array2::ones(SHAPE))
            .unwrap();
        assert_eq!(cube.skipped_slices, 1);
        assert!(cube.slice(2, 1, Polarization::Copolarized).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn flat_field_shape_must_match_geometry() {
        let dir = tempfile::tempdir().unwrap();
        write_sample(dir.path(), &[0.0], 110);
        let err = reconstructor()
            .reconstruct_with(dir.path(), 1.0, &Array2::ones((5, 4)))
            .unwrap_err();
        assert!(matches!(err, HyperPiError::CalibrationShapeMismatch { .. }));
    }

    #[test]
    fn unpaired_folders_are_incomplete() {
        let dir = tempfile::tempdir().unwrap();
        write_sample(dir.path(), &[0.0], 110);
        std::fs::create_dir(dir.path().join("Copol_Sampler_5.0")).unwrap();
        let err = reconstructor()
            .reconstruct_with(dir.path(), 1.0, &Array2::ones(SHAPE))
            .unwrap_err();
        assert!(matches!(err, HyperPiError::IncompleteDataset { .. }));
    }

    #[test]
    fn missing_geometry_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("Controls.txt"),
            "ExposureTime\t100\tInt\nAnalogueGain\t0.0\tFloat\n",
        )
        .unwrap();
        let err = reconstructor()
            .reconstruct_with(dir.path(), 1.0, &Array2::ones(SHAPE))
            .unwrap_err();
        assert!(matches!(err, HyperPiError::CorruptMetadata { .. }));
    }
}
