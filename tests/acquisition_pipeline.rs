//! End-to-end tests: mock rig acquisition, reference calibration and cube
//! reconstruction over the files the sequencer actually writes.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use hyperpi::analysis::products::{polar_profile, polygon_mask, roi_spectrum};
use hyperpi::analysis::{CubeReconstructor, ReferenceCalibrator};
use hyperpi::config::{RigConfig, TimingConfig};
use hyperpi::data::{DatasetLayout, Polarization};
use hyperpi::error::HyperPiError;
use hyperpi::experiment::{RigPorts, ScanSequencer, SequencerState};
use hyperpi::hardware::mock::{
    FramePattern, MockActuator, MockIllumination, MockImager, MockRig, RigJournal,
};
use hyperpi::protocol::AngleProtocol;
use tempfile::tempdir;

const BACKGROUND: u16 = 100;

fn bench_config() -> RigConfig {
    let mut config = RigConfig::default();
    config.camera.width = 6;
    config.camera.height = 4;
    config.camera.warmup = Duration::ZERO;
    config.camera.controls.exposure_time = 1000;
    config.camera.controls.analogue_gain = 0.0;
    config.timing = TimingConfig::immediate();
    config.illumination.channels.truncate(2);
    config.analysis.reference_reflectance = 0.5;
    config
}

fn ports(rig: &MockRig) -> RigPorts {
    RigPorts {
        actuator: rig.actuator.clone(),
        illumination: rig.illumination.clone(),
        imager: rig.imager.clone(),
    }
}

/// Pixel value by polarization folder and file stem.
fn pattern(copol: [u16; 2], depol: [u16; 2]) -> FramePattern {
    Arc::new(move |path: &Path, _: usize, _: usize| {
        let is_depol = path
            .parent()
            .and_then(|p| p.file_name())
            .is_some_and(|n| n.to_string_lossy().starts_with("Depol"));
        let levels = if is_depol { depol } else { copol };
        match path.file_stem().and_then(|s| s.to_str()) {
            Some("445") => levels[0],
            Some("490") => levels[1],
            _ => BACKGROUND,
        }
    })
}

fn rig_with(pattern: FramePattern) -> MockRig {
    let journal = RigJournal::new();
    MockRig::from_parts(
        MockActuator::new(journal.clone()),
        MockIllumination::new(journal.clone()),
        MockImager::with_pattern(journal.clone(), pattern),
        journal,
    )
}

async fn acquire(rig: &MockRig, config: &Arc<RigConfig>, dir: &Path, sampler: &str) {
    let mut sequencer = ScanSequencer::new(ports(rig), config.clone());
    let sampler = AngleProtocol::parse(sampler).unwrap();
    let polarizer = AngleProtocol::parse("0,90").unwrap();
    sequencer.run(dir, &sampler, &polarizer).await.unwrap();
}

#[tokio::test]
async fn reference_and_sample_reconstruct_to_expected_reflectance() {
    let tmp = tempdir().unwrap();
    let config = Arc::new(bench_config());
    let reference_dir = tmp.path().join("reference");
    let sample_dir = tmp.path().join("sample");

    // uniform white target: 500 counts over background at every LED
    let reference_rig = rig_with(pattern([600, 600], [600, 600]));
    acquire(&reference_rig, &config, &reference_dir, "0").await;

    let sample_rig = rig_with(pattern([350, 200], [225, 150]));
    acquire(&sample_rig, &config, &sample_dir, "0-20-10").await;
    assert_eq!(sample_rig.journal.captures().await.len(), 18);

    let calibration = ReferenceCalibrator::from_config(&config)
        .calibrate(&reference_dir)
        .unwrap();
    // 500 / (1000 · 10^0 · 0.5)
    assert!((calibration.reference_intensity - 1.0).abs() < 1e-9);
    assert_eq!(calibration.folder_count, 1);
    assert!(calibration.flat_field.iter().all(|&v| (v - 1.0).abs() < 1e-9));

    let cube = CubeReconstructor::from_config(&config)
        .reconstruct(&sample_dir, &calibration)
        .unwrap();

    assert_eq!(cube.data.dim(), (4, 6, 2, 3, 2));
    assert_eq!(cube.wavelengths, vec![445, 490]);
    assert_eq!(cube.angles, vec![Some(0.0), Some(10.0), Some(20.0)]);
    assert_eq!(cube.skipped_slices, 0);

    // (frame - background) / (1000 · 1.0)
    let expected = [[0.25f32, 0.125], [0.1, 0.05]];
    for (w, levels) in expected.iter().enumerate() {
        for a in 0..3 {
            let copol = cube.slice(w, a, Polarization::Copolarized);
            let depol = cube.slice(w, a, Polarization::Depolarized);
            assert!(copol.iter().all(|&v| (v - levels[0]).abs() < 1e-6));
            assert!(depol.iter().all(|&v| (v - levels[1]).abs() < 1e-6));
        }
    }

    let mask = polygon_mask(4, 6, &[(0.0, 0.0), (5.5, 0.0), (5.5, 3.5), (0.0, 3.5)]).unwrap();
    let spectrum = roi_spectrum(&cube, &mask, 1, Polarization::Copolarized).unwrap();
    assert!((spectrum[0] - 0.25).abs() < 1e-6);
    assert!((spectrum[1] - 0.1).abs() < 1e-6);

    let profile = polar_profile(&cube, 0).unwrap();
    assert_eq!(profile.copol.len(), 3);
    assert!((profile.depol[2] - 0.125).abs() < 1e-6);
}

#[tokio::test]
async fn interrupted_run_reconstructs_with_empty_slices() {
    let tmp = tempdir().unwrap();
    let config = Arc::new(bench_config());
    let run_dir = tmp.path().join("interrupted");

    let journal = RigJournal::new();
    let rig = MockRig::from_parts(
        MockActuator::new(journal.clone()),
        MockIllumination::new(journal.clone()),
        MockImager::with_pattern(journal.clone(), pattern([350, 200], [225, 150]))
            .failing_capture(3),
        journal,
    );
    let mut sequencer = ScanSequencer::new(ports(&rig), config.clone());
    let err = sequencer
        .run(
            &run_dir,
            &AngleProtocol::parse("0").unwrap(),
            &AngleProtocol::parse("0,90").unwrap(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, HyperPiError::CaptureFailed { .. }));
    assert_eq!(sequencer.status().state, SequencerState::Failed);
    assert_eq!(sequencer.status().frames_captured, 3);

    let flat = ndarray::Array2::<f64>::ones((4, 6));
    let cube = CubeReconstructor::from_config(&config)
        .reconstruct_with(&run_dir, 1.0, &flat)
        .unwrap();

    // 445 depol, 490 copol and 490 depol were never written
    assert_eq!(cube.skipped_slices, 3);
    let copol_445 = cube.slice(0, 0, Polarization::Copolarized);
    assert!(copol_445.iter().all(|&v| (v - 0.25).abs() < 1e-6));
    assert!(cube
        .slice(1, 0, Polarization::Depolarized)
        .iter()
        .all(|&v| v == 0.0));
}

#[tokio::test]
async fn unpaired_folders_are_rejected() {
    let tmp = tempdir().unwrap();
    let config = Arc::new(bench_config());
    let run_dir = tmp.path().join("run");
    acquire(&MockRig::new(BACKGROUND), &config, &run_dir, "0,10").await;

    let layout = DatasetLayout::new(&run_dir, &config.storage);
    std::fs::remove_dir_all(layout.angle_folder(Polarization::Depolarized, 10.0)).unwrap();

    let flat = ndarray::Array2::<f64>::ones((4, 6));
    let err = CubeReconstructor::from_config(&config)
        .reconstruct_with(&run_dir, 1.0, &flat)
        .unwrap_err();
    assert!(matches!(err, HyperPiError::IncompleteDataset { .. }));
}

#[tokio::test]
async fn flat_field_of_wrong_shape_is_rejected() {
    let tmp = tempdir().unwrap();
    let config = Arc::new(bench_config());
    let run_dir = tmp.path().join("run");
    acquire(&MockRig::new(BACKGROUND), &config, &run_dir, "0").await;

    let flat = ndarray::Array2::<f64>::ones((6, 4));
    let err = CubeReconstructor::from_config(&config)
        .reconstruct_with(&run_dir, 1.0, &flat)
        .unwrap_err();
    assert!(matches!(err, HyperPiError::CalibrationShapeMismatch { .. }));
}
