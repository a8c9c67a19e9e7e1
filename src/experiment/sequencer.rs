//! Scan acquisition sequencer.
//!
//! Executes the capture protocol of one measurement: for every sampler angle, a
//! background pair with all LEDs off, then a copol/depol pair for every LED of
//! the catalogue. The resulting tree is described in [`crate::data::dataset`].
//!
//! # Failure policy
//!
//! - Moves and LED switches are best effort. A failing call is logged, counted in
//!   the [`RunSummary`] and the protocol continues.
//! - Angles outside the servo range are never sent; they are logged and counted.
//! - A failing capture ends the run with `CaptureFailed`. Frames already written
//!   stay on disk and the imager is stopped.
//! - Directory or control-record I/O failures end the run.
//!
//! Every port call is awaited before the next one is issued.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

use crate::config::{LedChannel, RigConfig};
use crate::data::dataset::{DatasetLayout, Polarization};
use crate::data::metadata::MetadataRecord;
use crate::error::{AppResult, CaptureError, HyperPiError};
use crate::experiment::state::{RunSummary, SequencerState, SequencerStatus};
use crate::hardware::capabilities::{angle_in_range, Actuator, Axis, Illumination, Imager, ImagerMode};
use crate::protocol::AngleProtocol;

/// The three ports a measurement drives.
#[derive(Clone)]
pub struct RigPorts {
    /// Servo axes, addressed by channel.
    pub actuator: Arc<dyn Actuator>,
    /// LED relay board.
    pub illumination: Arc<dyn Illumination>,
    /// Camera.
    pub imager: Arc<dyn Imager>,
}

#[derive(Debug, Default)]
struct RunCounters {
    frames_captured: usize,
    hardware_faults: usize,
    skipped_moves: usize,
}

/// Runs measurements on one rig.
///
/// # Example
///
/// ```rust,ignore
/// let mut sequencer = ScanSequencer::new(ports, Arc::new(RigConfig::load()?));
/// let sampler = AngleProtocol::parse("0-90-10")?;
/// let polarizer = AngleProtocol::parse("0,90")?;
/// let summary = sequencer.run(Path::new("Measurement_20240307_090501"), &sampler, &polarizer).await?;
/// println!("{} frames", summary.frames_captured);
/// ```
pub struct ScanSequencer {
    ports: RigPorts,
    config: Arc<RigConfig>,
    status: SequencerStatus,
}

impl ScanSequencer {
    /// Sequencer over `ports`, idle until [`run`](Self::run).
    pub fn new(ports: RigPorts, config: Arc<RigConfig>) -> Self {
        Self {
            ports,
            config,
            status: SequencerStatus::default(),
        }
    }

    /// Snapshot of the current or last run.
    pub fn status(&self) -> SequencerStatus {
        self.status.clone()
    }

    /// Configuration the runs use.
    pub fn config(&self) -> &RigConfig {
        &self.config
    }

    /// Run one measurement into `destination`.
    ///
    /// The polarizer protocol must be exactly `[0.0, 90.0]`; anything else is
    /// rejected with `UnsupportedProtocol` before any file or hardware is touched.
    pub async fn run(
        &mut self,
        destination: &Path,
        sampler: &AngleProtocol,
        polarizer: &AngleProtocol,
    ) -> AppResult<RunSummary> {
        if !polarizer.is_dual_polarization() {
            let err = HyperPiError::UnsupportedProtocol(polarizer.angles().to_vec());
            warn!(error = %err, "Measurement rejected");
            self.status.last_error = Some(err.to_string());
            return Err(err);
        }

        let run_id = Uuid::new_v4();
        self.status = SequencerStatus {
            state: SequencerState::Running,
            run_id: Some(run_id),
            frames_captured: 0,
            last_error: None,
        };

        let span = tracing::info_span!("measurement", %run_id, dir = ?destination);
        let mut counters = RunCounters::default();
        let result = self
            .execute(destination, sampler, &mut counters)
            .instrument(span)
            .await;

        self.status.frames_captured = counters.frames_captured;
        match result {
            Ok(()) => {
                self.status.state = SequencerState::Completed;
                info!(
                    %run_id,
                    frames = counters.frames_captured,
                    hardware_faults = counters.hardware_faults,
                    skipped_moves = counters.skipped_moves,
                    "Measurement concluded"
                );
                Ok(RunSummary {
                    run_id,
                    run_dir: destination.to_path_buf(),
                    frames_captured: counters.frames_captured,
                    hardware_faults: counters.hardware_faults,
                    skipped_moves: counters.skipped_moves,
                })
            }
            Err(e) => {
                self.status.state = SequencerState::Failed;
                self.status.last_error = Some(e.to_string());
                tracing::error!(%run_id, error = %e, "Measurement failed");
                if let Err(stop_err) = self.ports.imager.stop().await {
                    warn!(error = %stop_err, "Failed to stop imager after run failure");
                }
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        destination: &Path,
        sampler: &AngleProtocol,
        counters: &mut RunCounters,
    ) -> AppResult<()> {
        let layout = DatasetLayout::new(destination, &self.config.storage);
        let size = self.config.camera.frame_size();
        let controls = &self.config.camera.controls;

        tokio::fs::create_dir_all(destination).await?;
        MetadataRecord::from_capture_settings(size, controls).write_to(&layout.metadata_path())?;

        let imager = &self.ports.imager;
        let imager_failed = |source: CaptureError| HyperPiError::CaptureFailed {
            path: destination.to_path_buf(),
            source,
        };
        imager
            .configure(ImagerMode::Preview, size)
            .await
            .map_err(imager_failed)?;
        imager.apply_controls(controls).await.map_err(imager_failed)?;
        imager.start().await.map_err(imager_failed)?;
        info!(size = %size, warmup = ?self.config.camera.warmup, "Imager started");
        sleep(self.config.camera.warmup).await;

        for &angle in sampler.angles() {
            info!(sampler = angle, "Sampler position");
            self.move_axis(Axis::Sampler, angle, counters).await;
            sleep(self.config.timing.settle).await;

            layout.create_angle_folders(angle)?;

            self.move_axis(Axis::LedCarousel, 0.0, counters).await;
            for polarization in Polarization::ALL {
                let path = layout.background_path(polarization, angle);
                self.capture_polarized(polarization, &path, counters).await?;
            }

            for channel in &self.config.illumination.channels {
                self.capture_channel(&layout, angle, channel, counters).await?;
            }
        }

        imager.stop().await.map_err(imager_failed)?;
        Ok(())
    }

    async fn capture_channel(
        &self,
        layout: &DatasetLayout,
        angle: f64,
        channel: &LedChannel,
        counters: &mut RunCounters,
    ) -> AppResult<()> {
        self.move_axis(Axis::LedCarousel, channel.carousel_angle, counters)
            .await;
        self.switch(channel, true, counters).await;

        for polarization in Polarization::ALL {
            let path = layout.frame_path(polarization, angle, channel.wavelength_nm);
            self.capture_polarized(polarization, &path, counters).await?;
        }

        self.switch(channel, false, counters).await;
        sleep(self.config.timing.channel_off_delay).await;
        Ok(())
    }

    /// Polarizer to the state's angle, settle, capture.
    async fn capture_polarized(
        &self,
        polarization: Polarization,
        path: &Path,
        counters: &mut RunCounters,
    ) -> AppResult<()> {
        self.move_axis(Axis::Polarizer, polarization.polarizer_angle(), counters)
            .await;
        sleep(self.config.timing.settle).await;

        self.ports
            .imager
            .capture_to(path)
            .await
            .map_err(|source| HyperPiError::CaptureFailed {
                path: PathBuf::from(path),
                source,
            })?;
        counters.frames_captured += 1;
        info!(path = ?path, %polarization, "Frame captured");

        sleep(self.config.timing.capture_cooldown).await;
        Ok(())
    }

    async fn move_axis(&self, axis: Axis, angle: f64, counters: &mut RunCounters) {
        let channel = self.config.axes.channel(axis);
        if !angle_in_range(angle) {
            warn!(%axis, angle, "Angle outside [0, 180], move skipped");
            counters.skipped_moves += 1;
            return;
        }
        match self.ports.actuator.move_axis(channel, angle).await {
            Ok(()) => debug!(%axis, channel, angle, "Axis moved"),
            Err(e) => {
                warn!(%axis, channel, angle, error = %e, "Axis move failed, position unverified");
                counters.hardware_faults += 1;
            }
        }
    }

    async fn switch(&self, channel: &LedChannel, on: bool, counters: &mut RunCounters) {
        match self.ports.illumination.set_channel(channel.address, on).await {
            Ok(()) => debug!(address = channel.address, wavelength = channel.wavelength_nm, on, "LED switched"),
            Err(e) => {
                warn!(
                    address = channel.address,
                    wavelength = channel.wavelength_nm,
                    on,
                    error = %e,
                    "LED switch failed"
                );
                counters.hardware_faults += 1;
            }
        }
    }
}
