//! Rig session.
//!
//! Owns the configuration, the ports and the optional live preview, and starts
//! measurements into timestamped run folders. Preview and measurement never use
//! the imager at the same time: starting a measurement stops the preview first.

use chrono::Local;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::RigConfig;
use crate::data::dataset::run_folder_name;
use crate::error::{AppResult, CaptureError};
use crate::experiment::preview::PreviewWorker;
use crate::experiment::sequencer::{RigPorts, ScanSequencer};
use crate::experiment::state::{RunSummary, SequencerStatus};
use crate::protocol::AngleProtocol;

/// One rig with its preview and measurement controls.
pub struct RigSession {
    config: Arc<RigConfig>,
    ports: RigPorts,
    sequencer: ScanSequencer,
    preview: Option<PreviewWorker>,
}

impl RigSession {
    /// Validate `config` and bind it to `ports`.
    pub fn new(config: RigConfig, ports: RigPorts) -> AppResult<Self> {
        config.validate()?;
        let config = Arc::new(config);
        Ok(Self {
            sequencer: ScanSequencer::new(ports.clone(), config.clone()),
            config,
            ports,
            preview: None,
        })
    }

    /// Validated configuration.
    pub fn config(&self) -> &RigConfig {
        &self.config
    }

    /// Sequencer status of the current or last run.
    pub fn status(&self) -> SequencerStatus {
        self.sequencer.status()
    }

    /// True while the preview task is alive.
    pub fn is_previewing(&self) -> bool {
        self.preview.as_ref().is_some_and(|p| !p.is_finished())
    }

    /// Start the live preview. Returns `false` if one is already running.
    pub fn start_preview(&mut self) -> bool {
        if self.is_previewing() {
            return false;
        }
        self.preview = Some(PreviewWorker::start(
            self.ports.imager.clone(),
            self.config.camera.frame_size(),
            self.config.camera.controls.clone(),
            self.config.timing.preview_poll,
        ));
        true
    }

    /// Stop the live preview, if any, and wait for it to release the imager.
    pub async fn stop_preview(&mut self) -> Result<(), CaptureError> {
        match self.preview.take() {
            Some(worker) => worker.stop().await,
            None => Ok(()),
        }
    }

    /// Parse both protocols, stop any preview, and run a measurement into a new
    /// `Measurement_<timestamp>` folder under `parent`.
    pub async fn measure(
        &mut self,
        parent: &Path,
        sampler_spec: &str,
        polarizer_spec: &str,
    ) -> AppResult<RunSummary> {
        let sampler = AngleProtocol::parse(sampler_spec)?;
        let polarizer = AngleProtocol::parse(polarizer_spec)?;

        if let Err(e) = self.stop_preview().await {
            tracing::warn!(error = %e, "Preview did not stop cleanly");
        }

        let run_dir: PathBuf = parent.join(run_folder_name(&Local::now()));
        tracing::info!(
            run_dir = ?run_dir,
            sampler = %sampler,
            polarizer = %polarizer,
            "Starting measurement"
        );
        self.sequencer.run(&run_dir, &sampler, &polarizer).await
    }
}
