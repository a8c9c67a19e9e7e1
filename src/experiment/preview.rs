//! Live preview worker.
//!
//! While the operator aligns a sample the imager streams in preview mode. The
//! worker owns that stream in one background task and checks a cooperative stop
//! flag once per poll interval, so stopping takes at most one interval.

use anyhow::anyhow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::error::CaptureError;
use crate::hardware::capabilities::{CameraControls, FrameSize, Imager, ImagerMode};

/// Handle to a running preview task.
pub struct PreviewWorker {
    stop: Arc<AtomicBool>,
    task: JoinHandle<Result<(), CaptureError>>,
}

impl PreviewWorker {
    /// Spawn the preview task: configure preview mode, apply controls, start the
    /// imager, then idle until stopped.
    pub fn start(
        imager: Arc<dyn Imager>,
        size: FrameSize,
        controls: CameraControls,
        poll: Duration,
    ) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();

        let task = tokio::spawn(async move {
            imager.configure(ImagerMode::Preview, size).await?;
            imager.apply_controls(&controls).await?;
            imager.start().await?;
            tracing::info!(size = %size, "Preview started");

            while !flag.load(Ordering::SeqCst) {
                tokio::time::sleep(poll).await;
            }

            imager.stop().await?;
            tracing::info!("Preview stopped");
            Ok::<(), CaptureError>(())
        });

        Self { stop, task }
    }

    /// Whether the task has exited, either stopped or failed.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Request the task to stop and wait for it.
    pub async fn stop(self) -> Result<(), CaptureError> {
        self.stop.store(true, Ordering::SeqCst);
        match self.task.await {
            Ok(result) => result,
            Err(join_err) => Err(CaptureError::Backend(anyhow!(
                "preview task ended abnormally: {join_err}"
            ))),
        }
    }
}
