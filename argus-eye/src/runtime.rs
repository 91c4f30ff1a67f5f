//! Cooperative scheduler running pipeline cycles on a tokio task

use crate::controller::{CycleOutcome, PipelineController, PipelineStats};
use crate::error::VisionError;
use crate::logger::DetectionRecord;
use crate::models::Detector;
use crate::source::FrameSource;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Owns a controller and the task that ticks it.
///
/// Each tick runs one cycle on the blocking pool while holding the controller
/// lock, so a slow inference delays the next tick and cycles never overlap.
pub struct PipelineHandle<S, D> {
    controller: Arc<Mutex<PipelineController<S, D>>>,
    shutdown: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
}

impl<S, D> PipelineHandle<S, D>
where
    S: FrameSource + 'static,
    D: Detector + 'static,
{
    pub fn new(controller: PipelineController<S, D>) -> Self {
        Self {
            controller: Arc::new(Mutex::new(controller)),
            shutdown: None,
            task: None,
        }
    }

    /// Shared access for setters and inspection
    pub fn controller(&self) -> Arc<Mutex<PipelineController<S, D>>> {
        self.controller.clone()
    }

    pub fn is_running(&self) -> bool {
        self.controller.lock().is_running()
    }

    /// Start the controller and the cycle task. Must be called inside a tokio runtime.
    pub fn start(&mut self) -> Result<(), VisionError> {
        let interval_ms = {
            let mut controller = self.controller.lock();
            let looping = self.task.as_ref().map_or(false, |task| !task.is_finished());
            if controller.is_running() && looping {
                return Ok(());
            }
            controller.start()?;
            controller.config().cycle_interval_ms
        };

        // A previous loop that ended on its own leaves a finished task behind
        if let Some(task) = self.task.take() {
            task.abort();
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let controller = self.controller.clone();
        self.task = Some(tokio::spawn(drive(controller, interval_ms, shutdown_rx)));
        self.shutdown = Some(shutdown_tx);
        info!("Cycle loop scheduled every {}ms", interval_ms);
        Ok(())
    }

    /// Wait until the cycle loop ends by itself (source lost or external stop)
    pub async fn join(&mut self) {
        if let Some(task) = self.task.as_mut() {
            if let Err(e) = task.await {
                error!("Cycle loop ended abnormally: {}", e);
            }
            self.task = None;
        }
    }

    /// Stop scheduling, wait for an in-flight cycle, then stop the controller.
    ///
    /// After this returns no further detection or log side effects happen.
    pub async fn stop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            // The loop may already be gone
            let _ = shutdown.send(true);
        }
        self.join().await;
        self.controller.lock().stop();
    }

    pub fn set_source(&self, source_id: u32) -> Result<(), VisionError> {
        self.controller.lock().set_source(source_id)
    }

    pub fn set_confidence_threshold(&self, threshold: f32) -> Result<(), VisionError> {
        self.controller.lock().set_confidence_threshold(threshold)
    }

    pub fn set_frame_skip(&self, frame_skip: u32) -> Result<(), VisionError> {
        self.controller.lock().set_frame_skip(frame_skip)
    }

    pub fn snapshot(&self) -> Vec<DetectionRecord> {
        self.controller.lock().snapshot()
    }

    pub fn stats(&self) -> PipelineStats {
        self.controller.lock().stats().clone()
    }

    pub fn flush_log(&self) -> Result<(), VisionError> {
        self.controller.lock().flush_log()
    }
}

async fn drive<S, D>(
    controller: Arc<Mutex<PipelineController<S, D>>>,
    interval_ms: u64,
    mut shutdown: watch::Receiver<bool>,
) where
    S: FrameSource + 'static,
    D: Detector + 'static,
{
    let mut ticker = interval(Duration::from_millis(interval_ms.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {}
        }

        let shared = controller.clone();
        let outcome = tokio::task::spawn_blocking(move || shared.lock().cycle()).await;
        match outcome {
            Ok(Ok(CycleOutcome::Idle)) => {
                debug!("Controller idle, ending cycle loop");
                break;
            }
            Ok(Ok(CycleOutcome::SourceLost)) => {
                warn!("Source lost, ending cycle loop");
                break;
            }
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!("Cycle failed: {}", e),
            Err(e) => {
                error!("Cycle panicked, stopping pipeline: {}", e);
                controller.lock().stop();
                break;
            }
        }
    }
}
