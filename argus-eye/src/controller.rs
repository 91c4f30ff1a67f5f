//! Pipeline controller: the running/idle state machine and one detection cycle

use crate::annotator::{color_for_confidence, Annotator};
use crate::config::{validate_frame_skip, validate_source, validate_threshold, PipelineConfig};
use crate::error::VisionError;
use crate::frame::{FrameArena, PixelEncoding};
use crate::logger::{DetectionLogger, DetectionRecord};
use crate::models::Detector;
use crate::sink::{DisplaySink, NullSink};
use crate::source::FrameSource;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineState {
    Idle,
    Running,
}

/// What a single call to [`PipelineController::cycle`] did
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// The pipeline is idle; nothing was touched
    Idle,
    /// The source had no frame this tick
    NoFrame,
    /// A frame was captured and discarded by frame skipping
    Skipped { frame_index: u64 },
    /// A frame went through detection and was published
    Processed {
        frame_index: u64,
        accepted: usize,
        rejected: usize,
        fps: Option<f64>,
    },
    /// Too many reads failed in a row; the pipeline stopped itself
    SourceLost,
}

/// Counters since the controller was created
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PipelineStats {
    pub captured: u64,
    pub processed: u64,
    pub skipped: u64,
    pub read_failures: u64,
    pub detections_accepted: u64,
    pub detections_rejected: u64,
    pub last_fps: Option<f64>,
}

/// Time source for FPS measurement
pub trait Clock: Send {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Throughput for one cycle, or `None` when no time was measured
pub fn fps_from_elapsed(elapsed: Duration) -> Option<f64> {
    let seconds = elapsed.as_secs_f64();
    if seconds > 0.0 {
        Some(1.0 / seconds)
    } else {
        None
    }
}

/// Drives source → detector → annotator → logger, one cycle per call.
///
/// All mutation goes through methods; the controller is not itself
/// scheduled. See [`crate::runtime::PipelineHandle`] for the timer loop.
pub struct PipelineController<S, D> {
    config: PipelineConfig,
    state: PipelineState,
    source: S,
    detector: D,
    annotator: Annotator,
    logger: DetectionLogger,
    sink: Arc<dyn DisplaySink>,
    clock: Box<dyn Clock>,
    arena: FrameArena,
    frame_counter: u64,
    consecutive_failures: u32,
    stats: PipelineStats,
}

impl<S: FrameSource, D: Detector> PipelineController<S, D> {
    pub fn new(config: PipelineConfig, source: S, detector: D) -> Result<Self, VisionError> {
        config.validate()?;
        Ok(Self {
            config,
            state: PipelineState::Idle,
            source,
            detector,
            annotator: Annotator::default(),
            logger: DetectionLogger::new(),
            sink: Arc::new(NullSink),
            clock: Box::new(SystemClock),
            arena: FrameArena::new(),
            frame_counter: 0,
            consecutive_failures: 0,
            stats: PipelineStats::default(),
        })
    }

    pub fn with_sink(mut self, sink: Arc<dyn DisplaySink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_annotator(mut self, annotator: Annotator) -> Self {
        self.annotator = annotator;
        self
    }

    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == PipelineState::Running
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn detector(&self) -> &D {
        &self.detector
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn detector_mut(&mut self) -> &mut D {
        &mut self.detector
    }

    pub fn log(&self) -> &DetectionLogger {
        &self.logger
    }

    pub fn snapshot(&self) -> Vec<DetectionRecord> {
        self.logger.snapshot()
    }

    /// Open the configured source and begin accepting cycles.
    ///
    /// No-op when already running. On failure the pipeline stays idle and
    /// the source is left closed.
    pub fn start(&mut self) -> Result<(), VisionError> {
        if self.is_running() {
            return Ok(());
        }

        let source_id = self.config.video_source;
        if let Err(e) = self.source.open(source_id) {
            if self.source.is_open() {
                self.source.close();
            }
            warn!("Failed to start pipeline on source {}: {}", source_id, e);
            return Err(e);
        }

        self.consecutive_failures = 0;
        self.state = PipelineState::Running;
        info!("Pipeline started on source {}", source_id);
        Ok(())
    }

    /// Close the source and clear the displayed frame. No-op when idle.
    pub fn stop(&mut self) {
        if !self.is_running() {
            return;
        }

        self.state = PipelineState::Idle;
        self.source.close();
        self.sink.clear();
        info!(
            "Pipeline stopped after {} frames ({} processed)",
            self.stats.captured, self.stats.processed
        );
    }

    /// Select the device used by the next `start`
    pub fn set_source(&mut self, source_id: u32) -> Result<(), VisionError> {
        validate_source(source_id)?;
        self.config.video_source = source_id;
        if self.is_running() {
            info!("Video source set to {}; takes effect after restart", source_id);
        } else {
            info!("Video source set to {}", source_id);
        }
        Ok(())
    }

    pub fn set_confidence_threshold(&mut self, threshold: f32) -> Result<(), VisionError> {
        validate_threshold(threshold)?;
        self.config.confidence_threshold = threshold;
        debug!("Confidence threshold set to {}", threshold);
        Ok(())
    }

    pub fn set_frame_skip(&mut self, frame_skip: u32) -> Result<(), VisionError> {
        validate_frame_skip(frame_skip)?;
        self.config.frame_skip = frame_skip;
        debug!("Frame skip set to {}", frame_skip);
        Ok(())
    }

    /// Write the log to the configured path
    pub fn flush_log(&self) -> Result<(), VisionError> {
        self.logger.flush(&self.config.log_path)
    }

    pub fn flush_log_to(&self, path: &Path) -> Result<(), VisionError> {
        self.logger.flush(path)
    }

    /// Run one cycle.
    ///
    /// Read failures are absorbed and reported as [`CycleOutcome::NoFrame`];
    /// the only error returned is a failed inference, after which the
    /// pipeline keeps running.
    pub fn cycle(&mut self) -> Result<CycleOutcome, VisionError> {
        if !self.is_running() {
            return Ok(CycleOutcome::Idle);
        }

        let raw = match self.source.read() {
            Ok(frame) => frame,
            Err(e) => return Ok(self.on_read_failure(e)),
        };
        let captured_at = Utc::now();
        self.consecutive_failures = 0;

        self.frame_counter = self.frame_counter.wrapping_add(1);
        self.stats.captured += 1;
        let frame_index = self.frame_counter;

        if frame_index % u64::from(self.config.frame_skip) != 0 {
            self.stats.skipped += 1;
            return Ok(CycleOutcome::Skipped { frame_index });
        }

        let work = self.arena.acquire(self.config.target_size);
        raw.resize_into(work);

        let started = self.clock.now();
        let detections = self.detector.infer(work)?;

        let threshold = self.config.confidence_threshold;
        let mut accepted = 0;
        for detection in &detections {
            if detection.confidence < threshold {
                continue;
            }
            let color = color_for_confidence(detection.confidence);
            self.annotator.draw_detection(work, detection, color);

            let record = DetectionRecord::new(detection, frame_index, captured_at);
            self.sink.push_record(&record);
            self.logger.append(record);
            accepted += 1;
        }
        let rejected = detections.len() - accepted;

        let elapsed = self.clock.now().saturating_duration_since(started);
        let fps = fps_from_elapsed(elapsed);
        if let Some(fps) = fps {
            self.annotator.draw_fps_overlay(work, fps);
        }

        work.convert_to(PixelEncoding::Rgb8);
        self.sink.publish_frame(work);

        self.stats.processed += 1;
        self.stats.detections_accepted += accepted as u64;
        self.stats.detections_rejected += rejected as u64;
        self.stats.last_fps = fps;
        debug!(
            "Frame {}: {} accepted, {} rejected in {:?}",
            frame_index, accepted, rejected, elapsed
        );

        Ok(CycleOutcome::Processed {
            frame_index,
            accepted,
            rejected,
            fps,
        })
    }

    fn on_read_failure(&mut self, err: VisionError) -> CycleOutcome {
        self.stats.read_failures += 1;
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);

        if let Some(limit) = self.config.max_consecutive_read_failures {
            if self.consecutive_failures >= limit {
                error!(
                    "Source {} lost after {} failed reads: {}",
                    self.config.video_source, self.consecutive_failures, err
                );
                self.stop();
                return CycleOutcome::SourceLost;
            }
        }

        if self.consecutive_failures == 1 {
            warn!("No frame from source {}: {}", self.config.video_source, err);
        } else {
            debug!("No frame from source {}: {}", self.config.video_source, err);
        }
        CycleOutcome::NoFrame
    }
}
