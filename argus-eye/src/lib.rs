//! argus-eye: real-time object detection pipeline
//!
//! Captures frames from a video source, throttles them with frame skipping,
//! runs an object detector, draws boxes, labels and an FPS overlay, and keeps
//! a log of every accepted detection that can be flushed to disk.
//!
//! Hardware backends are behind features: `opencv` for camera capture and
//! `onnx` for YOLOv8 inference through ONNX Runtime.

pub mod annotator;
pub mod config;
pub mod controller;
pub mod error;
pub mod frame;
pub mod logger;
pub mod models;
pub mod runtime;
pub mod sink;
pub mod source;

pub use annotator::{Annotator, ConfidenceTier};
pub use config::{ModelConfig, PipelineConfig};
pub use controller::{CycleOutcome, PipelineController, PipelineState, PipelineStats};
pub use error::VisionError;
pub use frame::{Color, Frame, PixelEncoding};
pub use logger::{DetectionLogger, DetectionRecord};
pub use models::{BoundingBox, Detection, Detector, ModelManager};
pub use runtime::PipelineHandle;
pub use sink::{ChannelSink, DisplaySink, NullSink};
pub use source::{FrameSource, ReplaySource};
