//! Configuration for argus-eye

use crate::error::VisionError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Detection model settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// File name of the ONNX weights inside `model_dir`
    pub model_name: String,
    /// Directory holding model weights
    pub model_dir: PathBuf,
    /// Fetch the weights when they are missing from `model_dir`
    pub auto_download: bool,
    /// Square network input size in pixels
    pub input_size: u32,
    /// Minimum class score for a raw candidate to survive decoding
    pub score_floor: f32,
    /// IoU above which overlapping boxes of the same class are suppressed
    pub iou_threshold: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        let model_dir = dirs::home_dir()
            .map(|mut p| {
                p.push(".argus");
                p.push("models");
                p
            })
            .unwrap_or_else(|| PathBuf::from("./models"));

        Self {
            model_name: "yolov8n.onnx".to_string(),
            model_dir,
            auto_download: true,
            input_size: 640,
            score_floor: 0.25,
            iou_threshold: 0.7,
        }
    }
}

impl ModelConfig {
    /// Full path of the configured weights
    pub fn model_path(&self) -> PathBuf {
        self.model_dir.join(&self.model_name)
    }
}

/// Detection pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Camera device index (0 = front/default, 1 = back)
    pub video_source: u32,
    /// Detections scoring below this are neither drawn nor logged
    pub confidence_threshold: f32,
    /// Process one in every `frame_skip` captured frames
    pub frame_skip: u32,
    /// Size (width, height) frames are resized to before detection
    pub target_size: (u32, u32),
    /// Minimum delay between two scheduled cycles
    pub cycle_interval_ms: u64,
    /// Where the detection log is written on flush
    pub log_path: PathBuf,
    /// Stop the pipeline after this many reads fail in a row (never when unset)
    pub max_consecutive_read_failures: Option<u32>,
    /// Detection model
    pub model: ModelConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            video_source: 0,
            confidence_threshold: 0.5,
            frame_skip: 2,
            target_size: (640, 480),
            cycle_interval_ms: 10,
            log_path: PathBuf::from("detection.txt"),
            max_consecutive_read_failures: None,
            model: ModelConfig::default(),
        }
    }
}

/// Parse configuration from a TOML or JSON document
impl FromStr for PipelineConfig {
    type Err = VisionError;

    fn from_str(content: &str) -> Result<Self, Self::Err> {
        if let Ok(config) = serde_json::from_str::<PipelineConfig>(content) {
            return Ok(config);
        }

        toml::from_str::<PipelineConfig>(content)
            .map_err(|e| VisionError::Config(format!("Unrecognised configuration: {}", e)))
    }
}

impl PipelineConfig {
    /// Load configuration from a TOML or JSON file
    pub fn load(path: &Path) -> Result<Self, VisionError> {
        let content = std::fs::read_to_string(path)?;
        content.parse()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), VisionError> {
        validate_threshold(self.confidence_threshold)?;
        validate_frame_skip(self.frame_skip)?;
        validate_source(self.video_source)?;

        let (width, height) = self.target_size;
        if width == 0 || height == 0 {
            return Err(VisionError::Config("Target size must be non-zero".to_string()));
        }
        if width > 7680 || height > 4320 {
            return Err(VisionError::Config("Target size too large (max 8K)".to_string()));
        }

        if self.cycle_interval_ms == 0 {
            return Err(VisionError::Config("Cycle interval must be at least 1ms".to_string()));
        }

        if self.max_consecutive_read_failures == Some(0) {
            return Err(VisionError::Config(
                "max_consecutive_read_failures must be at least 1 when set".to_string(),
            ));
        }

        let model = &self.model;
        if model.model_name.is_empty() {
            return Err(VisionError::Config("Model name must not be empty".to_string()));
        }
        if model.input_size == 0 || model.input_size % 32 != 0 || model.input_size > 2048 {
            return Err(VisionError::Config(
                "Model input size must be a positive multiple of 32 (max 2048)".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&model.score_floor) {
            return Err(VisionError::Config("Score floor must be within [0, 1]".to_string()));
        }
        if !(0.0..=1.0).contains(&model.iou_threshold) {
            return Err(VisionError::Config("IoU threshold must be within [0, 1]".to_string()));
        }

        Ok(())
    }
}

pub(crate) fn validate_threshold(threshold: f32) -> Result<(), VisionError> {
    if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
        return Err(VisionError::Config(format!(
            "Confidence threshold must be within [0, 1], got {}",
            threshold
        )));
    }
    Ok(())
}

pub(crate) fn validate_frame_skip(frame_skip: u32) -> Result<(), VisionError> {
    if frame_skip == 0 {
        return Err(VisionError::Config("Frame skip must be at least 1".to_string()));
    }
    Ok(())
}

pub(crate) fn validate_source(source: u32) -> Result<(), VisionError> {
    if source > 100 {
        return Err(VisionError::Config("Camera index too large (max 100)".to_string()));
    }
    Ok(())
}
