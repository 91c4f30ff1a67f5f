//! Detector contract shared by every model backend

use crate::error::VisionError;
use crate::frame::Frame;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Axis-aligned box in integer pixel coordinates of the processed frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x_min: i32,
    pub y_min: i32,
    pub x_max: i32,
    pub y_max: i32,
}

impl BoundingBox {
    pub fn new(x_min: i32, y_min: i32, x_max: i32, y_max: i32) -> Self {
        Self { x_min, y_min, x_max, y_max }
    }

    pub fn width(&self) -> i32 {
        (self.x_max - self.x_min).max(0)
    }

    pub fn height(&self) -> i32 {
        (self.y_max - self.y_min).max(0)
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}, {}, {}]", self.x_min, self.y_min, self.x_max, self.y_max)
    }
}

/// One model-reported object instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class_id: usize,
    pub class_name: String,
    pub bbox: BoundingBox,
    /// Score in [0, 1]
    pub confidence: f32,
}

/// Object detection model.
///
/// `infer` returns every detection the model reports, in model order, without
/// applying the pipeline's confidence threshold. Calls may block for as long
/// as the model needs.
pub trait Detector: Send {
    fn infer(&mut self, frame: &Frame) -> Result<Vec<Detection>, VisionError>;

    /// Human-readable name of `class_id`
    fn class_name(&self, class_id: usize) -> &str;

    /// Number of classes the model can emit
    fn num_classes(&self) -> usize;
}

impl<D: Detector + ?Sized> Detector for Box<D> {
    fn infer(&mut self, frame: &Frame) -> Result<Vec<Detection>, VisionError> {
        (**self).infer(frame)
    }

    fn class_name(&self, class_id: usize) -> &str {
        (**self).class_name(class_id)
    }

    fn num_classes(&self) -> usize {
        (**self).num_classes()
    }
}
