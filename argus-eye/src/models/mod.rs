//! Detection models and their weights

pub mod detector;
pub mod manager;
pub mod yolo;

pub use detector::{BoundingBox, Detection, Detector};
pub use manager::ModelManager;
pub use yolo::{decode_yolov8, DecodeParams, Letterbox, COCO_CLASSES};

#[cfg(feature = "onnx")]
pub use yolo::YoloDetector;
