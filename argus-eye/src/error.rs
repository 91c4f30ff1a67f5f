//! Error types for argus-eye

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VisionError {
    #[error("Video source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Frame read failed: {0}")]
    TransientRead(String),

    #[error("Failed to flush detection log to {path:?}: {source}")]
    LogFlush {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Model error: {0}")]
    Model(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("ONNX Runtime error: {0}")]
    Ort(String),

    #[error("OpenCV error: {0}")]
    OpenCv(String),
}

impl VisionError {
    /// True for errors the pipeline swallows and retries on the next cycle.
    pub fn is_transient(&self) -> bool {
        matches!(self, VisionError::TransientRead(_))
    }
}

#[cfg(feature = "opencv")]
impl From<opencv::Error> for VisionError {
    fn from(err: opencv::Error) -> Self {
        VisionError::OpenCv(err.message)
    }
}
