//! Model manager with auto-download functionality

use crate::config::ModelConfig;
use crate::error::VisionError;
use crate::models::Detector;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

const RELEASE_BASE_URL: &str = "https://github.com/ultralytics/assets/releases/download/v8.2.0";

/// Weights that can be fetched by name: (file name, parameter count)
pub const KNOWN_MODELS: &[(&str, &str)] = &[
    ("yolov8n.onnx", "3.2M"),
    ("yolov8s.onnx", "11.2M"),
    ("yolov8m.onnx", "25.9M"),
    ("yolov8l.onnx", "43.7M"),
    ("yolov8x.onnx", "68.2M"),
];

const MAX_MODEL_SIZE: usize = 2_000_000_000;
const MIN_MODEL_SIZE: usize = 1024;
const DOWNLOAD_TIMEOUT_SECS: u64 = 3600;

/// Download URL for a known model name
pub fn download_url(model_name: &str) -> Option<String> {
    KNOWN_MODELS
        .iter()
        .find(|(name, _)| *name == model_name)
        .map(|(name, _)| format!("{}/{}", RELEASE_BASE_URL, name))
}

/// Locates detection weights on disk and fetches them when missing
pub struct ModelManager {
    config: Arc<ModelConfig>,
}

impl ModelManager {
    pub fn new(config: Arc<ModelConfig>) -> Self {
        Self { config }
    }

    /// Ensure model directory exists
    pub fn ensure_model_dir(&self) -> Result<PathBuf, VisionError> {
        let model_dir = &self.config.model_dir;
        if !model_dir.exists() {
            fs::create_dir_all(model_dir)?;
            info!("Created model directory: {:?}", model_dir);
        }
        Ok(model_dir.clone())
    }

    /// Path of the configured weights, downloading them first when allowed
    pub async fn resolve(&self) -> Result<PathBuf, VisionError> {
        let path = self.config.model_path();
        if path.exists() {
            return Ok(path);
        }

        if !self.config.auto_download {
            return Err(VisionError::Model(format!(
                "Model {:?} not found and auto-download is disabled",
                path
            )));
        }

        let url = download_url(&self.config.model_name).ok_or_else(|| {
            VisionError::Model(format!(
                "Model {:?} not found and {} has no known download location",
                path, self.config.model_name
            ))
        })?;
        self.ensure_model(&self.config.model_name, &url, "").await
    }

    /// Download model if not present
    pub async fn ensure_model(&self, model_name: &str, url: &str, checksum: &str) -> Result<PathBuf, VisionError> {
        if model_name.is_empty() || model_name.len() > 255 {
            return Err(VisionError::Model("Invalid model name".to_string()));
        }

        if model_name.contains("..") || model_name.contains('/') || model_name.contains('\\') {
            return Err(VisionError::Model("Model name contains invalid characters".to_string()));
        }

        if url.is_empty() || url.len() > 2048 {
            return Err(VisionError::Model("Invalid URL".to_string()));
        }

        if !url.starts_with("https://") {
            return Err(VisionError::Model("Only HTTPS URLs are allowed for model downloads".to_string()));
        }

        let model_dir = self.ensure_model_dir()?;
        let model_path = model_dir.join(model_name);

        if model_path.exists() {
            info!("Model {} already exists at {:?}", model_name, model_path);
            return Ok(model_path);
        }

        info!("Downloading model {} from {}", model_name, url);

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(DOWNLOAD_TIMEOUT_SECS))
            .build()?;

        let response = client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(VisionError::Model(format!("Failed to download model: HTTP {}", response.status())));
        }

        if let Some(content_length) = response.content_length() {
            if content_length > MAX_MODEL_SIZE as u64 {
                return Err(VisionError::Model(format!(
                    "Model too large: {} bytes (max {} bytes)",
                    content_length, MAX_MODEL_SIZE
                )));
            }
        }

        let bytes = response.bytes().await?;
        verify_download(model_name, &bytes, checksum)?;

        // Write next to the target, then rename so a partial file never has the final name
        let temp_path = model_path.with_extension("tmp");
        fs::write(&temp_path, &bytes)?;
        if let Err(e) = fs::rename(&temp_path, &model_path) {
            let _ = fs::remove_file(&temp_path);
            return Err(VisionError::Io(e));
        }

        info!("Model {} saved to {:?}", model_name, model_path);
        Ok(model_path)
    }

    /// Resolve the weights and build the detector backend
    pub async fn load_detector(&self) -> Result<Box<dyn Detector>, VisionError> {
        let path = self.resolve().await?;
        build_detector(&path, &self.config)
    }
}

/// Size window and optional SHA-256 check on downloaded weights
pub fn verify_download(model_name: &str, bytes: &[u8], checksum: &str) -> Result<(), VisionError> {
    if bytes.len() > MAX_MODEL_SIZE {
        return Err(VisionError::Model(format!(
            "Downloaded model too large: {} bytes (max {} bytes)",
            bytes.len(),
            MAX_MODEL_SIZE
        )));
    }

    if bytes.len() < MIN_MODEL_SIZE {
        return Err(VisionError::Model("Downloaded file too small, likely corrupted".to_string()));
    }

    if checksum.is_empty() {
        warn!("Checksum verification skipped for model {}", model_name);
        return Ok(());
    }

    let computed = hex::encode(Sha256::digest(bytes));
    if !computed.eq_ignore_ascii_case(checksum) {
        return Err(VisionError::Model(format!(
            "Checksum mismatch for model {}: expected {}, got {}",
            model_name, checksum, computed
        )));
    }
    info!("Verified checksum for model {}", model_name);
    Ok(())
}

#[cfg(feature = "onnx")]
fn build_detector(path: &std::path::Path, config: &ModelConfig) -> Result<Box<dyn Detector>, VisionError> {
    let detector = crate::models::YoloDetector::new(path, config)?;
    Ok(Box::new(detector))
}

#[cfg(not(feature = "onnx"))]
fn build_detector(path: &std::path::Path, _config: &ModelConfig) -> Result<Box<dyn Detector>, VisionError> {
    Err(VisionError::Model(format!(
        "Cannot load {:?}: argus-eye was built without the `onnx` feature",
        path
    )))
}
