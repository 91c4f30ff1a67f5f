//! USB webcam capture through OpenCV

use crate::error::VisionError;
use crate::frame::{Frame, PixelEncoding};
use crate::source::FrameSource;
use opencv::{
    core::Mat,
    imgproc,
    prelude::*,
    videoio::{VideoCapture, CAP_ANY, CAP_PROP_FRAME_HEIGHT, CAP_PROP_FRAME_WIDTH},
};
use tracing::{debug, info, warn};

/// Camera opened by device index
pub struct CameraSource {
    capture: Option<VideoCapture>,
    device: Option<u32>,
    requested_size: Option<(u32, u32)>,
}

impl CameraSource {
    pub fn new() -> Self {
        Self {
            capture: None,
            device: None,
            requested_size: None,
        }
    }

    /// Ask the driver for this capture size on open (frames are still resized later)
    pub fn with_requested_size(mut self, width: u32, height: u32) -> Self {
        self.requested_size = Some((width, height));
        self
    }

    pub fn device(&self) -> Option<u32> {
        self.device
    }
}

impl Default for CameraSource {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSource for CameraSource {
    fn open(&mut self, source_id: u32) -> Result<(), VisionError> {
        self.close();

        let mut capture = VideoCapture::new(source_id as i32, CAP_ANY)
            .map_err(|e| VisionError::SourceUnavailable(format!("Failed to open camera {}: {}", source_id, e)))?;

        let opened = capture
            .is_opened()
            .map_err(|e| VisionError::SourceUnavailable(format!("Camera {} not opened: {}", source_id, e)))?;
        if !opened {
            let _ = capture.release();
            return Err(VisionError::SourceUnavailable(format!("Camera {} failed to open", source_id)));
        }

        if let Some((width, height)) = self.requested_size {
            if let Err(e) = capture.set(CAP_PROP_FRAME_WIDTH, width as f64) {
                warn!("Camera {} rejected width {}: {}", source_id, width, e);
            }
            if let Err(e) = capture.set(CAP_PROP_FRAME_HEIGHT, height as f64) {
                warn!("Camera {} rejected height {}: {}", source_id, height, e);
            }
        }

        self.capture = Some(capture);
        self.device = Some(source_id);
        info!("Camera {} opened", source_id);
        Ok(())
    }

    fn read(&mut self) -> Result<Frame, VisionError> {
        let capture = self
            .capture
            .as_mut()
            .ok_or_else(|| VisionError::TransientRead("Camera not opened".to_string()))?;

        let mut mat = Mat::default();
        let grabbed = capture
            .read(&mut mat)
            .map_err(|e| VisionError::TransientRead(format!("Failed to read frame: {}", e)))?;
        if !grabbed || mat.empty() {
            return Err(VisionError::TransientRead("Camera returned no frame".to_string()));
        }

        mat_to_frame(&mat)
    }

    fn close(&mut self) {
        if let Some(mut capture) = self.capture.take() {
            if let Err(e) = capture.release() {
                warn!("Camera release failed: {}", e);
            }
            debug!("Camera {:?} released", self.device);
        }
        self.device = None;
    }

    fn is_open(&self) -> bool {
        self.capture.is_some()
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        self.close();
    }
}

/// Copy an 8-bit OpenCV image into a BGR frame
fn mat_to_frame(mat: &Mat) -> Result<Frame, VisionError> {
    let bgr = match mat.channels() {
        3 => mat.try_clone()?,
        1 => {
            let mut out = Mat::default();
            imgproc::cvt_color(mat, &mut out, imgproc::COLOR_GRAY2BGR, 0)?;
            out
        }
        4 => {
            let mut out = Mat::default();
            imgproc::cvt_color(mat, &mut out, imgproc::COLOR_BGRA2BGR, 0)?;
            out
        }
        n => {
            return Err(VisionError::TransientRead(format!("Unsupported channel count: {}", n)));
        }
    };

    let (width, height) = (bgr.cols(), bgr.rows());
    if width <= 0 || height <= 0 {
        return Err(VisionError::TransientRead("Invalid frame dimensions".to_string()));
    }

    let data = bgr.data_bytes()?.to_vec();
    Frame::from_raw(width as u32, height as u32, PixelEncoding::Bgr8, data)
        .map_err(|e| VisionError::TransientRead(e.to_string()))
}
