//! Frame sources: live cameras and recorded image sequences

#[cfg(feature = "opencv")]
pub mod camera;
pub mod replay;

#[cfg(feature = "opencv")]
pub use camera::CameraSource;
pub use replay::ReplaySource;

use crate::error::VisionError;
use crate::frame::Frame;
use std::fmt;
use std::str::FromStr;

/// A live video capture device.
///
/// `read` fails with [`VisionError::TransientRead`] when a frame cannot be
/// grabbed or the stream has ended; callers treat that as "no frame this
/// tick". `close` must be safe to call any number of times.
pub trait FrameSource: Send {
    /// Open device `source_id`, releasing any device opened earlier
    fn open(&mut self, source_id: u32) -> Result<(), VisionError>;

    fn read(&mut self) -> Result<Frame, VisionError>;

    fn close(&mut self);

    fn is_open(&self) -> bool;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn open(&mut self, source_id: u32) -> Result<(), VisionError> {
        (**self).open(source_id)
    }

    fn read(&mut self) -> Result<Frame, VisionError> {
        (**self).read()
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }
}

/// Named camera positions on devices with a front and a back camera
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraSlot {
    Front,
    Back,
}

impl CameraSlot {
    /// Device index of this camera
    pub fn index(self) -> u32 {
        match self {
            CameraSlot::Front => 0,
            CameraSlot::Back => 1,
        }
    }
}

impl fmt::Display for CameraSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraSlot::Front => write!(f, "Front Camera"),
            CameraSlot::Back => write!(f, "Back Camera"),
        }
    }
}

impl FromStr for CameraSlot {
    type Err = VisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "front" | "front camera" | "0" => Ok(CameraSlot::Front),
            "back" | "back camera" | "1" => Ok(CameraSlot::Back),
            other => Err(VisionError::Config(format!("Unknown camera: {}", other))),
        }
    }
}
