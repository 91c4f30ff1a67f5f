//! Replay a directory of still images as a video stream

use crate::error::VisionError;
use crate::frame::{Frame, PixelEncoding};
use crate::source::FrameSource;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp"];

/// Yields the images of a directory in file-name order, as BGR frames.
///
/// The device index passed to `open` is ignored; the directory is the source.
pub struct ReplaySource {
    dir: PathBuf,
    looping: bool,
    files: Vec<PathBuf>,
    cursor: usize,
    opened: bool,
}

impl ReplaySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            looping: false,
            files: Vec::new(),
            cursor: 0,
            opened: false,
        }
    }

    /// Start over from the first image after the last one
    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Number of images found by the last `open`
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    fn scan(&self) -> Result<Vec<PathBuf>, VisionError> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| {
            VisionError::SourceUnavailable(format!("Cannot read replay directory {:?}: {}", self.dir, e))
        })?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect();
        files.sort();
        Ok(files)
    }
}

impl FrameSource for ReplaySource {
    fn open(&mut self, _source_id: u32) -> Result<(), VisionError> {
        self.close();

        let files = self.scan()?;
        if files.is_empty() {
            return Err(VisionError::SourceUnavailable(format!(
                "Replay directory {:?} holds no images",
                self.dir
            )));
        }

        info!("Replaying {} images from {:?}", files.len(), self.dir);
        self.files = files;
        self.cursor = 0;
        self.opened = true;
        Ok(())
    }

    fn read(&mut self) -> Result<Frame, VisionError> {
        if !self.opened {
            return Err(VisionError::TransientRead("Replay source not opened".to_string()));
        }
        if self.cursor >= self.files.len() {
            if !self.looping {
                return Err(VisionError::TransientRead("End of replay".to_string()));
            }
            self.cursor = 0;
        }

        let path = &self.files[self.cursor];
        self.cursor += 1;

        let image = image::open(path)
            .map_err(|e| VisionError::TransientRead(format!("Failed to decode {:?}: {}", path, e)))?;
        debug!("Replaying {:?}", path);

        let mut frame = Frame::from_rgb_image(image.to_rgb8());
        frame.convert_to(PixelEncoding::Bgr8);
        Ok(frame)
    }

    fn close(&mut self) {
        self.opened = false;
        self.files.clear();
        self.cursor = 0;
    }

    fn is_open(&self) -> bool {
        self.opened
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Color;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    fn write_image(dir: &Path, name: &str, color: [u8; 3]) {
        let image = RgbImage::from_pixel(8, 6, Rgb(color));
        image.save(dir.join(name)).unwrap();
    }

    #[test]
    fn test_replay_reads_in_name_order_then_ends() {
        let dir = TempDir::new().unwrap();
        write_image(dir.path(), "b.png", [0, 255, 0]);
        write_image(dir.path(), "a.png", [255, 0, 0]);
        std::fs::write(dir.path().join("notes.txt"), "skip me").unwrap();

        let mut source = ReplaySource::new(dir.path());
        source.open(0).unwrap();
        assert_eq!(source.len(), 2);

        let first = source.read().unwrap();
        assert_eq!(first.encoding(), PixelEncoding::Bgr8);
        assert_eq!(first.dimensions(), (8, 6));
        assert_eq!(first.pixel(0, 0), Some(Color::rgb(255, 0, 0)));

        let second = source.read().unwrap();
        assert_eq!(second.pixel(0, 0), Some(Color::rgb(0, 255, 0)));

        assert!(source.read().unwrap_err().is_transient());
    }

    #[test]
    fn test_replay_loops_when_asked() {
        let dir = TempDir::new().unwrap();
        write_image(dir.path(), "only.png", [1, 2, 3]);

        let mut source = ReplaySource::new(dir.path()).looping(true);
        source.open(0).unwrap();
        for _ in 0..3 {
            assert!(source.read().is_ok());
        }
    }

    #[test]
    fn test_replay_missing_or_empty_dir_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let mut empty = ReplaySource::new(dir.path());
        assert!(matches!(empty.open(0), Err(VisionError::SourceUnavailable(_))));
        assert!(!empty.is_open());

        let mut missing = ReplaySource::new(dir.path().join("nope"));
        assert!(matches!(missing.open(0), Err(VisionError::SourceUnavailable(_))));
    }

    #[test]
    fn test_replay_close_is_idempotent() {
        let dir = TempDir::new().unwrap();
        write_image(dir.path(), "a.png", [9, 9, 9]);

        let mut source = ReplaySource::new(dir.path());
        source.open(0).unwrap();
        source.close();
        source.close();
        assert!(!source.is_open());
        assert!(source.read().unwrap_err().is_transient());
    }
}
