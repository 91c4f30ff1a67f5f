//! Frames, pixel encodings and the reusable working buffer

use crate::error::VisionError;
use image::imageops::{self, FilterType};
use image::{ImageBuffer, Rgb, RgbImage};

/// Channel order of a packed 8-bit, 3-channel frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelEncoding {
    /// Blue, green, red (what capture devices hand out)
    Bgr8,
    /// Red, green, blue (what displays and image files expect)
    Rgb8,
}

/// An RGB color, independent of any frame's channel order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Build a color from a blue, green, red triple
    pub const fn bgr(b: u8, g: u8, r: u8) -> Self {
        Self { r, g, b }
    }

    fn to_bytes(self, encoding: PixelEncoding) -> [u8; 3] {
        match encoding {
            PixelEncoding::Bgr8 => [self.b, self.g, self.r],
            PixelEncoding::Rgb8 => [self.r, self.g, self.b],
        }
    }
}

/// One still image sampled from a video stream
#[derive(Debug, PartialEq)]
pub struct Frame {
    width: u32,
    height: u32,
    encoding: PixelEncoding,
    data: Vec<u8>,
}

impl Clone for Frame {
    fn clone(&self) -> Self {
        Self {
            width: self.width,
            height: self.height,
            encoding: self.encoding,
            data: self.data.clone(),
        }
    }

    fn clone_from(&mut self, source: &Self) {
        self.width = source.width;
        self.height = source.height;
        self.encoding = source.encoding;
        self.data.clone_from(&source.data);
    }
}

impl Frame {
    /// Create a black frame
    pub fn new(width: u32, height: u32, encoding: PixelEncoding) -> Self {
        Self {
            width,
            height,
            encoding,
            data: vec![0; width as usize * height as usize * 3],
        }
    }

    /// Wrap packed pixel bytes, checking the length matches the dimensions
    pub fn from_raw(
        width: u32,
        height: u32,
        encoding: PixelEncoding,
        data: Vec<u8>,
    ) -> Result<Self, VisionError> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|p| p.checked_mul(3))
            .ok_or_else(|| VisionError::Config("Frame dimensions would overflow".to_string()))?;
        if data.len() != expected {
            return Err(VisionError::Config(format!(
                "Frame buffer holds {} bytes, {}x{} needs {}",
                data.len(),
                width,
                height,
                expected
            )));
        }
        Ok(Self { width, height, encoding, data })
    }

    /// Take ownership of an RGB image without copying
    pub fn from_rgb_image(image: RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            encoding: PixelEncoding::Rgb8,
            data: image.into_raw(),
        }
    }

    /// Copy into an RGB image, swapping channels when needed
    pub fn to_rgb_image(&self) -> RgbImage {
        let mut data = self.data.clone();
        if self.encoding == PixelEncoding::Bgr8 {
            swap_red_blue(&mut data);
        }
        // Length is checked at construction
        RgbImage::from_raw(self.width, self.height, data).unwrap_or_else(|| RgbImage::new(self.width, self.height))
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn encoding(&self) -> PixelEncoding {
        self.encoding
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Color at (x, y), or None outside the frame
    pub fn pixel(&self, x: u32, y: u32) -> Option<Color> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = self.offset(x, y);
        let px = &self.data[idx..idx + 3];
        Some(match self.encoding {
            PixelEncoding::Bgr8 => Color::bgr(px[0], px[1], px[2]),
            PixelEncoding::Rgb8 => Color::rgb(px[0], px[1], px[2]),
        })
    }

    /// Set one pixel; coordinates outside the frame are ignored
    pub fn put_pixel(&mut self, x: i32, y: i32, color: Color) {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return;
        }
        let idx = self.offset(x as u32, y as u32);
        self.data[idx..idx + 3].copy_from_slice(&color.to_bytes(self.encoding));
    }

    /// Fill every pixel with one color
    pub fn fill(&mut self, color: Color) {
        let bytes = color.to_bytes(self.encoding);
        for px in self.data.chunks_exact_mut(3) {
            px.copy_from_slice(&bytes);
        }
    }

    /// Re-encode in place; a no-op when already in `encoding`
    pub fn convert_to(&mut self, encoding: PixelEncoding) {
        if self.encoding != encoding {
            swap_red_blue(&mut self.data);
            self.encoding = encoding;
        }
    }

    /// Bilinear resample of `self` into `dst`, keeping `dst`'s dimensions and
    /// allocation. `dst` takes on `self`'s encoding.
    pub fn resize_into(&self, dst: &mut Frame) {
        dst.encoding = self.encoding;
        if self.is_empty() || dst.is_empty() {
            return;
        }
        if self.dimensions() == dst.dimensions() {
            dst.data.copy_from_slice(&self.data);
            return;
        }

        // Channel order is irrelevant to resampling, so BGR data goes through as-is
        let Some(view) = ImageBuffer::<Rgb<u8>, &[u8]>::from_raw(self.width, self.height, self.data.as_slice()) else {
            return;
        };
        let resized = imageops::resize(&view, dst.width, dst.height, FilterType::Triangle);
        dst.data.copy_from_slice(resized.as_raw());
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * 3
    }
}

fn swap_red_blue(data: &mut [u8]) {
    for px in data.chunks_exact_mut(3) {
        px.swap(0, 2);
    }
}

/// Keeps one working frame per target size so processed cycles do not
/// allocate a fresh buffer every time.
#[derive(Debug, Default)]
pub struct FrameArena {
    slot: Option<Frame>,
}

impl FrameArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Borrow the working frame for `size`, reallocating only when the size changed
    pub fn acquire(&mut self, size: (u32, u32)) -> &mut Frame {
        let stale = self
            .slot
            .as_ref()
            .map_or(true, |frame| frame.dimensions() != size);
        if stale {
            self.slot = Some(Frame::new(size.0, size.1, PixelEncoding::Bgr8));
        }
        self.slot.get_or_insert_with(|| Frame::new(size.0, size.1, PixelEncoding::Bgr8))
    }

    /// Drop the working buffer
    pub fn clear(&mut self) {
        self.slot = None;
    }
}
