//! RGBA pixel buffer shared by every pipeline stage.
//!
//! A [`PixelBuffer`] always holds at least one pixel and exactly
//! `width * height * 4` bytes. Stages never resize a buffer in place;
//! each transform allocates a fresh one.

use std::io::Cursor;

use image::{ImageFormat, RgbaImage};

use crate::error::{EditError, Result};

/// Bytes per RGBA pixel.
pub const CHANNELS: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    image: RgbaImage,
}

impl PixelBuffer {
    /// Wrap raw row-major RGBA bytes.
    ///
    /// # Errors
    ///
    /// Returns [`EditError::InvalidBuffer`] for zero dimensions or when
    /// `pixels.len() != width * height * 4`.
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        check_dimensions(width, height)?;
        let expected = width as usize * height as usize * CHANNELS;
        if pixels.len() != expected {
            return Err(EditError::InvalidBuffer(format!(
                "{}x{} buffer needs {} bytes, got {}",
                width,
                height,
                expected,
                pixels.len()
            )));
        }
        let image = RgbaImage::from_raw(width, height, pixels).ok_or_else(|| {
            EditError::InvalidBuffer(format!("cannot build {width}x{height} image"))
        })?;
        Ok(Self { image })
    }

    /// A buffer where every pixel has the same RGBA value.
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Result<Self> {
        check_dimensions(width, height)?;
        Ok(Self {
            image: RgbaImage::from_pixel(width, height, image::Rgba(rgba)),
        })
    }

    pub fn from_rgba_image(image: RgbaImage) -> Result<Self> {
        check_dimensions(image.width(), image.height())?;
        Ok(Self { image })
    }

    /// Wrap an image derived from an existing buffer of the same size.
    pub(crate) fn from_derived(image: RgbaImage) -> Self {
        debug_assert!(image.width() > 0 && image.height() > 0);
        Self { image }
    }

    /// Decode any format supported by `image` into RGBA8.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let _span = tracing::debug_span!("decode", bytes = bytes.len()).entered();
        let decoded = image::load_from_memory(bytes)?;
        Self::from_rgba_image(decoded.to_rgba8())
    }

    /// Serialize to lossless PNG bytes.
    pub fn encode_png(&self) -> Result<Vec<u8>> {
        let mut out = Cursor::new(Vec::new());
        self.image
            .write_to(&mut out, ImageFormat::Png)
            .map_err(|err| EditError::Export(err.to_string()))?;
        Ok(out.into_inner())
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Number of pixels (`width * height`).
    pub fn pixel_count(&self) -> usize {
        self.width() as usize * self.height() as usize
    }

    /// Raw RGBA bytes, row-major.
    pub fn pixels(&self) -> &[u8] {
        self.image.as_raw()
    }

    /// RGBA value of pixel `index` in row-major order.
    pub fn pixel(&self, index: usize) -> Option<[u8; 4]> {
        let offset = index.checked_mul(CHANNELS)?;
        let bytes = self.pixels().get(offset..offset + CHANNELS)?;
        Some([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    pub fn as_rgba_image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn into_rgba_image(self) -> RgbaImage {
        self.image
    }
}

fn check_dimensions(width: u32, height: u32) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(EditError::InvalidBuffer(format!(
            "zero-sized buffer ({width}x{height})"
        )));
    }
    Ok(())
}
