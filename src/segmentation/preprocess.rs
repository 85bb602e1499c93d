use anyhow::{ensure, Result};
use image::{imageops, GrayImage, Luma};
use ndarray::Array4;

use crate::buffer::PixelBuffer;

/// Preprocessor for converting pixel buffers to model input tensors
#[derive(Debug, Clone)]
pub struct Preprocessor {
    target_width: u32,
    target_height: u32,
    mean: [f32; 3],
    std: [f32; 3],
}

impl Preprocessor {
    /// Plain `[0, 1]` normalization.
    pub fn new(target_width: u32, target_height: u32) -> Self {
        Self {
            target_width,
            target_height,
            mean: [0.0; 3],
            std: [1.0; 3],
        }
    }

    /// Per-channel standardization applied after scaling to `[0, 1]`.
    pub fn with_normalization(mut self, mean: [f32; 3], std: [f32; 3]) -> Self {
        self.mean = mean;
        self.std = std;
        self
    }

    pub fn target_size(&self) -> (u32, u32) {
        (self.target_width, self.target_height)
    }

    /// Preprocess a buffer into a normalized NCHW tensor
    ///
    /// Steps:
    /// 1. Resize to target dimensions
    /// 2. Convert to float, scale to [0, 1] and standardize
    /// 3. Transpose from HWC to NCHW format (alpha is dropped)
    ///
    /// Returns: Array4<f32> with shape [1, 3, height, width]
    pub fn preprocess(&self, frame: &PixelBuffer) -> Array4<f32> {
        let _span = tracing::debug_span!("preprocess").entered();

        let source = frame.as_rgba_image();
        let resized;
        let image = if source.dimensions() != self.target_size() {
            resized = imageops::resize(
                source,
                self.target_width,
                self.target_height,
                imageops::FilterType::Triangle,
            );
            &resized
        } else {
            source
        };

        let (width, height) = image.dimensions();
        let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));

        for (x, y, pixel) in image.enumerate_pixels() {
            for c in 0..3 {
                let value = f32::from(pixel[c]) / 255.0;
                tensor[[0, c, y as usize, x as usize]] = (value - self.mean[c]) / self.std[c];
            }
        }

        tensor
    }

    /// Resize a matte from model resolution to frame resolution
    ///
    /// # Arguments
    /// * `matte` - Flattened matte at model resolution
    /// * `matte_width` / `matte_height` - Dimensions of `matte`
    /// * `target_width` / `target_height` - Frame dimensions
    ///
    /// Returns: Resized matte flattened in row-major order
    pub fn postprocess_matte(
        matte: &[f32],
        matte_width: u32,
        matte_height: u32,
        target_width: u32,
        target_height: u32,
    ) -> Result<Vec<f32>> {
        let _span = tracing::debug_span!("postprocess").entered();

        ensure!(
            matte.len() == matte_width as usize * matte_height as usize,
            "matte has {} values, expected {}x{}",
            matte.len(),
            matte_width,
            matte_height
        );

        if matte_width == target_width && matte_height == target_height {
            return Ok(matte.iter().map(|v| v.clamp(0.0, 1.0)).collect());
        }

        let gray = GrayImage::from_fn(matte_width, matte_height, |x, y| {
            let idx = (y * matte_width + x) as usize;
            Luma([(matte[idx] * 255.0).round().clamp(0.0, 255.0) as u8])
        });

        let resized = imageops::resize(
            &gray,
            target_width,
            target_height,
            imageops::FilterType::Triangle,
        );

        Ok(resized.pixels().map(|p| f32::from(p[0]) / 255.0).collect())
    }
}
