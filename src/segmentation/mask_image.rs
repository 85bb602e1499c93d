use std::path::Path;

use anyhow::{Context, Result};
use image::GrayImage;

use super::preprocess::Preprocessor;
use super::types::{Matte, SegmentationModel};
use crate::buffer::PixelBuffer;

/// Segmentation backed by a precomputed mask image
///
/// Bright pixels are subject, dark pixels are background. The mask is
/// stretched to whatever frame it is applied to, so a mask exported at a
/// model's working resolution can be reused on the full-size source.
pub struct MaskImageModel {
    mask: GrayImage,
    name: String,
}

impl MaskImageModel {
    pub fn new(mask: GrayImage) -> Self {
        Self {
            mask,
            name: "mask image".to_string(),
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mask = image::load_from_memory(bytes)
            .context("Failed to decode mask image")?
            .to_luma8();
        Ok(Self::new(mask))
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        tracing::info!("Loading mask image from {}", path.display());

        let mask = image::open(path)
            .with_context(|| format!("Failed to open mask image {}", path.display()))?
            .to_luma8();

        Ok(Self {
            mask,
            name: format!("mask image {}", path.display()),
        })
    }
}

impl SegmentationModel for MaskImageModel {
    fn segment(&self, frame: &PixelBuffer) -> Result<Matte> {
        let _span = tracing::debug_span!("mask_image_segment").entered();

        let (mask_width, mask_height) = self.mask.dimensions();
        let matte: Vec<f32> = self.mask.pixels().map(|p| f32::from(p[0]) / 255.0).collect();

        Preprocessor::postprocess_matte(
            &matte,
            mask_width,
            mask_height,
            frame.width(),
            frame.height(),
        )
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matte_follows_mask_brightness() {
        let mask = GrayImage::from_raw(2, 1, vec![255, 0]).unwrap();
        let model = MaskImageModel::new(mask);
        let frame = PixelBuffer::filled(2, 1, [1, 2, 3, 255]).unwrap();
        assert_eq!(model.segment(&frame).unwrap(), vec![1.0, 0.0]);
    }

    #[test]
    fn mask_is_stretched_to_frame() {
        let mask = GrayImage::from_pixel(3, 3, image::Luma([255]));
        let model = MaskImageModel::new(mask);
        let frame = PixelBuffer::filled(5, 2, [0, 0, 0, 255]).unwrap();
        let matte = model.segment(&frame).unwrap();
        assert_eq!(matte.len(), 10);
    }

    #[test]
    fn decodes_encoded_masks() {
        let mask = PixelBuffer::filled(2, 2, [255, 255, 255, 255]).unwrap();
        let model = MaskImageModel::from_bytes(&mask.encode_png().unwrap()).unwrap();
        let frame = PixelBuffer::filled(2, 2, [0; 4]).unwrap();
        assert!(model.segment(&frame).unwrap().iter().all(|&v| v == 1.0));
        assert!(MaskImageModel::from_bytes(b"nope").is_err());
    }
}
