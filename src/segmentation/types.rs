use anyhow::Result;

use crate::buffer::PixelBuffer;
use crate::error::EditError;

/// Foreground probability matte: 0.0 = background, 1.0 = subject.
/// Flattened row-major, same dimensions as the input buffer.
pub type Matte = Vec<f32>;

/// Trait for segmentation models
/// Allows swapping between different backends (ONNX, precomputed masks, ...)
pub trait SegmentationModel: Send + Sync {
    /// Compute a foreground matte for `frame`.
    ///
    /// # Returns
    /// * Matte with values 0.0-1.0, flattened in row-major order, sized
    ///   `frame.width() * frame.height()`
    fn segment(&self, frame: &PixelBuffer) -> Result<Matte>;

    /// Human-readable backend name for logs.
    fn name(&self) -> &str;
}

/// Per-pixel subject membership, index-aligned with a [`PixelBuffer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentationMask {
    width: u32,
    height: u32,
    subject: Vec<bool>,
}

impl SegmentationMask {
    pub fn new(width: u32, height: u32, subject: Vec<bool>) -> Result<Self, EditError> {
        if subject.len() != width as usize * height as usize {
            return Err(EditError::InvalidBuffer(format!(
                "mask has {} entries, {}x{} needs {}",
                subject.len(),
                width,
                height,
                width as usize * height as usize
            )));
        }
        Ok(Self {
            width,
            height,
            subject,
        })
    }

    /// Threshold a probability matte; entries strictly above `threshold`
    /// are subject.
    pub fn from_matte(
        matte: &[f32],
        width: u32,
        height: u32,
        threshold: f32,
    ) -> Result<Self, EditError> {
        Self::new(
            width,
            height,
            matte.iter().map(|&p| p > threshold).collect(),
        )
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn is_subject(&self, index: usize) -> bool {
        self.subject.get(index).copied().unwrap_or(false)
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.subject
    }

    /// Fraction of pixels marked as subject.
    pub fn coverage(&self) -> f32 {
        if self.subject.is_empty() {
            return 0.0;
        }
        self.subject.iter().filter(|&&s| s).count() as f32 / self.subject.len() as f32
    }

    /// Fail unless this mask was computed for `buffer`'s dimensions.
    pub fn ensure_matches(&self, buffer: &PixelBuffer) -> Result<(), EditError> {
        if self.dimensions() != buffer.dimensions() {
            return Err(EditError::InvalidBuffer(format!(
                "mask is {}x{} but buffer is {}x{}",
                self.width,
                self.height,
                buffer.width(),
                buffer.height()
            )));
        }
        Ok(())
    }
}
