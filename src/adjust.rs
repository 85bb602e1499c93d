//! Global brightness / contrast / saturation adjustments.
//!
//! Each RGB channel is mapped to `[0, 1]`, pushed through the active
//! stages in order (brightness, contrast, saturation), clamped once and
//! re-quantized with rounding. Alpha is passed through. An optional final
//! stage blurs the RGB channels.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::blur;
use crate::buffer::{PixelBuffer, CHANNELS};
use crate::error::{EditError, Result};

pub const NEUTRAL_PERCENT: u16 = 100;
pub const MAX_PERCENT: u16 = 200;
pub const MAX_BLUR_PX: u16 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdjustmentParams {
    /// Percent, 0-200, 100 = unchanged.
    pub brightness: u16,
    /// Percent, 0-200, 100 = unchanged.
    pub contrast: u16,
    /// Percent, 0-200, 100 = unchanged.
    pub saturation: u16,
    /// Whole-image blur radius in pixels, 0-20, 0 = off.
    pub blur_px: u16,
}

impl Default for AdjustmentParams {
    fn default() -> Self {
        Self {
            brightness: NEUTRAL_PERCENT,
            contrast: NEUTRAL_PERCENT,
            saturation: NEUTRAL_PERCENT,
            blur_px: 0,
        }
    }
}

impl AdjustmentParams {
    pub fn is_neutral(&self) -> bool {
        *self == Self::default()
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("brightness", self.brightness),
            ("contrast", self.contrast),
            ("saturation", self.saturation),
        ] {
            if value > MAX_PERCENT {
                return Err(EditError::InvalidParams(format!(
                    "{name} must be 0-{MAX_PERCENT}, got {value}"
                )));
            }
        }
        if self.blur_px > MAX_BLUR_PX {
            return Err(EditError::InvalidParams(format!(
                "blur must be 0-{MAX_BLUR_PX}px, got {}",
                self.blur_px
            )));
        }
        Ok(())
    }
}

/// Per-pixel color transform in normalized space. `None` stages are
/// neutral and skipped.
#[derive(Debug, Clone, Copy)]
struct ToneCurve {
    brightness_offset: Option<f32>,
    contrast_factor: Option<f32>,
    saturation_factor: Option<f32>,
}

impl ToneCurve {
    fn new(params: &AdjustmentParams) -> Self {
        let active = |value: u16| (value != NEUTRAL_PERCENT).then_some(f32::from(value));
        Self {
            brightness_offset: active(params.brightness).map(|b| (b - 100.0) / 100.0),
            contrast_factor: active(params.contrast).map(|c| (c + 100.0) / 200.0),
            saturation_factor: active(params.saturation).map(|s| s / 100.0),
        }
    }

    fn is_identity(&self) -> bool {
        self.brightness_offset.is_none()
            && self.contrast_factor.is_none()
            && self.saturation_factor.is_none()
    }

    fn apply(&self, mut rgb: [f32; 3]) -> [f32; 3] {
        if let Some(offset) = self.brightness_offset {
            rgb = rgb.map(|c| c + offset);
        }
        if let Some(factor) = self.contrast_factor {
            rgb = rgb.map(|c| (c - 0.5) * factor + 0.5);
        }
        if let Some(factor) = self.saturation_factor {
            // Unweighted mean, not perceptual luminance.
            let gray = (rgb[0] + rgb[1] + rgb[2]) / 3.0;
            rgb = rgb.map(|c| c * factor + gray * (1.0 - factor));
        }
        rgb
    }
}

fn normalize(byte: u8) -> f32 {
    f32::from(byte) / 255.0
}

fn quantize(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Apply `params` to `buffer`, returning a new buffer.
pub fn adjust(buffer: &PixelBuffer, params: &AdjustmentParams) -> PixelBuffer {
    let _span = tracing::debug_span!(
        "adjust",
        brightness = params.brightness,
        contrast = params.contrast,
        saturation = params.saturation,
        blur_px = params.blur_px
    )
    .entered();

    let curve = ToneCurve::new(params);
    let toned = if curve.is_identity() {
        buffer.clone()
    } else {
        apply_curve(buffer, &curve)
    };

    if params.blur_px > 0 {
        blur::blur_rgb(&toned, f32::from(params.blur_px))
    } else {
        toned
    }
}

fn apply_curve(buffer: &PixelBuffer, curve: &ToneCurve) -> PixelBuffer {
    let stride = buffer.width() as usize * CHANNELS;
    let src = buffer.pixels();
    let mut dst = image::RgbaImage::new(buffer.width(), buffer.height());

    dst.par_chunks_mut(stride)
        .zip(src.par_chunks(stride))
        .for_each(|(row_out, row_in)| {
            for (out, px) in row_out
                .chunks_exact_mut(CHANNELS)
                .zip(row_in.chunks_exact(CHANNELS))
            {
                let [r, g, b] = curve.apply([normalize(px[0]), normalize(px[1]), normalize(px[2])]);
                out[0] = quantize(r);
                out[1] = quantize(g);
                out[2] = quantize(b);
                out[3] = px[3];
            }
        });

    PixelBuffer::from_derived(dst)
}
