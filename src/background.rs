//! Background synthesis: builds a buffer the size of the source canvas
//! to sit behind the segmented subject.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use image::imageops::{self, FilterType};
use serde::{Deserialize, Serialize};

use crate::blur;
use crate::buffer::PixelBuffer;
use crate::error::EditError;

/// Opaque RGB color, written as `#rrggbb`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const WHITE: Self = Self::new(255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub const fn to_rgba(self) -> [u8; 4] {
        [self.r, self.g, self.b, 255]
    }
}

impl FromStr for Color {
    type Err = EditError;

    /// Accepts `#rrggbb`, `rrggbb` and the short `#rgb` form.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || EditError::InvalidParams(format!("invalid color {s:?}"));
        let hex = s.trim().trim_start_matches('#');
        if !hex.is_ascii() {
            return Err(invalid());
        }
        let channel = |digits: &str| u8::from_str_radix(digits, 16).map_err(|_| invalid());
        match hex.len() {
            6 => Ok(Self::new(
                channel(&hex[0..2])?,
                channel(&hex[2..4])?,
                channel(&hex[4..6])?,
            )),
            3 => {
                let short = |i: usize| channel(&hex[i..=i]).map(|v| v * 17);
                Ok(Self::new(short(0)?, short(1)?, short(2)?))
            }
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl TryFrom<String> for Color {
    type Error = EditError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_string()
    }
}

/// Serializable background selector, as carried in the parameter record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackgroundKind {
    #[default]
    None,
    Color,
    Image,
    Blur,
    Transparent,
}

/// What to place behind the subject.
#[derive(Debug, Clone, PartialEq)]
pub enum BackgroundSpec {
    /// Keep the source as-is; compositing becomes a no-op.
    None,
    /// Solid opaque fill.
    Color(Color),
    /// User image, cover-fitted to the canvas.
    Image(Arc<PixelBuffer>),
    /// Blurred copy of the unmodified source.
    Blur(u32),
    /// Fully transparent, leaving a cut-out subject.
    Transparent,
}

/// Scale-and-crop geometry that makes a background cover the canvas
/// without letterboxing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoverFit {
    pub scale: f64,
    pub scaled_width: u32,
    pub scaled_height: u32,
    /// Columns dropped from the left of the scaled image.
    pub crop_x: u32,
    /// Rows dropped from the top of the scaled image.
    pub crop_y: u32,
}

impl CoverFit {
    pub fn compute(canvas: (u32, u32), background: (u32, u32)) -> Self {
        let (width, height) = canvas;
        let (bg_width, bg_height) = background;
        let scale = (f64::from(width) / f64::from(bg_width))
            .max(f64::from(height) / f64::from(bg_height));

        // Rounding can land one pixel short of the canvas; never allow that.
        let scaled_width = ((f64::from(bg_width) * scale).round() as u32).max(width);
        let scaled_height = ((f64::from(bg_height) * scale).round() as u32).max(height);

        Self {
            scale,
            scaled_width,
            scaled_height,
            crop_x: (scaled_width - width) / 2,
            crop_y: (scaled_height - height) / 2,
        }
    }
}

/// Build the background buffer for `source`'s canvas.
pub fn synthesize(spec: &BackgroundSpec, source: &PixelBuffer) -> PixelBuffer {
    let _span = tracing::debug_span!("synthesize_background").entered();
    let (width, height) = source.dimensions();

    match spec {
        BackgroundSpec::None => source.clone(),
        BackgroundSpec::Transparent => {
            PixelBuffer::from_derived(image::RgbaImage::new(width, height))
        }
        BackgroundSpec::Color(color) => PixelBuffer::from_derived(image::RgbaImage::from_pixel(
            width,
            height,
            image::Rgba(color.to_rgba()),
        )),
        BackgroundSpec::Image(background) => cover(background, width, height),
        BackgroundSpec::Blur(radius_px) => blur::blur_rgba(source, *radius_px as f32),
    }
}

fn cover(background: &PixelBuffer, width: u32, height: u32) -> PixelBuffer {
    let fit = CoverFit::compute((width, height), background.dimensions());
    tracing::debug!(
        "Cover-fitting {}x{} background to {}x{} (scale {:.3})",
        background.width(),
        background.height(),
        width,
        height,
        fit.scale
    );

    let scaled = if (fit.scaled_width, fit.scaled_height) == background.dimensions() {
        background.as_rgba_image().clone()
    } else {
        imageops::resize(
            background.as_rgba_image(),
            fit.scaled_width,
            fit.scaled_height,
            FilterType::Lanczos3,
        )
    };

    let cropped = imageops::crop_imm(&scaled, fit.crop_x, fit.crop_y, width, height).to_image();
    PixelBuffer::from_derived(cropped)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32) -> PixelBuffer {
        let image = image::RgbaImage::from_fn(width, height, |x, y| {
            image::Rgba([(x * 10) as u8, (y * 10) as u8, 77, 255])
        });
        PixelBuffer::from_rgba_image(image).unwrap()
    }

    #[test]
    fn parses_hex_colors() {
        assert_eq!("#ffffff".parse::<Color>().unwrap(), Color::WHITE);
        assert_eq!("00ff7f".parse::<Color>().unwrap(), Color::new(0, 255, 127));
        assert_eq!("#0f8".parse::<Color>().unwrap(), Color::new(0, 255, 136));
        assert!("#12345".parse::<Color>().is_err());
        assert!("#gg0000".parse::<Color>().is_err());
        assert!("#ééé".parse::<Color>().is_err());
        assert_eq!(Color::new(1, 171, 255).to_string(), "#01abff");
    }

    #[test]
    fn color_fill_is_opaque() {
        let source = gradient(3, 2);
        let out = synthesize(&BackgroundSpec::Color(Color::new(9, 8, 7)), &source);
        assert_eq!(out.dimensions(), (3, 2));
        assert!(out.pixels().chunks_exact(4).all(|px| px == [9, 8, 7, 255]));
    }

    #[test]
    fn none_returns_source() {
        let source = gradient(4, 4);
        assert_eq!(synthesize(&BackgroundSpec::None, &source), source);
    }

    #[test]
    fn transparent_clears_everything() {
        let out = synthesize(&BackgroundSpec::Transparent, &gradient(2, 2));
        assert!(out.pixels().iter().all(|&b| b == 0));
    }

    #[test]
    fn cover_fit_wide_canvas_square_image() {
        let fit = CoverFit::compute((100, 50), (50, 50));
        assert_eq!(fit.scale, 2.0);
        assert_eq!((fit.scaled_width, fit.scaled_height), (100, 100));
        assert_eq!((fit.crop_x, fit.crop_y), (0, 25));
    }

    #[test]
    fn cover_fit_tall_canvas() {
        let fit = CoverFit::compute((30, 90), (40, 40));
        assert_eq!(fit.scale, 90.0 / 40.0);
        assert_eq!((fit.scaled_width, fit.scaled_height), (90, 90));
        assert_eq!((fit.crop_x, fit.crop_y), (30, 0));
    }

    #[test]
    fn cover_fit_downscales_large_backgrounds() {
        let fit = CoverFit::compute((10, 10), (40, 20));
        assert_eq!(fit.scale, 0.5);
        assert_eq!((fit.scaled_width, fit.scaled_height), (20, 10));
        assert_eq!((fit.crop_x, fit.crop_y), (5, 0));
    }

    #[test]
    fn image_background_matches_canvas() {
        let source = gradient(100, 50);
        let background = Arc::new(gradient(50, 50));
        let out = synthesize(&BackgroundSpec::Image(background), &source);
        assert_eq!(out.dimensions(), (100, 50));
    }

    #[test]
    fn same_size_image_is_copied_verbatim() {
        let source = gradient(6, 4);
        let background = gradient(6, 4);
        let out = synthesize(&BackgroundSpec::Image(Arc::new(background.clone())), &source);
        assert_eq!(out, background);
    }

    #[test]
    fn blur_background_uses_source() {
        let source = gradient(12, 12);
        let out = synthesize(&BackgroundSpec::Blur(3), &source);
        assert_eq!(out, blur::blur_rgba(&source, 3.0));
        assert_eq!(synthesize(&BackgroundSpec::Blur(0), &source), source);
    }

    #[test]
    fn kind_serializes_lowercase() {
        let json = serde_json::to_string(&BackgroundKind::Transparent).unwrap();
        assert_eq!(json, "\"transparent\"");
        let color: Color = serde_json::from_str("\"#102030\"").unwrap();
        assert_eq!(color, Color::new(16, 32, 48));
    }
}
