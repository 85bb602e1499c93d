//! Gaussian blur over RGBA buffers.
//!
//! Wraps [`imageproc::filter::gaussian_blur_f32`], which operates on a
//! single channel, by splitting the buffer into planes, blurring the
//! requested planes and reassembling. The radius is used directly as the
//! Gaussian standard deviation, matching CSS `blur(<radius>px)`.

use image::{GrayImage, Luma, Rgba, RgbaImage};

use crate::buffer::PixelBuffer;

/// Blur all four channels. Used for the blurred-background mode.
#[must_use = "returns the blurred buffer"]
pub fn blur_rgba(buffer: &PixelBuffer, radius_px: f32) -> PixelBuffer {
    blur_channels(buffer, radius_px, 4)
}

/// Blur R, G and B while passing alpha through untouched.
#[must_use = "returns the blurred buffer"]
pub fn blur_rgb(buffer: &PixelBuffer, radius_px: f32) -> PixelBuffer {
    blur_channels(buffer, radius_px, 3)
}

fn blur_channels(buffer: &PixelBuffer, sigma: f32, blurred_channels: usize) -> PixelBuffer {
    // imageproc panics on sigma <= 0.
    if sigma <= 0.0 {
        return buffer.clone();
    }

    let _span = tracing::debug_span!("blur", sigma, blurred_channels).entered();
    let image = buffer.as_rgba_image();
    let (w, h) = image.dimensions();

    let planes: [GrayImage; 4] = std::array::from_fn(|c| {
        let plane = GrayImage::from_fn(w, h, |x, y| Luma([image.get_pixel(x, y).0[c]]));
        if c < blurred_channels {
            imageproc::filter::gaussian_blur_f32(&plane, sigma)
        } else {
            plane
        }
    });

    let out = RgbaImage::from_fn(w, h, |x, y| {
        Rgba([
            planes[0].get_pixel(x, y).0[0],
            planes[1].get_pixel(x, y).0[0],
            planes[2].get_pixel(x, y).0[0],
            planes[3].get_pixel(x, y).0[0],
        ])
    });

    PixelBuffer::from_derived(out)
}
