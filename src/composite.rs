//! Hard per-pixel compositing of subject over background.

use rayon::prelude::*;

use crate::buffer::{PixelBuffer, CHANNELS};
use crate::error::{EditError, Result};
use crate::segmentation::SegmentationMask;

/// Keep `source` where the mask marks the subject, take all four
/// channels from `background` everywhere else. No blending at edges.
///
/// # Errors
///
/// [`EditError::InvalidBuffer`] if the background or mask size differs
/// from the source.
pub fn composite(
    source: &PixelBuffer,
    background: &PixelBuffer,
    mask: &SegmentationMask,
) -> Result<PixelBuffer> {
    let _span = tracing::debug_span!("composite").entered();

    if source.dimensions() != background.dimensions() {
        return Err(EditError::InvalidBuffer(format!(
            "background is {}x{} but source is {}x{}",
            background.width(),
            background.height(),
            source.width(),
            source.height()
        )));
    }
    mask.ensure_matches(source)?;

    let subject = mask.as_slice();
    let stride = source.width() as usize * CHANNELS;
    let row_len = source.width() as usize;
    let mut out = source.pixels().to_vec();

    out.par_chunks_mut(stride)
        .zip(background.pixels().par_chunks(stride))
        .zip(subject.par_chunks(row_len))
        .for_each(|((row_out, row_bg), row_mask)| {
            for (x, &keep) in row_mask.iter().enumerate() {
                if !keep {
                    let pi = x * CHANNELS;
                    row_out[pi..pi + CHANNELS].copy_from_slice(&row_bg[pi..pi + CHANNELS]);
                }
            }
        });

    PixelBuffer::new(source.width(), source.height(), out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(width: u32, height: u32, pixels: &[[u8; 4]]) -> PixelBuffer {
        PixelBuffer::new(width, height, pixels.concat()).unwrap()
    }

    #[test]
    fn selects_per_pixel() {
        let source = buffer(2, 1, &[[10, 20, 30, 255], [40, 50, 60, 255]]);
        let background = buffer(2, 1, &[[0, 0, 0, 255], [255, 255, 255, 255]]);
        let mask = SegmentationMask::new(2, 1, vec![true, false]).unwrap();

        let out = composite(&source, &background, &mask).unwrap();
        assert_eq!(out, buffer(2, 1, &[[10, 20, 30, 255], [255, 255, 255, 255]]));
    }

    #[test]
    fn background_alpha_is_copied() {
        let source = buffer(1, 2, &[[1, 2, 3, 255], [4, 5, 6, 255]]);
        let background = buffer(1, 2, &[[0, 0, 0, 0], [0, 0, 0, 0]]);
        let mask = SegmentationMask::new(1, 2, vec![false, true]).unwrap();

        let out = composite(&source, &background, &mask).unwrap();
        assert_eq!(out.pixel(0), Some([0, 0, 0, 0]));
        assert_eq!(out.pixel(1), Some([4, 5, 6, 255]));
    }

    #[test]
    fn all_subject_is_identity() {
        let source = buffer(2, 2, &[[9, 9, 9, 9], [8, 8, 8, 8], [7, 7, 7, 7], [6, 6, 6, 6]]);
        let background = PixelBuffer::filled(2, 2, [0, 0, 0, 255]).unwrap();
        let mask = SegmentationMask::new(2, 2, vec![true; 4]).unwrap();
        assert_eq!(composite(&source, &background, &mask).unwrap(), source);
    }

    #[test]
    fn mismatched_background_fails_fast() {
        let source = PixelBuffer::filled(2, 1, [1, 1, 1, 255]).unwrap();
        let background = PixelBuffer::filled(1, 2, [0, 0, 0, 255]).unwrap();
        let mask = SegmentationMask::new(2, 1, vec![false, false]).unwrap();
        assert!(matches!(
            composite(&source, &background, &mask),
            Err(EditError::InvalidBuffer(_))
        ));
    }

    #[test]
    fn mismatched_mask_fails_fast() {
        let source = PixelBuffer::filled(2, 2, [1, 1, 1, 255]).unwrap();
        let background = PixelBuffer::filled(2, 2, [0, 0, 0, 255]).unwrap();
        let mask = SegmentationMask::new(4, 1, vec![false; 4]).unwrap();
        assert!(composite(&source, &background, &mask).is_err());
    }
}
