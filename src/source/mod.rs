mod file;

pub use file::FileSource;

use anyhow::Result;

use crate::buffer::PixelBuffer;

/// Trait for places a source image can come from
pub trait ImageSource {
    /// Read and decode the image
    fn load(&mut self) -> Result<PixelBuffer>;

    /// Display name, used to derive the export file name
    fn name(&self) -> &str;
}
