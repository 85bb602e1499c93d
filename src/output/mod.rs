mod png_file;

pub use png_file::PngFileSink;

use std::path::Path;

use crate::buffer::PixelBuffer;
use crate::error::Result;

/// Fallback export name when the source name says nothing useful.
pub const DEFAULT_EXPORT_NAME: &str = "edited-image.png";

/// Trait for export destinations
pub trait OutputSink {
    /// Write the final buffer
    fn write_image(&mut self, image: &PixelBuffer) -> Result<()>;
}

/// Export name derived from the source name: `beach.jpg` becomes
/// `beach-edited.png`.
pub fn default_export_name(source_name: &str) -> String {
    let stem = Path::new(source_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty());

    match stem {
        Some(stem) => format!("{stem}-edited.png"),
        None => DEFAULT_EXPORT_NAME.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_name_follows_source() {
        assert_eq!(default_export_name("beach.jpg"), "beach-edited.png");
        assert_eq!(default_export_name("/tmp/shots/me.final.webp"), "me.final-edited.png");
        assert_eq!(default_export_name("noext"), "noext-edited.png");
        assert_eq!(default_export_name(""), DEFAULT_EXPORT_NAME);
    }
}
