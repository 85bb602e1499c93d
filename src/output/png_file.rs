use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::OutputSink;
use crate::buffer::PixelBuffer;
use crate::error::{EditError, Result};

/// Writes the output as a lossless PNG file.
pub struct PngFileSink {
    path: PathBuf,
}

impl PngFileSink {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl OutputSink for PngFileSink {
    fn write_image(&mut self, image: &PixelBuffer) -> Result<()> {
        let _span = tracing::debug_span!("export").entered();
        let png = image.encode_png()?;

        let export_error =
            |err: std::io::Error| EditError::Export(format!("{}: {}", self.path.display(), err));
        let mut file = File::create(&self.path).map_err(export_error)?;
        file.write_all(&png).map_err(export_error)?;

        tracing::info!(
            "Wrote {}x{} PNG to {}",
            image.width(),
            image.height(),
            self.path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_decodable_png() {
        let path = std::env::temp_dir().join(format!("photo-fx-sink-{}.png", std::process::id()));
        let image = PixelBuffer::filled(2, 3, [1, 2, 3, 128]).unwrap();

        PngFileSink::new(&path).write_image(&image).unwrap();
        let written = PixelBuffer::decode(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(written, image);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn unwritable_path_is_export_error() {
        let image = PixelBuffer::filled(1, 1, [0; 4]).unwrap();
        let err = PngFileSink::new("/nonexistent/dir/out.png")
            .write_image(&image)
            .unwrap_err();
        assert!(matches!(err, EditError::Export(_)));
    }
}
