use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use super::ImageSource;
use crate::buffer::PixelBuffer;

pub struct FileSource {
    path: PathBuf,
    name: String,
}

impl FileSource {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self { path, name }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ImageSource for FileSource {
    fn load(&mut self) -> Result<PixelBuffer> {
        tracing::info!("Reading {}", self.path.display());

        let bytes = std::fs::read(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;

        let buffer = PixelBuffer::decode(&bytes)
            .with_context(|| format!("Failed to decode {}", self.path.display()))?;

        tracing::info!("Decoded {}x{} image", buffer.width(), buffer.height());
        Ok(buffer)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_and_decodes_png() {
        let buffer = PixelBuffer::filled(3, 2, [7, 8, 9, 255]).unwrap();
        let path = std::env::temp_dir().join(format!("photo-fx-source-{}.png", std::process::id()));
        std::fs::write(&path, buffer.encode_png().unwrap()).unwrap();

        let mut source = FileSource::new(&path);
        assert!(source.name().starts_with("photo-fx-source-"));
        assert_eq!(source.load().unwrap(), buffer);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn missing_file_has_context() {
        let mut source = FileSource::new("/nonexistent/portrait.jpg");
        let err = source.load().unwrap_err();
        assert!(format!("{err:#}").contains("Failed to read"));
        assert_eq!(source.name(), "portrait.jpg");
    }
}
