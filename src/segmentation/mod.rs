mod mask_image;
#[cfg(feature = "onnx")]
mod onnx;
mod preprocess;
mod service;
pub mod types;

pub use mask_image::MaskImageModel;
#[cfg(feature = "onnx")]
pub use onnx::OnnxSegmenter;
pub use preprocess::Preprocessor;
pub use service::{
    ModelLoader, ModelState, SegmentationConfig, SegmentationService, SharedModel,
};
pub use types::{Matte, SegmentationMask, SegmentationModel};

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;

/// Where a segmentation model comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    /// Precomputed foreground mask image.
    MaskImage(PathBuf),
    /// ONNX portrait segmentation network (requires the `onnx` feature).
    Onnx(PathBuf),
}

/// Build the model described by `source`.
pub fn create_model(source: &ModelSource) -> Result<SharedModel> {
    match source {
        ModelSource::MaskImage(path) => Ok(Arc::new(MaskImageModel::open(path)?)),
        #[cfg(feature = "onnx")]
        ModelSource::Onnx(path) => Ok(Arc::new(OnnxSegmenter::new(path)?)),
        #[cfg(not(feature = "onnx"))]
        ModelSource::Onnx(path) => anyhow::bail!(
            "cannot load {}: built without the `onnx` feature",
            path.display()
        ),
    }
}

/// Loader that builds `source` on first use (and again after a failure).
pub fn loader_for(source: ModelSource) -> ModelLoader {
    Arc::new(move || create_model(&source))
}
