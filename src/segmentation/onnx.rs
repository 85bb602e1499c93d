use std::path::Path;
use std::sync::{Mutex, PoisonError};

use anyhow::{ensure, Context, Result};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::TensorRef;

use super::preprocess::Preprocessor;
use super::types::{Matte, SegmentationModel};
use crate::buffer::PixelBuffer;

/// Single-image portrait segmentation through ONNX Runtime
///
/// Expects a model with one NCHW float input and a `[1, 1, H, W]`
/// foreground probability output (MODNet / U2-Net style exports).
pub struct OnnxSegmenter {
    // `Session::run` needs exclusive access.
    session: Mutex<Session>,
    preprocessor: Preprocessor,
    name: String,
}

impl OnnxSegmenter {
    /// Create a segmenter from an ONNX file
    ///
    /// # Default Configuration
    /// - Input size: 512x512
    /// - Normalization: mean 0.5, std 0.5 per channel
    pub fn new<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        Self::with_preprocessor(
            model_path,
            Preprocessor::new(512, 512).with_normalization([0.5; 3], [0.5; 3]),
        )
    }

    pub fn with_preprocessor<P: AsRef<Path>>(
        model_path: P,
        preprocessor: Preprocessor,
    ) -> Result<Self> {
        let path = model_path.as_ref();

        tracing::info!("Loading ONNX segmentation model from {}", path.display());

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?
            .commit_from_file(path)
            .with_context(|| format!("Failed to load model from {}", path.display()))?;

        let (width, height) = preprocessor.target_size();
        tracing::info!("ONNX model loaded, input {}x{}", width, height);

        Ok(Self {
            session: Mutex::new(session),
            preprocessor,
            name: format!("onnx {}", path.display()),
        })
    }
}

impl SegmentationModel for OnnxSegmenter {
    fn segment(&self, frame: &PixelBuffer) -> Result<Matte> {
        let _span = tracing::debug_span!("onnx_segment").entered();

        let input = self.preprocessor.preprocess(frame);

        let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        let _infer_span = tracing::debug_span!("inference").entered();
        let outputs = session
            .run(ort::inputs![TensorRef::from_array_view(&input)?])
            .context("Failed to run inference")?;

        // Matte shape: [1, 1, H, W]
        let matte = outputs[0]
            .try_extract_array::<f32>()
            .context("Model output is not a float tensor")?;
        let shape = matte.shape().to_vec();
        ensure!(
            shape.len() == 4 && shape[0] == 1 && shape[1] == 1,
            "unexpected matte shape {:?}",
            shape
        );
        let matte_height = shape[2] as u32;
        let matte_width = shape[3] as u32;
        let matte_flat: Vec<f32> = matte.iter().copied().collect();

        Preprocessor::postprocess_matte(
            &matte_flat,
            matte_width,
            matte_height,
            frame.width(),
            frame.height(),
        )
    }

    fn name(&self) -> &str {
        &self.name
    }
}
