use thiserror::Error;

/// Errors surfaced by the editing pipeline.
#[derive(Debug, Error)]
pub enum EditError {
    /// The segmentation model is not configured, or failed to load.
    #[error("segmentation model unavailable: {0}")]
    SegmentationUnavailable(String),

    /// Mask computation failed (or timed out) for a given buffer.
    #[error("segmentation failed: {0}")]
    Segmentation(String),

    /// The supplied background image could not be decoded.
    #[error("failed to decode background image: {0}")]
    BackgroundDecode(#[source] image::ImageError),

    /// An image background was requested but no image has been loaded.
    #[error("image background selected but no background image is loaded")]
    MissingBackgroundImage,

    /// The source image could not be decoded.
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    /// Zero-dimension, length-mismatched or differently-sized buffers.
    #[error("invalid buffer: {0}")]
    InvalidBuffer(String),

    /// A parameter is outside its allowed range or malformed.
    #[error("invalid parameter: {0}")]
    InvalidParams(String),

    /// Serializing or writing the output failed.
    #[error("export failed: {0}")]
    Export(String),

    /// A background pipeline task panicked or was cancelled.
    #[error("pipeline task {0}")]
    TaskAborted(String),
}

impl From<tokio::task::JoinError> for EditError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_panic() {
            Self::TaskAborted("panicked".into())
        } else {
            Self::TaskAborted("was cancelled".into())
        }
    }
}

pub type Result<T, E = EditError> = std::result::Result<T, E>;
