//! photo-fx: single-image subject cut-out and color adjustment.
//!
//! decode -> (optional) segmentation mask -> (optional) background
//! synthesis + compositing -> brightness / contrast / saturation -> export.
//!
//! The [`Editor`] drives the pipeline for one document and guarantees
//! that only the most recently scheduled run is ever published.

pub mod adjust;
pub mod background;
pub mod blur;
pub mod buffer;
pub mod composite;
pub mod editor;
pub mod error;
pub mod output;
pub mod segmentation;
pub mod session;
pub mod source;

pub use adjust::{adjust, AdjustmentParams};
pub use background::{synthesize, BackgroundKind, BackgroundSpec, Color, CoverFit};
pub use buffer::PixelBuffer;
pub use composite::composite;
pub use editor::{render, Editor};
pub use error::EditError;
pub use segmentation::{SegmentationMask, SegmentationModel, SegmentationService};
pub use session::{EditParams, EditorSession, PipelineState, RunOutcome, Status};
