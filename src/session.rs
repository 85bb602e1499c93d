//! Editor session state and the parameter record driving each run.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::adjust::{AdjustmentParams, MAX_BLUR_PX};
use crate::background::{BackgroundKind, BackgroundSpec, Color};
use crate::buffer::PixelBuffer;
use crate::error::{EditError, Result};

/// Everything the user can change between runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditParams {
    #[serde(flatten)]
    pub adjustments: AdjustmentParams,
    pub remove_background: bool,
    pub background: BackgroundKind,
    pub background_color: Color,
    pub background_blur_px: u16,
}

impl Default for EditParams {
    fn default() -> Self {
        Self {
            adjustments: AdjustmentParams::default(),
            remove_background: false,
            background: BackgroundKind::None,
            background_color: Color::WHITE,
            background_blur_px: 5,
        }
    }
}

impl EditParams {
    pub fn validate(&self) -> Result<()> {
        self.adjustments.validate()?;
        if self.background_blur_px > MAX_BLUR_PX {
            return Err(EditError::InvalidParams(format!(
                "background blur must be 0-{MAX_BLUR_PX}px, got {}",
                self.background_blur_px
            )));
        }
        Ok(())
    }

    /// Resolve the background selector against the loaded image, if any.
    pub fn background_spec(&self, image: Option<&Arc<PixelBuffer>>) -> Result<BackgroundSpec> {
        Ok(match self.background {
            BackgroundKind::None => BackgroundSpec::None,
            BackgroundKind::Color => BackgroundSpec::Color(self.background_color),
            BackgroundKind::Image => {
                let image = image.ok_or(EditError::MissingBackgroundImage)?;
                BackgroundSpec::Image(Arc::clone(image))
            }
            BackgroundKind::Blur => BackgroundSpec::Blur(u32::from(self.background_blur_px)),
            BackgroundKind::Transparent => BackgroundSpec::Transparent,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineState {
    /// No source loaded yet.
    #[default]
    Idle,
    /// Waiting for the segmentation model.
    Loading,
    Processing,
    Ready,
    /// Last run failed; the previous output is still shown.
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Processing => "processing",
            Self::Ready => "ready",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// What the UI shows next to the image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub state: PipelineState,
    pub error: Option<String>,
}

/// How a scheduled run ended.
#[derive(Debug)]
pub enum RunOutcome {
    /// The result became the session output.
    Published,
    /// A newer run was scheduled; the result was dropped.
    Superseded,
    /// The run failed; the previous output is retained.
    Failed(EditError),
    /// Nothing to process (no source loaded).
    Skipped,
}

impl RunOutcome {
    pub fn is_published(&self) -> bool {
        matches!(self, Self::Published)
    }
}

/// Immutable inputs of a single pipeline run.
#[derive(Debug, Clone)]
pub struct RunSnapshot {
    pub run_id: u64,
    pub source: Arc<PixelBuffer>,
    pub params: EditParams,
    pub background_image: Option<Arc<PixelBuffer>>,
}

/// State of one open document.
#[derive(Debug, Default)]
pub struct EditorSession {
    source: Option<Arc<PixelBuffer>>,
    params: EditParams,
    background_image: Option<Arc<PixelBuffer>>,
    output: Option<Arc<PixelBuffer>>,
    state: PipelineState,
    error: Option<String>,
    latest_run: u64,
}

impl EditorSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn source(&self) -> Option<&Arc<PixelBuffer>> {
        self.source.as_ref()
    }

    pub fn params(&self) -> &EditParams {
        &self.params
    }

    pub fn background_image(&self) -> Option<&Arc<PixelBuffer>> {
        self.background_image.as_ref()
    }

    pub fn output(&self) -> Option<&Arc<PixelBuffer>> {
        self.output.as_ref()
    }

    pub fn status(&self) -> Status {
        Status {
            state: self.state,
            error: self.error.clone(),
        }
    }

    pub fn latest_run(&self) -> u64 {
        self.latest_run
    }

    /// Replace the document. Parameters return to their defaults, the
    /// previous output is dropped and runs still in flight for the old
    /// document can no longer publish.
    pub fn load_source(&mut self, source: PixelBuffer) {
        self.latest_run += 1;
        self.source = Some(Arc::new(source));
        self.params = EditParams::default();
        self.background_image = None;
        self.output = None;
        self.error = None;
    }

    pub fn set_params(&mut self, params: EditParams) -> Result<()> {
        params.validate()?;
        self.params = params;
        Ok(())
    }

    pub fn set_background_image(&mut self, image: PixelBuffer) {
        self.background_image = Some(Arc::new(image));
    }

    /// Back to default parameters; the source stays. In-flight runs are
    /// superseded.
    pub fn reset_adjustments(&mut self) {
        self.latest_run += 1;
        self.params = EditParams::default();
        self.background_image = None;
    }

    pub fn record_error(&mut self, error: &EditError) {
        self.error = Some(error.to_string());
    }

    /// Claim a new run id and capture its inputs. `None` without a source.
    pub fn begin_run(&mut self) -> Option<RunSnapshot> {
        self.latest_run += 1;
        let source = self.source.clone()?;
        Some(RunSnapshot {
            run_id: self.latest_run,
            source,
            params: self.params,
            background_image: self.background_image.clone(),
        })
    }

    pub fn is_latest(&self, run_id: u64) -> bool {
        run_id == self.latest_run
    }

    /// Move run `run_id` to `state`; ignored for superseded runs.
    pub fn transition(&mut self, run_id: u64, state: PipelineState) -> bool {
        if !self.is_latest(run_id) {
            return false;
        }
        self.state = state;
        true
    }

    /// Store a finished run's result if it is still the latest run;
    /// superseded results are discarded without touching any state.
    pub fn publish(&mut self, run_id: u64, result: Result<PixelBuffer>) -> RunOutcome {
        if !self.is_latest(run_id) {
            return RunOutcome::Superseded;
        }
        match result {
            Ok(output) => {
                self.output = Some(Arc::new(output));
                self.state = PipelineState::Ready;
                self.error = None;
                RunOutcome::Published
            }
            Err(err) => {
                self.state = PipelineState::Failed;
                self.error = Some(err.to_string());
                RunOutcome::Failed(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> PixelBuffer {
        PixelBuffer::filled(2, 2, [10, 20, 30, 255]).unwrap()
    }

    #[test]
    fn defaults_follow_neutral_editor() {
        let params = EditParams::default();
        assert!(params.adjustments.is_neutral());
        assert!(!params.remove_background);
        assert_eq!(params.background, BackgroundKind::None);
        assert_eq!(params.background_color, Color::WHITE);
        assert_eq!(params.background_blur_px, 5);
    }

    #[test]
    fn params_round_trip_through_json() {
        let json = r##"{"brightness": 120, "remove_background": true,
                        "background": "color", "background_color": "#00ff00"}"##;
        let params: EditParams = serde_json::from_str(json).unwrap();
        assert_eq!(params.adjustments.brightness, 120);
        assert_eq!(params.adjustments.contrast, 100);
        assert!(params.remove_background);
        assert_eq!(params.background, BackgroundKind::Color);
        assert_eq!(params.background_color, Color::new(0, 255, 0));

        let back: EditParams = serde_json::from_str(&serde_json::to_string(&params).unwrap()).unwrap();
        assert_eq!(back, params);
    }

    #[test]
    fn bad_color_in_json_is_rejected() {
        let json = r#"{"background_color": "teal"}"#;
        assert!(serde_json::from_str::<EditParams>(json).is_err());
    }

    #[test]
    fn image_background_needs_an_image() {
        let params = EditParams {
            background: BackgroundKind::Image,
            ..EditParams::default()
        };
        assert!(matches!(
            params.background_spec(None),
            Err(EditError::MissingBackgroundImage)
        ));
        let image = Arc::new(source());
        assert!(matches!(
            params.background_spec(Some(&image)),
            Ok(BackgroundSpec::Image(_))
        ));
    }

    #[test]
    fn set_params_validates() {
        let mut session = EditorSession::new();
        let mut params = EditParams::default();
        params.background_blur_px = 40;
        assert!(session.set_params(params).is_err());
        assert_eq!(session.params(), &EditParams::default());
    }

    #[test]
    fn runs_without_source_are_skipped_but_counted() {
        let mut session = EditorSession::new();
        assert!(session.begin_run().is_none());
        assert_eq!(session.latest_run(), 1);
        assert_eq!(session.status().state, PipelineState::Idle);
    }

    #[test]
    fn only_latest_run_publishes() {
        let mut session = EditorSession::new();
        session.load_source(source());
        let first = session.begin_run().unwrap();
        let second = session.begin_run().unwrap();
        assert!(second.run_id > first.run_id);

        let stale = PixelBuffer::filled(2, 2, [1, 1, 1, 255]).unwrap();
        assert!(!session.transition(first.run_id, PipelineState::Processing));
        assert!(matches!(
            session.publish(first.run_id, Ok(stale)),
            RunOutcome::Superseded
        ));
        assert!(session.output().is_none());

        let fresh = PixelBuffer::filled(2, 2, [2, 2, 2, 255]).unwrap();
        assert!(session.publish(second.run_id, Ok(fresh.clone())).is_published());
        assert_eq!(session.output().map(|o| o.as_ref()), Some(&fresh));
        assert_eq!(session.status().state, PipelineState::Ready);
    }

    #[test]
    fn failure_keeps_last_output() {
        let mut session = EditorSession::new();
        session.load_source(source());
        let run = session.begin_run().unwrap();
        session.publish(run.run_id, Ok(source()));

        let run = session.begin_run().unwrap();
        let outcome = session.publish(run.run_id, Err(EditError::Segmentation("boom".into())));
        assert!(matches!(outcome, RunOutcome::Failed(EditError::Segmentation(_))));
        let status = session.status();
        assert_eq!(status.state, PipelineState::Failed);
        assert!(status.error.unwrap().contains("boom"));
        assert_eq!(session.output().map(|o| o.as_ref()), Some(&source()));
    }

    #[test]
    fn new_source_supersedes_in_flight_runs() {
        let mut session = EditorSession::new();
        session.load_source(source());
        let old = session.begin_run().unwrap();

        session.load_source(PixelBuffer::filled(1, 1, [0, 0, 0, 255]).unwrap());
        assert!(!session.transition(old.run_id, PipelineState::Processing));
        assert!(matches!(
            session.publish(old.run_id, Ok(source())),
            RunOutcome::Superseded
        ));
        assert!(session.output().is_none());
        assert_eq!(session.status().state, PipelineState::Idle);
    }

    #[test]
    fn reset_supersedes_in_flight_runs() {
        let mut session = EditorSession::new();
        session.load_source(source());
        let old = session.begin_run().unwrap();
        session.reset_adjustments();
        assert!(!session.is_latest(old.run_id));
    }

    #[test]
    fn reset_keeps_source() {
        let mut session = EditorSession::new();
        session.load_source(source());
        let mut params = EditParams::default();
        params.adjustments.brightness = 150;
        params.remove_background = true;
        session.set_params(params).unwrap();
        session.set_background_image(source());

        session.reset_adjustments();
        assert_eq!(session.params(), &EditParams::default());
        assert!(session.background_image().is_none());
        assert!(session.source().is_some());
    }
}
