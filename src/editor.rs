//! Pipeline orchestrator.
//!
//! Every change to the session schedules a run on the tokio runtime.
//! A run works on a snapshot taken when it was scheduled and publishes
//! its result only if no newer run has been scheduled since, so a slow
//! stale run can never overwrite a newer output.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::JoinHandle;

use crate::adjust::{adjust, AdjustmentParams};
use crate::background::{synthesize, BackgroundKind, BackgroundSpec, Color};
use crate::buffer::PixelBuffer;
use crate::composite::composite;
use crate::error::{EditError, Result};
use crate::output::OutputSink;
use crate::segmentation::{SegmentationMask, SegmentationService};
use crate::session::{EditParams, EditorSession, PipelineState, RunOutcome, RunSnapshot, Status};

/// Run the synchronous part of the pipeline: optional background
/// replacement, then adjustments.
pub fn render(
    source: &PixelBuffer,
    cutout: Option<(&SegmentationMask, &BackgroundSpec)>,
    adjustments: &AdjustmentParams,
) -> Result<PixelBuffer> {
    let composed = match cutout {
        Some((mask, spec)) => {
            let background = synthesize(spec, source);
            composite(source, &background, mask)?
        }
        None => source.clone(),
    };
    Ok(adjust(&composed, adjustments))
}

/// Handle to one editing session. Must be used from within a tokio
/// runtime; every mutating call returns the handle of the run it
/// scheduled.
#[derive(Clone)]
pub struct Editor {
    session: Arc<Mutex<EditorSession>>,
    segmenter: Option<Arc<SegmentationService>>,
}

impl Default for Editor {
    fn default() -> Self {
        Self::new()
    }
}

impl Editor {
    /// An editor without segmentation; background removal will fail with
    /// [`EditError::SegmentationUnavailable`].
    pub fn new() -> Self {
        Self {
            session: Arc::new(Mutex::new(EditorSession::new())),
            segmenter: None,
        }
    }

    pub fn with_segmenter(segmenter: Arc<SegmentationService>) -> Self {
        Self {
            session: Arc::new(Mutex::new(EditorSession::new())),
            segmenter: Some(segmenter),
        }
    }

    fn lock(&self) -> MutexGuard<'_, EditorSession> {
        lock(&self.session)
    }

    pub fn status(&self) -> Status {
        self.lock().status()
    }

    pub fn params(&self) -> EditParams {
        *self.lock().params()
    }

    /// Last successfully published output.
    pub fn output(&self) -> Option<Arc<PixelBuffer>> {
        self.lock().output().cloned()
    }

    pub fn source(&self) -> Option<Arc<PixelBuffer>> {
        self.lock().source().cloned()
    }

    /// Replace the document and process it with default parameters.
    pub fn load_source(&self, source: PixelBuffer) -> JoinHandle<RunOutcome> {
        tracing::info!("Loaded source image {}x{}", source.width(), source.height());
        let snapshot = {
            let mut session = self.lock();
            session.load_source(source);
            session.begin_run()
        };
        self.spawn_run(snapshot)
    }

    pub fn load_source_bytes(&self, bytes: &[u8]) -> Result<JoinHandle<RunOutcome>> {
        match PixelBuffer::decode(bytes) {
            Ok(source) => Ok(self.load_source(source)),
            Err(err) => {
                self.lock().record_error(&err);
                Err(err)
            }
        }
    }

    /// Replace all parameters at once.
    pub fn set_params(&self, params: EditParams) -> Result<JoinHandle<RunOutcome>> {
        self.apply(|session| session.set_params(params))
    }

    /// Modify parameters in place; invalid results are rejected and the
    /// previous parameters kept. `change` runs under the session lock, so
    /// concurrent updates from cloned handles never overwrite each other.
    pub fn update(&self, change: impl FnOnce(&mut EditParams)) -> Result<JoinHandle<RunOutcome>> {
        self.apply(|session| {
            let mut params = *session.params();
            change(&mut params);
            session.set_params(params)
        })
    }

    pub fn set_brightness(&self, percent: u16) -> Result<JoinHandle<RunOutcome>> {
        self.update(|p| p.adjustments.brightness = percent)
    }

    pub fn set_contrast(&self, percent: u16) -> Result<JoinHandle<RunOutcome>> {
        self.update(|p| p.adjustments.contrast = percent)
    }

    pub fn set_saturation(&self, percent: u16) -> Result<JoinHandle<RunOutcome>> {
        self.update(|p| p.adjustments.saturation = percent)
    }

    pub fn set_blur(&self, px: u16) -> Result<JoinHandle<RunOutcome>> {
        self.update(|p| p.adjustments.blur_px = px)
    }

    pub fn set_remove_background(&self, enabled: bool) -> Result<JoinHandle<RunOutcome>> {
        self.update(|p| p.remove_background = enabled)
    }

    pub fn set_background(&self, kind: BackgroundKind) -> Result<JoinHandle<RunOutcome>> {
        self.update(|p| p.background = kind)
    }

    pub fn set_background_color(&self, color: Color) -> Result<JoinHandle<RunOutcome>> {
        self.update(|p| p.background_color = color)
    }

    pub fn set_background_blur(&self, px: u16) -> Result<JoinHandle<RunOutcome>> {
        self.update(|p| p.background_blur_px = px)
    }

    /// Decode and install a background image. On failure the previous
    /// background stays and no run is scheduled.
    pub async fn load_background_image(&self, bytes: Vec<u8>) -> Result<JoinHandle<RunOutcome>> {
        let decoded = match tokio::task::spawn_blocking(move || PixelBuffer::decode(&bytes)).await {
            Ok(Err(EditError::Decode(err))) => Err(EditError::BackgroundDecode(err)),
            Ok(result) => result,
            Err(join_err) => Err(join_err.into()),
        };

        match decoded {
            Ok(image) => {
                tracing::info!("Loaded background image {}x{}", image.width(), image.height());
                self.apply(|session| {
                    session.set_background_image(image);
                    Ok(())
                })
            }
            Err(err) => {
                tracing::warn!("Keeping previous background: {}", err);
                self.lock().record_error(&err);
                Err(err)
            }
        }
    }

    /// Restore default parameters, keeping the source.
    pub fn reset_adjustments(&self) -> JoinHandle<RunOutcome> {
        let snapshot = {
            let mut session = self.lock();
            session.reset_adjustments();
            session.begin_run()
        };
        self.spawn_run(snapshot)
    }

    /// Schedule a run over the current snapshot of the session.
    pub fn schedule(&self) -> JoinHandle<RunOutcome> {
        let snapshot = self.lock().begin_run();
        self.spawn_run(snapshot)
    }

    /// Apply `change` and claim a run id in one critical section, so no
    /// other trigger can interleave between the two.
    fn apply(
        &self,
        change: impl FnOnce(&mut EditorSession) -> Result<()>,
    ) -> Result<JoinHandle<RunOutcome>> {
        let snapshot = {
            let mut session = self.lock();
            change(&mut session)?;
            session.begin_run()
        };
        Ok(self.spawn_run(snapshot))
    }

    fn spawn_run(&self, snapshot: Option<RunSnapshot>) -> JoinHandle<RunOutcome> {
        let session = Arc::clone(&self.session);
        let segmenter = self.segmenter.clone();

        tokio::spawn(async move {
            let Some(snapshot) = snapshot else {
                tracing::debug!("No source loaded, nothing to process");
                return RunOutcome::Skipped;
            };
            let run_id = snapshot.run_id;

            let result = execute(&session, snapshot, segmenter.as_deref()).await;
            let outcome = lock(&session).publish(run_id, result);
            match &outcome {
                RunOutcome::Published => tracing::debug!("Run {} published", run_id),
                RunOutcome::Superseded => tracing::debug!("Run {} superseded, discarded", run_id),
                RunOutcome::Failed(err) => tracing::warn!("Run {} failed: {}", run_id, err),
                RunOutcome::Skipped => {}
            }
            outcome
        })
    }

    /// Write the current output through `sink`. Errors are recorded in
    /// the session status but leave the output untouched.
    pub fn export(&self, sink: &mut dyn OutputSink) -> Result<()> {
        let result = match self.output() {
            Some(output) => sink.write_image(&output),
            None => Err(EditError::Export("no output to export".into())),
        };
        if let Err(err) = &result {
            self.lock().record_error(err);
        }
        result
    }
}

fn lock(session: &Mutex<EditorSession>) -> MutexGuard<'_, EditorSession> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn execute(
    session: &Mutex<EditorSession>,
    snapshot: RunSnapshot,
    segmenter: Option<&SegmentationService>,
) -> Result<PixelBuffer> {
    let RunSnapshot {
        run_id,
        source,
        params,
        background_image,
    } = snapshot;

    let cutout = if params.remove_background {
        let segmenter = segmenter.ok_or_else(|| {
            EditError::SegmentationUnavailable("no segmentation model configured".into())
        })?;
        let spec = params.background_spec(background_image.as_ref())?;

        if !segmenter.is_ready() {
            lock(session).transition(run_id, PipelineState::Loading);
            segmenter.ensure_ready().await?;
        }
        lock(session).transition(run_id, PipelineState::Processing);

        let mask = segmenter.segment(Arc::clone(&source)).await?;
        Some((mask, spec))
    } else {
        lock(session).transition(run_id, PipelineState::Processing);
        None
    };

    tokio::task::spawn_blocking(move || {
        let cutout = cutout.as_ref().map(|(mask, spec)| (mask, spec));
        render(&source, cutout, &params.adjustments)
    })
    .await?
}
