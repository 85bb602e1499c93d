//! Supervised segmentation capability.
//!
//! Owns a model that may still be loading, tracks its lifecycle
//! (`Unloaded -> Loading -> Ready | Failed`) and turns model mattes into
//! thresholded [`SegmentationMask`]s on the blocking thread pool.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::watch;

use super::types::{SegmentationMask, SegmentationModel};
use crate::buffer::PixelBuffer;
use crate::error::{EditError, Result};

pub type SharedModel = Arc<dyn SegmentationModel>;

/// Builds a model; runs on a blocking thread and may be retried.
pub type ModelLoader = Arc<dyn Fn() -> anyhow::Result<SharedModel> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelState {
    Unloaded,
    Loading,
    Ready,
    Failed(String),
}

impl fmt::Display for ModelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unloaded => f.write_str("unloaded"),
            Self::Loading => f.write_str("loading"),
            Self::Ready => f.write_str("ready"),
            Self::Failed(reason) => write!(f, "failed ({reason})"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentationConfig {
    /// Matte values strictly above this are subject.
    pub threshold: f32,
    /// Upper bound on a single mask computation, and on waiting for
    /// the model to load.
    pub timeout: Duration,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            threshold: 0.8,
            timeout: Duration::from_secs(30),
        }
    }
}

pub struct SegmentationService {
    state: Arc<watch::Sender<ModelState>>,
    model: Arc<RwLock<Option<SharedModel>>>,
    loader: Option<ModelLoader>,
    config: SegmentationConfig,
}

impl SegmentationService {
    /// A service whose model is built lazily by `loader`.
    pub fn with_loader(loader: ModelLoader, config: SegmentationConfig) -> Self {
        let (state, _) = watch::channel(ModelState::Unloaded);
        Self {
            state: Arc::new(state),
            model: Arc::new(RwLock::new(None)),
            loader: Some(loader),
            config,
        }
    }

    /// A service around an already-built model.
    pub fn from_model(model: SharedModel, config: SegmentationConfig) -> Self {
        let (state, _) = watch::channel(ModelState::Ready);
        Self {
            state: Arc::new(state),
            model: Arc::new(RwLock::new(Some(model))),
            loader: None,
            config,
        }
    }

    pub fn state(&self) -> ModelState {
        self.state.borrow().clone()
    }

    pub fn is_ready(&self) -> bool {
        *self.state.borrow() == ModelState::Ready
    }

    pub fn subscribe(&self) -> watch::Receiver<ModelState> {
        self.state.subscribe()
    }

    pub fn config(&self) -> SegmentationConfig {
        self.config
    }

    /// Kick off loading when the model is `Unloaded` or `Failed`.
    /// Returns `true` if a load was started by this call.
    pub fn start_loading(&self) -> bool {
        let Some(loader) = self.loader.clone() else {
            return false;
        };

        let mut start = false;
        self.state.send_if_modified(|state| {
            if matches!(state, ModelState::Unloaded | ModelState::Failed(_)) {
                *state = ModelState::Loading;
                start = true;
            }
            start
        });
        if !start {
            return false;
        }

        tracing::info!("Loading segmentation model");
        let state = Arc::clone(&self.state);
        let slot = Arc::clone(&self.model);
        let load = tokio::task::spawn_blocking(move || loader());

        // Supervise the blocking load so a panicking loader still ends
        // in `Failed` instead of leaving the state at `Loading`.
        tokio::spawn(async move {
            let next = match load.await {
                Ok(Ok(model)) => {
                    tracing::info!("Segmentation model {} loaded", model.name());
                    *slot.write().unwrap_or_else(PoisonError::into_inner) = Some(model);
                    ModelState::Ready
                }
                Ok(Err(err)) => {
                    tracing::warn!("Failed to load segmentation model: {:#}", err);
                    ModelState::Failed(format!("{err:#}"))
                }
                Err(join_err) => {
                    tracing::warn!("Segmentation model loader aborted: {}", join_err);
                    ModelState::Failed(format!("model loader aborted: {join_err}"))
                }
            };
            state.send_replace(next);
        });
        true
    }

    /// Wait until the model is usable, loading (or re-loading after a
    /// failure) if needed.
    pub async fn ensure_ready(&self) -> Result<()> {
        self.start_loading();

        let mut rx = self.state.subscribe();
        let waited = tokio::time::timeout(
            self.config.timeout,
            rx.wait_for(|s| matches!(s, ModelState::Ready | ModelState::Failed(_))),
        )
        .await
        .map(|result| result.map(|state| state.clone()));

        match waited {
            Ok(Ok(ModelState::Failed(reason))) => Err(EditError::SegmentationUnavailable(reason)),
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => Err(EditError::SegmentationUnavailable(
                "model supervisor dropped".into(),
            )),
            Err(_) => {
                let reason = format!("model did not load within {:?}", self.config.timeout);
                tracing::warn!("{}", reason);
                // Give up on this attempt; the next request starts a new load.
                self.state.send_if_modified(|state| {
                    if *state == ModelState::Loading {
                        *state = ModelState::Failed(reason.clone());
                        true
                    } else {
                        false
                    }
                });
                Err(EditError::SegmentationUnavailable(reason))
            }
        }
    }

    /// Compute a subject mask for `frame`, index-aligned with it.
    pub async fn segment(&self, frame: Arc<PixelBuffer>) -> Result<SegmentationMask> {
        self.ensure_ready().await?;

        let model = self
            .model
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| EditError::SegmentationUnavailable("model not loaded".into()))?;
        let threshold = self.config.threshold;

        let task = tokio::task::spawn_blocking(move || {
            let _span = tracing::debug_span!("segment", model = model.name()).entered();
            let matte = model
                .segment(&frame)
                .map_err(|err| EditError::Segmentation(format!("{err:#}")))?;
            SegmentationMask::from_matte(&matte, frame.width(), frame.height(), threshold)
        });

        match tokio::time::timeout(self.config.timeout, task).await {
            Ok(Ok(mask)) => {
                let mask = mask?;
                tracing::debug!("Mask coverage {:.1}%", mask.coverage() * 100.0);
                Ok(mask)
            }
            Ok(Err(join_err)) => Err(EditError::Segmentation(format!(
                "segmentation task aborted: {join_err}"
            ))),
            Err(_) => Err(EditError::Segmentation(format!(
                "timed out after {:?}",
                self.config.timeout
            ))),
        }
    }
}
