//! Periodic stress inference
//!
//! The model is loaded once, off the async runtime, and published through a
//! `OnceCell`. Until then the loop idles and re-checks; once published it
//! ticks at a fixed period: snapshot, assemble, scale, predict, store,
//! broadcast. A failed tick is logged and the next tick proceeds as normal.

use crate::error::{Error, Result};
use crate::features::{assemble, FeatureMapping};
use crate::model::ModelBundle;
use crate::sse::SseBroadcaster;
use crate::state::{Prediction, SharedState};
use mindguard_common::events::FusionEvent;
use mindguard_common::{ModelStatus, PredictionLabel};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Loaded model, set at most once
pub type ModelSlot = Arc<OnceCell<ModelBundle>>;

/// Inference loop phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopState {
    /// No model published yet
    Idle,
    Running,
}

/// Load the model artifacts and publish them
///
/// Sets `model_status` to Ready or Failed. A failure is logged once and
/// leaves the loop idle for the life of the process.
pub async fn load_model(artifacts_dir: PathBuf, slot: ModelSlot, state: Arc<SharedState>) {
    info!("Loading model artifacts from {}", artifacts_dir.display());

    let loaded = tokio::task::spawn_blocking(move || ModelBundle::load(&artifacts_dir))
        .await
        .map_err(|e| Error::ModelUnavailable(format!("Model load task failed: {}", e)))
        .and_then(|result| result);

    match loaded {
        Ok(bundle) => {
            let columns = bundle.metadata.columns().len();
            if slot.set(bundle).is_err() {
                debug!("Model already published");
            }
            state.set_model_status(ModelStatus::Ready).await;
            info!("Model ready ({} features)", columns);
        }
        Err(e) => {
            error!("Model unavailable, predictions disabled: {}", e);
            state.set_model_status(ModelStatus::Failed).await;
        }
    }
}

pub struct InferenceLoop {
    state: Arc<SharedState>,
    broadcaster: SseBroadcaster,
    model: ModelSlot,
    mapping: FeatureMapping,
    interval: Duration,
    idle_retry: Duration,
}

impl InferenceLoop {
    pub fn new(
        state: Arc<SharedState>,
        broadcaster: SseBroadcaster,
        model: ModelSlot,
        mapping: FeatureMapping,
        interval: Duration,
        idle_retry: Duration,
    ) -> Self {
        Self {
            state,
            broadcaster,
            model,
            mapping,
            interval,
            idle_retry,
        }
    }

    /// One inference pass
    ///
    /// # Errors
    /// Returns the scaler or classifier error, or `Inference` when the
    /// classifier yields a value outside [0, 1]. State is untouched on error.
    pub async fn tick(&self, bundle: &ModelBundle) -> Result<Prediction> {
        let snapshot = self.state.snapshot().await;
        let features = assemble(&snapshot, &bundle.metadata, &self.mapping);

        let scaled = bundle.scaler.transform(features.values())?;
        let probability = bundle.classifier.predict(&scaled)?;
        if !(0.0..=1.0).contains(&probability) {
            return Err(Error::Inference(format!(
                "Classifier returned invalid probability: {}",
                probability
            )));
        }

        let label = PredictionLabel::from_probability(probability);
        self.state.set_prediction(probability, label).await;
        debug!("Prediction {} ({:.3})", label, probability);

        let snapshot = self.state.snapshot().await;
        self.broadcaster.broadcast_lossy(FusionEvent::fusion_update(snapshot));

        Ok(Prediction { label, probability })
    }

    /// Run until shutdown
    pub async fn run(self, shutdown: CancellationToken) {
        info!("Inference loop started (idle until model is ready)");
        let mut phase = LoopState::Idle;

        loop {
            let pause = match self.model.get() {
                None => self.idle_retry,
                Some(bundle) => {
                    if phase == LoopState::Idle {
                        info!("Inference loop running every {:?}", self.interval);
                        phase = LoopState::Running;
                    }
                    if let Err(e) = self.tick(bundle).await {
                        error!("Prediction tick failed: {}", e);
                    }
                    self.interval
                }
            };

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(pause) => {}
            }
        }

        info!("Inference loop stopped");
    }
}
