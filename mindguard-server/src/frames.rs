//! Client-submitted frame processing
//!
//! Frames arrive as base64 images (optionally data-URL prefixed). At most one
//! frame is processed at a time: a frame arriving while another is in flight
//! is dropped without touching any state. The in-flight guard is the lock on
//! this path's tracker and last score, so it is released on every exit.

use crate::classifier::{ClassifierError, Detection, FacialClassifier};
use crate::error::{Error, Result};
use crate::scoring::{stress_score, StressWeights};
use crate::sse::SseBroadcaster;
use crate::state::{SharedState, DEFAULT_FACIAL_SCORE};
use crate::tracker::EmotionStabilityTracker;
use base64::{engine::general_purpose, Engine as _};
use image::DynamicImage;
use mindguard_common::events::{FrameResult, FusionEvent};
use mindguard_common::Emotion;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// What happened to one submitted frame
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FrameOutcome {
    Processed(FrameResult),
    /// No face found; the score decayed
    NoSubject(FrameResult),
    /// Another frame was in flight
    Busy,
    Undecodable,
    Failed,
}

/// Decode a base64 (optionally data-URL) image
pub fn decode_frame(payload: &str) -> Result<DynamicImage> {
    let encoded = match payload.split_once(',') {
        Some((_, data)) => data,
        None => payload,
    };

    let bytes = general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| Error::TransientSample(format!("Invalid base64 frame: {}", e)))?;

    image::load_from_memory(&bytes).map_err(|e| Error::TransientSample(format!("Invalid image: {}", e)))
}

/// State owned by the frame in flight
///
/// `latest_score` starts at the `SharedState` facial score default (2.0).
struct FrameWorker {
    tracker: EmotionStabilityTracker,
    latest_score: f64,
}

pub struct FrameProcessor {
    worker: Mutex<FrameWorker>,
    classifier: Option<Arc<dyn FacialClassifier>>,
    state: Arc<SharedState>,
    broadcaster: SseBroadcaster,
    weights: StressWeights,
    no_subject_decay: f64,
}

impl FrameProcessor {
    pub fn new(
        state: Arc<SharedState>,
        broadcaster: SseBroadcaster,
        classifier: Option<Arc<dyn FacialClassifier>>,
        weights: StressWeights,
        no_subject_decay: f64,
    ) -> Self {
        Self {
            worker: Mutex::new(FrameWorker {
                tracker: EmotionStabilityTracker::new(),
                latest_score: DEFAULT_FACIAL_SCORE,
            }),
            classifier,
            state,
            broadcaster,
            weights,
            no_subject_decay,
        }
    }

    /// Process one submitted frame, or drop it if another is in flight
    pub async fn submit(&self, payload: &str) -> FrameOutcome {
        let Ok(mut worker) = self.worker.try_lock() else {
            debug!("Frame dropped: previous frame still processing");
            return FrameOutcome::Busy;
        };

        let frame = match decode_frame(payload) {
            Ok(frame) => frame,
            Err(e) => {
                debug!("Frame rejected: {}", e);
                return FrameOutcome::Undecodable;
            }
        };

        let Some(classifier) = &self.classifier else {
            warn!("Frame received but no facial classifier is configured");
            return FrameOutcome::Failed;
        };

        match classifier.analyze(&frame, Detection::Strict).await {
            Ok(analysis) => {
                let (emotion, confidence) = worker.tracker.stable_label(&analysis.emotions);
                let raw_score = stress_score(&analysis.emotions, &self.weights);
                let score = worker.tracker.smoothed_score(raw_score);
                worker.latest_score = score;

                self.state.set_facial_emotion(emotion).await;
                self.state.set_facial_score(score).await;
                info!("{} ({:.1}%) | Score: {}", emotion, confidence, score);

                let result = FrameResult {
                    score,
                    emotion,
                    confidence,
                    is_smooth: true,
                };
                self.broadcaster.broadcast_lossy(FusionEvent::frame_processed(result.clone()));
                FrameOutcome::Processed(result)
            }
            Err(ClassifierError::NoFace) => {
                let score = (worker.latest_score - self.no_subject_decay).max(0.0);
                worker.latest_score = score;

                self.state.set_facial_emotion(Emotion::NoSubject).await;
                self.state.set_facial_score(score).await;
                debug!("No subject in frame, score decayed to {}", score);

                let result = FrameResult {
                    score,
                    emotion: Emotion::NoSubject,
                    confidence: 0.0,
                    is_smooth: true,
                };
                self.broadcaster.broadcast_lossy(FusionEvent::frame_processed(result.clone()));
                FrameOutcome::NoSubject(result)
            }
            Err(e) => {
                error!("Frame processing error: {}", e);
                FrameOutcome::Failed
            }
        }
    }
}
