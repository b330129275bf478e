//! Shared fusion state
//!
//! The single reconciliation point for all monitors, the frame path and the
//! inference loop. Each field sits behind its own RwLock: a reader never sees
//! a half-written field, and writers to different fields never block or
//! overwrite each other. There is no cross-field transaction.

use mindguard_common::events::FusionSnapshot;
use mindguard_common::{Emotion, ModelStatus, PredictionLabel, SourceStatus};
use tokio::sync::RwLock;

/// Default heart rate before any sensor reading (simulated mode value)
pub const DEFAULT_BPM: f64 = 70.0;
/// Default heart-rate variability proxy
pub const DEFAULT_HRV: f64 = 50.0;
/// Default ambient level (quiet room)
pub const DEFAULT_AUDIO_DB: f64 = 40.0;
/// Default facial stress score (neutral tier)
pub const DEFAULT_FACIAL_SCORE: f64 = 2.0;
/// Upper bound of the facial stress score scale
pub const MAX_FACIAL_SCORE: f64 = 14.0;

/// Latest classifier output
///
/// Probability and label are written together so they always belong to the
/// same tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub label: PredictionLabel,
    pub probability: f64,
}

impl Default for Prediction {
    fn default() -> Self {
        Self {
            label: PredictionLabel::Normal,
            probability: 0.0,
        }
    }
}

/// Shared state accessible by all tasks
pub struct SharedState {
    bpm: RwLock<f64>,
    hrv: RwLock<f64>,
    audio_db: RwLock<f64>,
    facial_score: RwLock<f64>,
    facial_emotion: RwLock<Emotion>,
    prediction: RwLock<Prediction>,

    serial_status: RwLock<SourceStatus>,
    serial_port: RwLock<Option<String>>,
    camera_status: RwLock<SourceStatus>,
    mic_status: RwLock<SourceStatus>,
    model_status: RwLock<ModelStatus>,
}

impl SharedState {
    /// Create new shared state with default values
    pub fn new() -> Self {
        Self {
            bpm: RwLock::new(DEFAULT_BPM),
            hrv: RwLock::new(DEFAULT_HRV),
            audio_db: RwLock::new(DEFAULT_AUDIO_DB),
            facial_score: RwLock::new(DEFAULT_FACIAL_SCORE),
            facial_emotion: RwLock::new(Emotion::Neutral),
            prediction: RwLock::new(Prediction::default()),
            serial_status: RwLock::new(SourceStatus::Disconnected),
            serial_port: RwLock::new(None),
            camera_status: RwLock::new(SourceStatus::Disconnected),
            mic_status: RwLock::new(SourceStatus::Disconnected),
            model_status: RwLock::new(ModelStatus::Loading),
        }
    }

    pub async fn bpm(&self) -> f64 {
        *self.bpm.read().await
    }

    /// Set heart rate (negative values clamp to 0)
    pub async fn set_bpm(&self, bpm: f64) {
        *self.bpm.write().await = bpm.max(0.0);
    }

    pub async fn hrv(&self) -> f64 {
        *self.hrv.read().await
    }

    /// Set HRV proxy (negative values clamp to 0)
    pub async fn set_hrv(&self, hrv: f64) {
        *self.hrv.write().await = hrv.max(0.0);
    }

    pub async fn audio_db(&self) -> f64 {
        *self.audio_db.read().await
    }

    pub async fn set_audio_db(&self, db: f64) {
        *self.audio_db.write().await = db;
    }

    pub async fn facial_score(&self) -> f64 {
        *self.facial_score.read().await
    }

    /// Set facial stress score (clamped to 0-14)
    pub async fn set_facial_score(&self, score: f64) {
        *self.facial_score.write().await = score.clamp(0.0, MAX_FACIAL_SCORE);
    }

    pub async fn facial_emotion(&self) -> Emotion {
        *self.facial_emotion.read().await
    }

    pub async fn set_facial_emotion(&self, emotion: Emotion) {
        *self.facial_emotion.write().await = emotion;
    }

    pub async fn prediction(&self) -> Prediction {
        *self.prediction.read().await
    }

    /// Store one classifier output; probability is clamped to 0-1
    pub async fn set_prediction(&self, probability: f64, label: PredictionLabel) {
        *self.prediction.write().await = Prediction {
            label,
            probability: probability.clamp(0.0, 1.0),
        };
    }

    pub async fn serial_status(&self) -> SourceStatus {
        *self.serial_status.read().await
    }

    pub async fn set_serial_status(&self, status: SourceStatus) {
        *self.serial_status.write().await = status;
    }

    pub async fn serial_port(&self) -> Option<String> {
        self.serial_port.read().await.clone()
    }

    pub async fn set_serial_port(&self, port: Option<String>) {
        *self.serial_port.write().await = port;
    }

    pub async fn camera_status(&self) -> SourceStatus {
        *self.camera_status.read().await
    }

    pub async fn set_camera_status(&self, status: SourceStatus) {
        *self.camera_status.write().await = status;
    }

    pub async fn mic_status(&self) -> SourceStatus {
        *self.mic_status.read().await
    }

    pub async fn set_mic_status(&self, status: SourceStatus) {
        *self.mic_status.write().await = status;
    }

    pub async fn model_status(&self) -> ModelStatus {
        *self.model_status.read().await
    }

    pub async fn set_model_status(&self, status: ModelStatus) {
        *self.model_status.write().await = status;
    }

    /// Copy every field, one lock at a time
    ///
    /// Fields may come from different instants; each individual field is
    /// always a complete value.
    pub async fn snapshot(&self) -> FusionSnapshot {
        let prediction = self.prediction().await;
        FusionSnapshot {
            bpm: self.bpm().await,
            hrv: self.hrv().await,
            audio_db: self.audio_db().await,
            facial_score: self.facial_score().await,
            facial_emotion: self.facial_emotion().await,
            prediction_result: prediction.label,
            prediction_prob: prediction.probability,
            serial_status: self.serial_status().await,
            serial_port: self.serial_port().await,
            camera_status: self.camera_status().await,
            mic_status: self.mic_status().await,
            model_status: self.model_status().await,
        }
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_defaults() {
        let state = SharedState::new();
        let snapshot = state.snapshot().await;

        assert_eq!(snapshot.bpm, 70.0);
        assert_eq!(snapshot.hrv, 50.0);
        assert_eq!(snapshot.audio_db, 40.0);
        assert_eq!(snapshot.facial_score, 2.0);
        assert_eq!(snapshot.facial_emotion, Emotion::Neutral);
        assert_eq!(snapshot.prediction_result, PredictionLabel::Normal);
        assert_eq!(snapshot.prediction_prob, 0.0);
        assert_eq!(snapshot.serial_status, SourceStatus::Disconnected);
        assert_eq!(snapshot.model_status, ModelStatus::Loading);
    }

    #[tokio::test]
    async fn test_setters_clamp() {
        let state = SharedState::new();

        state.set_bpm(-5.0).await;
        assert_eq!(state.bpm().await, 0.0);

        state.set_hrv(-1.0).await;
        assert_eq!(state.hrv().await, 0.0);

        state.set_facial_score(20.0).await;
        assert_eq!(state.facial_score().await, 14.0);

        state.set_prediction(1.3, PredictionLabel::Normal).await;
        assert_eq!(state.prediction().await.probability, 1.0);
    }

    #[tokio::test]
    async fn test_prediction_written_as_pair() {
        let state = SharedState::new();
        state.set_prediction(0.2, PredictionLabel::NonNormal).await;

        let prediction = state.prediction().await;
        assert_eq!(prediction.label, PredictionLabel::NonNormal);
        assert_eq!(prediction.probability, 0.2);
    }

    #[tokio::test]
    async fn test_concurrent_writers_to_distinct_fields_keep_both() {
        let state = Arc::new(SharedState::new());

        let mut handles = Vec::new();
        for i in 0..50 {
            let s = Arc::clone(&state);
            handles.push(tokio::spawn(async move {
                s.set_bpm(60.0 + i as f64).await;
            }));
            let s = Arc::clone(&state);
            handles.push(tokio::spawn(async move {
                s.set_audio_db(30.0 + i as f64).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // Last writer wins per field, and neither field was lost to the other
        let bpm = state.bpm().await;
        let db = state.audio_db().await;
        assert!((60.0..110.0).contains(&bpm));
        assert!((30.0..80.0).contains(&db));
    }
}
