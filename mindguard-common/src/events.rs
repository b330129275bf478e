//! Event payloads pushed to viewers
//!
//! Two event kinds leave the service: the fused state after every inference
//! tick, and the result of every accepted frame submission.

use crate::emotion::Emotion;
use crate::status::{ModelStatus, PredictionLabel, SourceStatus};
use serde::{Deserialize, Serialize};

/// Point-in-time copy of the fused subject state
///
/// Fields are read one at a time, so two fields may come from slightly
/// different instants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionSnapshot {
    pub bpm: f64,
    pub hrv: f64,
    pub audio_db: f64,
    pub facial_score: f64,
    pub facial_emotion: Emotion,
    pub prediction_result: PredictionLabel,
    pub prediction_prob: f64,
    pub serial_status: SourceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial_port: Option<String>,
    pub camera_status: SourceStatus,
    pub mic_status: SourceStatus,
    pub model_status: ModelStatus,
}

/// Outcome of one processed frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameResult {
    /// Smoothed stress score (0-14)
    pub score: f64,
    /// Stabilized emotion label
    pub emotion: Emotion,
    /// Confidence of the dominant label in this frame (percent)
    pub confidence: f64,
    pub is_smooth: bool,
}

/// MindGuard event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FusionEvent {
    /// Fused state after an inference tick
    FusionUpdate {
        #[serde(flatten)]
        snapshot: FusionSnapshot,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Result for one externally submitted frame
    FrameProcessed {
        #[serde(flatten)]
        result: FrameResult,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl FusionEvent {
    /// Create FusionUpdate event stamped now
    pub fn fusion_update(snapshot: FusionSnapshot) -> Self {
        Self::FusionUpdate {
            snapshot,
            timestamp: chrono::Utc::now(),
        }
    }

    /// Create FrameProcessed event stamped now
    pub fn frame_processed(result: FrameResult) -> Self {
        Self::FrameProcessed {
            result,
            timestamp: chrono::Utc::now(),
        }
    }

    /// SSE event name
    pub fn event_type(&self) -> &'static str {
        match self {
            FusionEvent::FusionUpdate { .. } => "mindguard_update",
            FusionEvent::FrameProcessed { .. } => "frame_processed",
        }
    }
}
