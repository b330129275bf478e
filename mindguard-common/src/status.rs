//! Subsystem status and prediction label enums

use serde::{Deserialize, Serialize};
use std::fmt;

/// Connection status of one acquisition source (serial, camera, microphone)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SourceStatus {
    /// No device present, or monitor not started (degraded mode)
    #[default]
    Disconnected,
    /// Device found, opening
    Connecting,
    /// Device streaming readings
    Active,
    /// Microphone stream open
    Listening,
    /// Device open failed or stream broke
    Error,
}

impl fmt::Display for SourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SourceStatus::Disconnected => "Disconnected",
            SourceStatus::Connecting => "Connecting",
            SourceStatus::Active => "Active",
            SourceStatus::Listening => "Listening",
            SourceStatus::Error => "Error",
        };
        f.write_str(s)
    }
}

/// Stress model load status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ModelStatus {
    #[default]
    Loading,
    Ready,
    Failed,
}

/// Binary stress classifier outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PredictionLabel {
    #[default]
    Normal,
    #[serde(rename = "Non-Normal")]
    NonNormal,
}

impl PredictionLabel {
    /// Decision threshold on the classifier's probability output
    pub const THRESHOLD: f64 = 0.5;

    /// Label for a probability: Normal strictly above the threshold
    pub fn from_probability(p: f64) -> Self {
        if p > Self::THRESHOLD {
            PredictionLabel::Normal
        } else {
            PredictionLabel::NonNormal
        }
    }
}

impl fmt::Display for PredictionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PredictionLabel::Normal => f.write_str("Normal"),
            PredictionLabel::NonNormal => f.write_str("Non-Normal"),
        }
    }
}
