//! Emotion stability tracking
//!
//! Turns noisy per-frame emotion distributions into a label that only moves
//! on strong evidence, and a stress score with single-frame outliers removed.
//!
//! Label rules, by dominant-label confidence (percent):
//! - above 40: adopt immediately
//! - above 25: adopt if the label is among the two most recent mid-band labels
//! - otherwise: keep the last adopted label
//!
//! The score is the median of the three most recent raw scores. A median of
//! three rejects a single outlier without the lag of a moving average.
//!
//! A tracker must be owned by exactly one acquisition path; concurrent paths
//! each keep their own instance.

use mindguard_common::{Emotion, EmotionSample};
use std::collections::VecDeque;

const LABEL_HISTORY_CAPACITY: usize = 3;
const SCORE_HISTORY_CAPACITY: usize = 5;

/// Confidence above which a label is adopted without corroboration
pub const HIGH_CONFIDENCE: f64 = 40.0;
/// Confidence above which a label is considered for voting
pub const MEDIUM_CONFIDENCE: f64 = 25.0;

/// Initial score: the calm tier
const INITIAL_SCORE: f64 = 2.0;

/// Per-path smoothing state
#[derive(Debug, Clone)]
pub struct EmotionStabilityTracker {
    label_history: VecDeque<Emotion>,
    score_history: VecDeque<f64>,
    last_emotion: Emotion,
    last_score: f64,
}

impl EmotionStabilityTracker {
    pub fn new() -> Self {
        Self {
            label_history: VecDeque::with_capacity(LABEL_HISTORY_CAPACITY),
            score_history: VecDeque::with_capacity(SCORE_HISTORY_CAPACITY),
            last_emotion: Emotion::Neutral,
            last_score: INITIAL_SCORE,
        }
    }

    /// Stabilized label for one raw sample, with the sample's own confidence
    pub fn stable_label(&mut self, raw: &EmotionSample) -> (Emotion, f64) {
        let (dominant, confidence) = raw.dominant();

        if confidence > HIGH_CONFIDENCE {
            self.last_emotion = dominant;
            return (dominant, confidence);
        }

        if confidence > MEDIUM_CONFIDENCE {
            if self.label_history.len() == LABEL_HISTORY_CAPACITY {
                self.label_history.pop_front();
            }
            self.label_history.push_back(dominant);

            if self.label_history.len() >= 2
                && self.label_history.iter().rev().take(2).any(|&e| e == dominant)
            {
                self.last_emotion = dominant;
                return (dominant, confidence);
            }
        }

        (self.last_emotion, confidence)
    }

    /// Median-of-three smoothed score
    ///
    /// Until three scores have been seen the raw score passes through.
    pub fn smoothed_score(&mut self, raw_score: f64) -> f64 {
        if self.score_history.len() == SCORE_HISTORY_CAPACITY {
            self.score_history.pop_front();
        }
        self.score_history.push_back(raw_score);

        let smoothed = if self.score_history.len() >= 3 {
            let mut recent: Vec<f64> = self.score_history.iter().rev().take(3).copied().collect();
            recent.sort_by(|a, b| a.total_cmp(b));
            recent[1]
        } else {
            raw_score
        };

        self.last_score = smoothed;
        smoothed
    }

    /// Last adopted label
    pub fn last_emotion(&self) -> Emotion {
        self.last_emotion
    }

    /// Last value returned by `smoothed_score`
    pub fn last_score(&self) -> f64 {
        self.last_score
    }
}

impl Default for EmotionStabilityTracker {
    fn default() -> Self {
        Self::new()
    }
}
