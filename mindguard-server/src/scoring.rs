//! Stress scores derived from facial emotion
//!
//! Two scales feed `facialScore`:
//! - the weighted score, a continuous function of the full distribution
//!   (frame submission path)
//! - stress tiers, a coarse lookup on the dominant label (camera monitor)

use crate::state::MAX_FACIAL_SCORE;
use mindguard_common::{Emotion, EmotionSample};
use serde::Deserialize;

/// Per-label weights of the weighted stress score
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StressWeights {
    pub fear: f64,
    pub angry: f64,
    pub disgust: f64,
    pub sad: f64,
    pub neutral: f64,
    /// Subtracted
    pub happy: f64,
    /// Subtracted
    pub surprise: f64,
    pub baseline: f64,
}

impl Default for StressWeights {
    fn default() -> Self {
        Self {
            fear: 0.12,
            angry: 0.10,
            disgust: 0.08,
            sad: 0.06,
            neutral: 0.01,
            happy: 0.05,
            surprise: 0.02,
            baseline: 2.0,
        }
    }
}

/// Weighted stress score of a raw distribution, in [0, 14]
///
/// Rounded to one decimal before clamping. Labels missing from the sample
/// count as 0.
pub fn stress_score(sample: &EmotionSample, weights: &StressWeights) -> f64 {
    let p = |e: Emotion| sample.probability(e);

    let score = p(Emotion::Fear) * weights.fear
        + p(Emotion::Angry) * weights.angry
        + p(Emotion::Disgust) * weights.disgust
        + p(Emotion::Sad) * weights.sad
        + p(Emotion::Neutral) * weights.neutral
        - p(Emotion::Happy) * weights.happy
        - p(Emotion::Surprise) * weights.surprise
        + weights.baseline;

    round_one_decimal(score).clamp(0.0, MAX_FACIAL_SCORE)
}

/// Round to one decimal place
pub fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Discrete stress score per dominant facial label
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StressTiers {
    /// happy, neutral
    pub calm: f64,
    /// surprise
    pub startled: f64,
    /// sad, disgust
    pub negative: f64,
    /// fear, angry
    pub acute: f64,
    /// Any label outside the fixed set
    pub other: f64,
}

impl Default for StressTiers {
    fn default() -> Self {
        Self {
            calm: 2.0,
            startled: 5.0,
            negative: 8.0,
            acute: 12.0,
            other: 4.0,
        }
    }
}

impl StressTiers {
    /// Tier for a classifier's dominant label (`None` = unrecognised label)
    pub fn score_for(&self, label: Option<Emotion>) -> f64 {
        match label {
            Some(Emotion::Happy) | Some(Emotion::Neutral) => self.calm,
            Some(Emotion::Surprise) => self.startled,
            Some(Emotion::Sad) | Some(Emotion::Disgust) => self.negative,
            Some(Emotion::Fear) | Some(Emotion::Angry) => self.acute,
            Some(Emotion::NoSubject) | None => self.other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(pairs: &[(Emotion, f64)]) -> EmotionSample {
        EmotionSample::new(pairs.iter().copied()).unwrap()
    }

    #[test]
    fn test_all_zero_is_baseline() {
        let s = sample(&[
            (Emotion::Fear, 0.0),
            (Emotion::Angry, 0.0),
            (Emotion::Disgust, 0.0),
            (Emotion::Sad, 0.0),
            (Emotion::Neutral, 0.0),
            (Emotion::Happy, 0.0),
            (Emotion::Surprise, 0.0),
        ]);
        assert_eq!(stress_score(&s, &StressWeights::default()), 2.0);
    }

    #[test]
    fn test_pure_happy_clamps_to_zero() {
        let s = sample(&[(Emotion::Happy, 100.0)]);
        assert_eq!(stress_score(&s, &StressWeights::default()), 0.0);
    }

    #[test]
    fn test_pure_fear_clamps_to_upper_bound() {
        let s = sample(&[(Emotion::Fear, 100.0)]);
        // 12.0 + 2.0 = 14.0, exactly at the bound
        assert_eq!(stress_score(&s, &StressWeights::default()), 14.0);
    }

    #[test]
    fn test_mixed_distribution_rounds_to_one_decimal() {
        let s = sample(&[
            (Emotion::Sad, 33.3),
            (Emotion::Neutral, 50.0),
            (Emotion::Happy, 16.7),
        ]);
        // 33.3*0.06 + 50*0.01 - 16.7*0.05 + 2.0 = 1.998 + 0.5 - 0.835 + 2.0 = 3.663
        assert_eq!(stress_score(&s, &StressWeights::default()), 3.7);
    }

    #[test]
    fn test_tiers() {
        let tiers = StressTiers::default();
        assert_eq!(tiers.score_for(Some(Emotion::Happy)), 2.0);
        assert_eq!(tiers.score_for(Some(Emotion::Neutral)), 2.0);
        assert_eq!(tiers.score_for(Some(Emotion::Surprise)), 5.0);
        assert_eq!(tiers.score_for(Some(Emotion::Sad)), 8.0);
        assert_eq!(tiers.score_for(Some(Emotion::Disgust)), 8.0);
        assert_eq!(tiers.score_for(Some(Emotion::Fear)), 12.0);
        assert_eq!(tiers.score_for(Some(Emotion::Angry)), 12.0);
        assert_eq!(tiers.score_for(None), 4.0);
    }
}
