//! Emotion label set and validated per-sample distributions
//!
//! The facial classifier reports a percentage for each label it knows about.
//! `EmotionSample` keeps only the labels in the fixed set below; anything else
//! the classifier sends is dropped at construction.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Facial emotion label
///
/// Declaration order is the canonical order used to break ties when two
/// labels share the maximum probability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum Emotion {
    #[default]
    Neutral,
    Happy,
    Sad,
    Angry,
    Fear,
    Disgust,
    Surprise,
    /// Reserved: no face was found in the frame
    #[serde(rename = "No Subject")]
    NoSubject,
}

impl Emotion {
    /// Parse a classifier label (case-insensitive, e.g. "happy")
    ///
    /// Returns None for labels outside the fixed set.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "neutral" => Some(Emotion::Neutral),
            "happy" => Some(Emotion::Happy),
            "sad" => Some(Emotion::Sad),
            "angry" => Some(Emotion::Angry),
            "fear" => Some(Emotion::Fear),
            "disgust" => Some(Emotion::Disgust),
            "surprise" => Some(Emotion::Surprise),
            "no subject" | "no_subject" | "nosubject" => Some(Emotion::NoSubject),
            _ => None,
        }
    }

    /// Display name as pushed to viewers
    pub fn as_str(&self) -> &'static str {
        match self {
            Emotion::Neutral => "Neutral",
            Emotion::Happy => "Happy",
            Emotion::Sad => "Sad",
            Emotion::Angry => "Angry",
            Emotion::Fear => "Fear",
            Emotion::Disgust => "Disgust",
            Emotion::Surprise => "Surprise",
            Emotion::NoSubject => "No Subject",
        }
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Probability distribution over the detectable labels (percent scale)
///
/// Values need not sum to exactly 100. Labels that were not reported read as 0.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmotionSample {
    probabilities: BTreeMap<Emotion, f64>,
}

impl EmotionSample {
    /// Build a sample from typed labels
    ///
    /// # Errors
    /// - no labels at all
    /// - a non-finite probability
    /// - the reserved `NoSubject` label
    pub fn new(probabilities: impl IntoIterator<Item = (Emotion, f64)>) -> Result<Self> {
        let mut map = BTreeMap::new();
        for (emotion, value) in probabilities {
            if emotion == Emotion::NoSubject {
                return Err(Error::InvalidInput(
                    "NoSubject cannot carry a probability".to_string(),
                ));
            }
            if !value.is_finite() {
                return Err(Error::InvalidInput(format!(
                    "Probability for {} is not finite: {}",
                    emotion, value
                )));
            }
            map.insert(emotion, value);
        }

        if map.is_empty() {
            return Err(Error::InvalidInput("Emotion sample has no known labels".to_string()));
        }

        Ok(Self { probabilities: map })
    }

    /// Build a sample from raw classifier label names, ignoring unknown names
    pub fn from_labels<'a>(raw: impl IntoIterator<Item = (&'a str, f64)>) -> Result<Self> {
        Self::new(raw.into_iter().filter_map(|(label, value)| {
            match Emotion::from_label(label) {
                Some(Emotion::NoSubject) | None => None,
                Some(emotion) => Some((emotion, value)),
            }
        }))
    }

    /// Probability for a label (0.0 when the label was not reported)
    pub fn probability(&self, emotion: Emotion) -> f64 {
        self.probabilities.get(&emotion).copied().unwrap_or(0.0)
    }

    /// Label with the highest probability and that probability
    ///
    /// Ties resolve to the label that comes first in canonical order.
    pub fn dominant(&self) -> (Emotion, f64) {
        let mut best: Option<(Emotion, f64)> = None;
        for (&emotion, &value) in &self.probabilities {
            match best {
                Some((_, current)) if value <= current => {}
                _ => best = Some((emotion, value)),
            }
        }
        // Construction guarantees at least one entry
        best.unwrap_or((Emotion::Neutral, 0.0))
    }

    /// Iterate reported labels in canonical order
    pub fn iter(&self) -> impl Iterator<Item = (Emotion, f64)> + '_ {
        self.probabilities.iter().map(|(e, v)| (*e, *v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_label_case_insensitive() {
        assert_eq!(Emotion::from_label("happy"), Some(Emotion::Happy));
        assert_eq!(Emotion::from_label("  FEAR "), Some(Emotion::Fear));
        assert_eq!(Emotion::from_label("contempt"), None);
    }

    #[test]
    fn test_no_subject_serializes_with_space() {
        let json = serde_json::to_string(&Emotion::NoSubject).unwrap();
        assert_eq!(json, "\"No Subject\"");
        assert_eq!(Emotion::NoSubject.to_string(), "No Subject");
    }

    #[test]
    fn test_dominant_picks_maximum() {
        let sample = EmotionSample::from_labels([
            ("angry", 3.0),
            ("happy", 71.5),
            ("neutral", 20.0),
        ])
        .unwrap();

        assert_eq!(sample.dominant(), (Emotion::Happy, 71.5));
    }

    #[test]
    fn test_dominant_tie_uses_canonical_order() {
        let sample = EmotionSample::new([(Emotion::Fear, 30.0), (Emotion::Sad, 30.0)]).unwrap();
        assert_eq!(sample.dominant().0, Emotion::Sad);
    }

    #[test]
    fn test_missing_label_reads_zero() {
        let sample = EmotionSample::new([(Emotion::Happy, 50.0)]).unwrap();
        assert_eq!(sample.probability(Emotion::Fear), 0.0);
    }

    #[test]
    fn test_unknown_labels_are_dropped() {
        let sample = EmotionSample::from_labels([("contempt", 90.0), ("sad", 10.0)]).unwrap();
        assert_eq!(sample.iter().count(), 1);
        assert_eq!(sample.dominant(), (Emotion::Sad, 10.0));
    }

    #[test]
    fn test_rejects_empty_and_non_finite() {
        assert!(EmotionSample::from_labels([("contempt", 90.0)]).is_err());
        assert!(EmotionSample::new([(Emotion::Happy, f64::NAN)]).is_err());
        assert!(EmotionSample::new([(Emotion::NoSubject, 1.0)]).is_err());
    }
}
