//! Feature vector assembly
//!
//! Maps a state snapshot onto the classifier's input schema. The output order
//! is exactly `metadata.columns`; the classifier has no tolerance for
//! misordered columns.
//!
//! Per column, first match wins:
//! 1. live sensor field (exact column name)
//! 2. fixed constant for inputs with no live sensor (exact column name)
//! 3. one-hot default category (column name contains the pattern) = 1
//! 4. anything else = 0

use crate::model::ModelMetadata;
use mindguard_common::events::FusionSnapshot;
use serde::Deserialize;
use std::collections::BTreeMap;

/// Live state field that can feed a model column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiveField {
    Bpm,
    Hrv,
    AudioDb,
    FacialScore,
}

impl LiveField {
    fn read(&self, snapshot: &FusionSnapshot) -> f64 {
        match self {
            LiveField::Bpm => snapshot.bpm,
            LiveField::Hrv => snapshot.hrv,
            LiveField::AudioDb => snapshot.audio_db,
            LiveField::FacialScore => snapshot.facial_score,
        }
    }
}

/// Column-name rules for assembling a feature vector
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeatureMapping {
    /// Column name → live field
    pub live: BTreeMap<String, LiveField>,
    /// Column name → fixed value
    pub constants: BTreeMap<String, f64>,
    /// Substrings marking the default category of each one-hot group
    pub one_hot_defaults: Vec<String>,
}

impl Default for FeatureMapping {
    fn default() -> Self {
        let live = BTreeMap::from([
            ("Heart_Rate_bpm".to_string(), LiveField::Bpm),
            ("Speech_Noise_dB".to_string(), LiveField::AudioDb),
            ("ECG_Variability".to_string(), LiveField::Hrv),
            ("Facial_Stress_Score".to_string(), LiveField::FacialScore),
        ]);
        let constants = BTreeMap::from([
            ("Body_Temperature_C".to_string(), 36.5),
            ("Movement_Level".to_string(), 10.0),
            ("Age".to_string(), 25.0),
        ]);

        Self {
            live,
            constants,
            one_hot_defaults: vec!["Gender_Female".to_string(), "Province_Western".to_string()],
        }
    }
}

impl FeatureMapping {
    fn value_for(&self, column: &str, snapshot: &FusionSnapshot) -> f64 {
        if let Some(field) = self.live.get(column) {
            return field.read(snapshot);
        }
        if let Some(value) = self.constants.get(column) {
            return *value;
        }
        if self.one_hot_defaults.iter().any(|pattern| column.contains(pattern.as_str())) {
            return 1.0;
        }
        0.0
    }
}

/// Ordered model input, one value per schema column
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    columns: Vec<String>,
    values: Vec<f64>,
}

impl FeatureVector {
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value of a named column
    pub fn get(&self, column: &str) -> Option<f64> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|i| self.values[i])
    }
}

/// Build the feature vector for one inference tick
pub fn assemble(
    snapshot: &FusionSnapshot,
    metadata: &ModelMetadata,
    mapping: &FeatureMapping,
) -> FeatureVector {
    let columns = metadata.columns().to_vec();
    let values = columns
        .iter()
        .map(|column| mapping.value_for(column, snapshot))
        .collect();

    FeatureVector { columns, values }
}
