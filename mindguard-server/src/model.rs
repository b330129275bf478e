//! Stress model artifacts
//!
//! The stress classifier is loaded once at startup from three files in the
//! artifacts directory, matched by suffix:
//! - `*_model.json`: logistic classifier (`weights`, `bias`)
//! - `*_scaler.json`: fitted standard scaler (`mean`, `scale`)
//! - `*_metadata.json`: ordered input `columns` and optional `label_encoding`
//!
//! If the directory holds a single sub-directory (an archive extracted into
//! its own folder), the files are looked up inside it.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const MODEL_SUFFIX: &str = "_model.json";
const SCALER_SUFFIX: &str = "_scaler.json";
const METADATA_SUFFIX: &str = "_metadata.json";

/// Trained binary stress classifier
pub trait StressClassifier: Send + Sync {
    /// Probability of the "Normal" class for one scaled feature vector
    fn predict(&self, features: &[f64]) -> Result<f64>;
}

/// Fitted input scaler paired with the classifier
pub trait FeatureScaler: Send + Sync {
    fn transform(&self, raw: &[f64]) -> Result<Vec<f64>>;
}

/// Input schema of the classifier
#[derive(Debug, Clone, PartialEq)]
pub struct ModelMetadata {
    columns: Vec<String>,
    label_encoding: BTreeMap<String, i64>,
}

#[derive(Debug, Deserialize)]
struct MetadataDocument {
    columns: Vec<String>,
    #[serde(default)]
    label_encoding: BTreeMap<String, i64>,
}

impl ModelMetadata {
    /// Validate and build a schema
    ///
    /// # Errors
    /// Empty column list or duplicate column names.
    pub fn new(columns: Vec<String>) -> Result<Self> {
        Self::with_label_encoding(columns, BTreeMap::new())
    }

    pub fn with_label_encoding(columns: Vec<String>, label_encoding: BTreeMap<String, i64>) -> Result<Self> {
        if columns.is_empty() {
            return Err(Error::ModelUnavailable("Metadata declares no columns".to_string()));
        }
        for (i, column) in columns.iter().enumerate() {
            if columns[..i].contains(column) {
                return Err(Error::ModelUnavailable(format!("Duplicate column: {}", column)));
            }
        }
        Ok(Self {
            columns,
            label_encoding,
        })
    }

    /// Parse a metadata document
    pub fn from_json(json: &str) -> Result<Self> {
        let doc: MetadataDocument = serde_json::from_str(json)?;
        Self::with_label_encoding(doc.columns, doc.label_encoding)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn label_encoding(&self) -> &BTreeMap<String, i64> {
        &self.label_encoding
    }
}

/// Logistic regression classifier: `sigmoid(w·x + b)`
#[derive(Debug, Clone, Deserialize)]
pub struct LogisticModel {
    weights: Vec<f64>,
    bias: f64,
}

impl LogisticModel {
    pub fn new(weights: Vec<f64>, bias: f64) -> Self {
        Self { weights, bias }
    }

    pub fn input_len(&self) -> usize {
        self.weights.len()
    }
}

impl StressClassifier for LogisticModel {
    fn predict(&self, features: &[f64]) -> Result<f64> {
        if features.len() != self.weights.len() {
            return Err(Error::Inference(format!(
                "Classifier expects {} features, got {}",
                self.weights.len(),
                features.len()
            )));
        }

        let z: f64 = self
            .weights
            .iter()
            .zip(features)
            .map(|(w, x)| w * x)
            .sum::<f64>()
            + self.bias;

        Ok(1.0 / (1.0 + (-z).exp()))
    }
}

/// Standard scaler: `(x - mean) / scale`
///
/// Accepts both `mean`/`scale` and scikit-learn's `mean_`/`scale_` keys.
#[derive(Debug, Clone, Deserialize)]
pub struct StandardScaler {
    #[serde(alias = "mean_")]
    mean: Vec<f64>,
    #[serde(alias = "scale_")]
    scale: Vec<f64>,
}

impl StandardScaler {
    pub fn new(mean: Vec<f64>, scale: Vec<f64>) -> Result<Self> {
        if mean.len() != scale.len() {
            return Err(Error::ModelUnavailable(format!(
                "Scaler mean has {} entries but scale has {}",
                mean.len(),
                scale.len()
            )));
        }
        Ok(Self { mean, scale })
    }

    pub fn input_len(&self) -> usize {
        self.mean.len()
    }
}

impl FeatureScaler for StandardScaler {
    fn transform(&self, raw: &[f64]) -> Result<Vec<f64>> {
        if raw.len() != self.mean.len() {
            return Err(Error::Inference(format!(
                "Scaler expects {} features, got {}",
                self.mean.len(),
                raw.len()
            )));
        }

        Ok(raw
            .iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(x, (mean, scale))| {
                // Constant training columns have zero variance
                let scale = if *scale == 0.0 { 1.0 } else { *scale };
                (x - mean) / scale
            })
            .collect())
    }
}

/// Classifier, scaler and schema, immutable after load
pub struct ModelBundle {
    pub metadata: ModelMetadata,
    pub scaler: Box<dyn FeatureScaler>,
    pub classifier: Box<dyn StressClassifier>,
}

impl ModelBundle {
    pub fn new(
        metadata: ModelMetadata,
        scaler: Box<dyn FeatureScaler>,
        classifier: Box<dyn StressClassifier>,
    ) -> Self {
        Self {
            metadata,
            scaler,
            classifier,
        }
    }

    /// Discover and load all three artifacts from a directory
    ///
    /// # Errors
    /// `ModelUnavailable` when a file is missing, unreadable, malformed, or
    /// the three disagree on the number of input columns.
    pub fn load(artifacts_dir: &Path) -> Result<Self> {
        let paths = ArtifactPaths::discover(artifacts_dir)?;
        info!(
            "Loading model artifacts: model={}, scaler={}, metadata={}",
            paths.model.display(),
            paths.scaler.display(),
            paths.metadata.display()
        );

        let metadata = ModelMetadata::from_json(&read_artifact(&paths.metadata)?)
            .map_err(|e| Error::ModelUnavailable(format!("{}: {}", paths.metadata.display(), e)))?;

        let scaler: StandardScaler = serde_json::from_str(&read_artifact(&paths.scaler)?)
            .map_err(|e| Error::ModelUnavailable(format!("{}: {}", paths.scaler.display(), e)))?;
        let scaler = StandardScaler::new(scaler.mean, scaler.scale)?;

        let model: LogisticModel = serde_json::from_str(&read_artifact(&paths.model)?)
            .map_err(|e| Error::ModelUnavailable(format!("{}: {}", paths.model.display(), e)))?;

        let columns = metadata.columns().len();
        if scaler.input_len() != columns || model.input_len() != columns {
            return Err(Error::ModelUnavailable(format!(
                "Artifact width mismatch: metadata={}, scaler={}, model={}",
                columns,
                scaler.input_len(),
                model.input_len()
            )));
        }

        debug!("Model expects {} input features", columns);
        if !metadata.label_encoding().is_empty() {
            debug!("Label encoding: {:?}", metadata.label_encoding());
        }

        Ok(Self::new(metadata, Box::new(scaler), Box::new(model)))
    }
}

fn read_artifact(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .map_err(|e| Error::ModelUnavailable(format!("Cannot read {}: {}", path.display(), e)))
}

/// Located artifact files
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactPaths {
    pub model: PathBuf,
    pub scaler: PathBuf,
    pub metadata: PathBuf,
}

impl ArtifactPaths {
    /// Find the three artifact files under `dir`
    pub fn discover(dir: &Path) -> Result<Self> {
        let mut entries = list_dir(dir)?;

        // Archive extracted into a single nested folder
        if entries.len() == 1 && entries[0].is_dir() {
            let nested = entries.remove(0);
            debug!("Descending into nested artifacts folder {}", nested.display());
            entries = list_dir(&nested)?;
        }

        let find = |suffix: &str| {
            entries
                .iter()
                .find(|p| {
                    p.is_file()
                        && p.file_name()
                            .and_then(|n| n.to_str())
                            .is_some_and(|n| n.ends_with(suffix))
                })
                .cloned()
                .ok_or_else(|| {
                    Error::ModelUnavailable(format!("No *{} file in {}", suffix, dir.display()))
                })
        };

        Ok(Self {
            model: find(MODEL_SUFFIX)?,
            scaler: find(SCALER_SUFFIX)?,
            metadata: find(METADATA_SUFFIX)?,
        })
    }
}

fn list_dir(dir: &Path) -> Result<Vec<PathBuf>> {
    let read = std::fs::read_dir(dir)
        .map_err(|e| Error::ModelUnavailable(format!("Cannot open {}: {}", dir.display(), e)))?;

    let mut entries: Vec<PathBuf> = read.filter_map(|e| e.ok().map(|e| e.path())).collect();
    entries.sort();
    Ok(entries)
}
