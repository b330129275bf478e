//! Facial emotion classifier collaborator
//!
//! The classifier is an external service. `HttpFacialClassifier` talks to a
//! DeepFace-compatible `/analyze` endpoint: the frame goes out as a base64
//! JPEG data URL, a per-label percentage map comes back.

use crate::config::ClassifierConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use image::{DynamicImage, ImageFormat};
use mindguard_common::EmotionSample;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Cursor;
use std::time::Duration;
use tracing::debug;

/// Face detection strictness
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detection {
    /// A face must be found, otherwise `ClassifierError::NoFace`
    Strict,
    /// Classify the whole frame when no face is found
    Lenient,
}

/// One classification result
#[derive(Debug, Clone)]
pub struct FacialAnalysis {
    /// Per-label percentages
    pub emotions: EmotionSample,
    /// Dominant label as reported by the classifier (may be outside the fixed set)
    pub dominant: String,
}

/// Classifier failure modes
#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    /// Strict detection found no face
    #[error("No face detected")]
    NoFace,

    /// Service unreachable or returned an error
    #[error("Classifier unavailable: {0}")]
    Unavailable(String),

    /// Response could not be interpreted
    #[error("Invalid classifier response: {0}")]
    InvalidResponse(String),
}

impl From<ClassifierError> for Error {
    fn from(e: ClassifierError) -> Self {
        Error::Classifier(e.to_string())
    }
}

/// Facial emotion classifier
#[async_trait]
pub trait FacialClassifier: Send + Sync {
    async fn analyze(
        &self,
        frame: &DynamicImage,
        detection: Detection,
    ) -> std::result::Result<FacialAnalysis, ClassifierError>;
}

#[derive(Debug, Serialize)]
struct AnalyzeRequest<'a> {
    img: String,
    actions: [&'a str; 1],
    enforce_detection: bool,
    detector_backend: &'a str,
}

#[derive(Debug, Deserialize)]
struct AnalyzeResponse {
    #[serde(default)]
    results: Vec<AnalyzeResult>,
}

#[derive(Debug, Deserialize)]
struct AnalyzeResult {
    emotion: HashMap<String, f64>,
    dominant_emotion: String,
}

/// Client for a DeepFace-compatible analysis service
pub struct HttpFacialClassifier {
    client: reqwest::Client,
    endpoint: String,
    detector_backend: String,
}

impl HttpFacialClassifier {
    /// Build a client for `endpoint` (full URL of the analyze route)
    pub fn new(endpoint: &str, config: &ClassifierConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build classifier HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            detector_backend: config.detector_backend.clone(),
        })
    }
}

/// JPEG-encode a frame as a base64 data URL
pub fn encode_data_url(frame: &DynamicImage) -> Result<String> {
    let mut bytes = Cursor::new(Vec::new());
    // JPEG carries no alpha channel
    DynamicImage::ImageRgb8(frame.to_rgb8())
        .write_to(&mut bytes, ImageFormat::Jpeg)
        .map_err(|e| Error::TransientSample(format!("JPEG encode failed: {}", e)))?;

    Ok(format!(
        "data:image/jpeg;base64,{}",
        general_purpose::STANDARD.encode(bytes.into_inner())
    ))
}

#[async_trait]
impl FacialClassifier for HttpFacialClassifier {
    async fn analyze(
        &self,
        frame: &DynamicImage,
        detection: Detection,
    ) -> std::result::Result<FacialAnalysis, ClassifierError> {
        let img = encode_data_url(frame).map_err(|e| ClassifierError::InvalidResponse(e.to_string()))?;
        let request = AnalyzeRequest {
            img,
            actions: ["emotion"],
            enforce_detection: detection == Detection::Strict,
            detector_backend: &self.detector_backend,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| ClassifierError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            // DeepFace reports a missing face as a client error mentioning "face"
            if detection == Detection::Strict
                && status.is_client_error()
                && body.to_ascii_lowercase().contains("face")
            {
                return Err(ClassifierError::NoFace);
            }
            return Err(ClassifierError::Unavailable(format!("{}: {}", status, body)));
        }

        let parsed: AnalyzeResponse = response
            .json()
            .await
            .map_err(|e| ClassifierError::InvalidResponse(e.to_string()))?;

        let Some(first) = parsed.results.into_iter().next() else {
            return Err(ClassifierError::NoFace);
        };

        let emotions = EmotionSample::from_labels(first.emotion.iter().map(|(k, v)| (k.as_str(), *v)))
            .map_err(|e| ClassifierError::InvalidResponse(e.to_string()))?;

        debug!("Classifier dominant emotion: {}", first.dominant_emotion);
        Ok(FacialAnalysis {
            emotions,
            dominant: first.dominant_emotion,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;

    #[test]
    fn test_data_url_drops_alpha_and_is_decodable() {
        let frame = DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 8, image::Rgba([10, 20, 30, 128])));
        let url = encode_data_url(&frame).unwrap();

        let (prefix, b64) = url.split_once(',').unwrap();
        assert_eq!(prefix, "data:image/jpeg;base64");

        let bytes = general_purpose::STANDARD.decode(b64).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (8, 8));
    }

    #[test]
    fn test_response_parsing() {
        let json = r#"{"results": [{"emotion": {"angry": 1.5, "happy": 80.0, "neutral": 18.5},
                       "dominant_emotion": "happy", "region": {"x": 1}}]}"#;
        let parsed: AnalyzeResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.results.len(), 1);
        assert_eq!(parsed.results[0].dominant_emotion, "happy");
        assert_eq!(parsed.results[0].emotion["neutral"], 18.5);
    }

    #[test]
    fn test_request_shape() {
        let request = AnalyzeRequest {
            img: "data:image/jpeg;base64,AAAA".to_string(),
            actions: ["emotion"],
            enforce_detection: true,
            detector_backend: "opencv",
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["actions"][0], "emotion");
        assert_eq!(value["enforce_detection"], true);
        assert_eq!(value["detector_backend"], "opencv");
    }
}
