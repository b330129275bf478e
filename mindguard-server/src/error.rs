//! Error types for mindguard-server
//!
//! Every variant is recoverable at a subsystem boundary: monitors turn
//! device errors into status flags, the inference loop and frame path log
//! per-tick/per-frame errors and carry on.

use thiserror::Error;

/// Main error type for mindguard-server
#[derive(Error, Debug)]
pub enum Error {
    /// No camera/mic/serial device found, or opening it failed
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    /// A single malformed sample (serial line, frame, classifier miss)
    #[error("Transient sample error: {0}")]
    TransientSample(String),

    /// Classifier, scaler or metadata artifact failed to load
    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    /// Failure inside one inference tick
    #[error("Inference error: {0}")]
    Inference(String),

    /// Facial classifier collaborator failure
    #[error("Classifier error: {0}")]
    Classifier(String),

    /// Configuration loading or validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP server errors
    #[error("HTTP server error: {0}")]
    Http(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON artifact or payload errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience Result type using mindguard-server Error
pub type Result<T> = std::result::Result<T, Error>;
