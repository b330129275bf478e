//! # MindGuard Common Library
//!
//! Shared vocabulary for the MindGuard fusion service:
//! - Emotion labels and validated emotion distributions
//! - Source, model and prediction status enums
//! - Broadcast event payloads (FusionEvent)
//! - Configuration file resolution
//! - Common error type

pub mod config;
pub mod emotion;
pub mod error;
pub mod events;
pub mod status;

pub use emotion::{Emotion, EmotionSample};
pub use error::{Error, Result};
pub use status::{ModelStatus, PredictionLabel, SourceStatus};
