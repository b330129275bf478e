//! Service configuration
//!
//! Loaded from TOML (see `mindguard_common::config` for path resolution).
//! Every section falls back to built-in defaults, so an empty file or no
//! file at all yields a runnable service with the sensors simulated.
//!
//! # Settings priority
//!
//! 1. Command-line arguments (`--port`, `--artifacts`)
//! 2. Environment variables (`MINDGUARD_PORT`, `MINDGUARD_ARTIFACTS`)
//! 3. TOML configuration file
//! 4. Built-in defaults

use crate::error::{Error, Result};
use crate::features::FeatureMapping;
use crate::monitors::biosignal::HrvProxy;
use crate::scoring::{StressTiers, StressWeights};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub server: ServerConfig,
    pub audio: AudioConfig,
    pub serial: SerialConfig,
    pub camera: CameraConfig,
    pub classifier: ClassifierConfig,
    pub model: ModelConfig,
    pub inference: InferenceConfig,
    pub frames: FramesConfig,
    pub tiers: StressTiers,
    pub weights: StressWeights,
    pub hrv: HrvProxy,
    pub features: FeatureMapping,
}

impl ServiceConfig {
    /// Reject values that parse but cannot drive the service
    ///
    /// Periods and buffer sizes must be non-zero; the no-subject decay must
    /// be a finite, non-negative step.
    ///
    /// # Errors
    /// `Config` listing every offending setting.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        let non_zero = [
            ("server.event_capacity", self.server.event_capacity as u64),
            ("audio.interval_ms", self.audio.interval_ms),
            ("audio.buffer_frames", self.audio.buffer_frames as u64),
            ("audio.sample_rate", u64::from(self.audio.sample_rate)),
            ("camera.interval_ms", self.camera.interval_ms),
            ("inference.interval_ms", self.inference.interval_ms),
            ("inference.idle_retry_ms", self.inference.idle_retry_ms),
            ("frames.max_body_bytes", self.frames.max_body_bytes as u64),
        ];
        for (key, value) in non_zero {
            if value == 0 {
                problems.push(format!("{} must be greater than 0", key));
            }
        }

        let decay = self.frames.no_subject_decay;
        if !decay.is_finite() || decay < 0.0 {
            problems.push(format!("frames.no_subject_decay must be >= 0 (got {})", decay));
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::Config(problems.join("; ")))
        }
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    /// Per-viewer event buffer; lagging viewers skip events beyond it
    pub event_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 5000,
            event_capacity: 100,
        }
    }
}

/// Microphone settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub enabled: bool,
    /// Input device name; `None` selects the host default
    pub device: Option<String>,
    pub sample_rate: u32,
    pub interval_ms: u64,
    /// Samples per level reading
    pub buffer_frames: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            device: None,
            sample_rate: 44_100,
            interval_ms: 100,
            buffer_frames: 1024,
        }
    }
}

impl AudioConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Heart-rate sensor settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub enabled: bool,
    /// Explicit port; skips auto-detection
    pub port: Option<String>,
    pub baud_rate: u32,
    /// Case-sensitive substrings identifying a sensor port
    pub vendor_patterns: Vec<String>,
    pub read_timeout_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: None,
            baud_rate: 9600,
            vendor_patterns: vec!["USB".to_string(), "Arduino".to_string(), "CH340".to_string()],
            read_timeout_ms: 1000,
        }
    }
}

/// Camera settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub enabled: bool,
    /// Still image refreshed by an external frame grabber
    pub snapshot_path: PathBuf,
    pub interval_ms: u64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            snapshot_path: PathBuf::from("/run/mindguard/camera.jpg"),
            interval_ms: 1000,
        }
    }
}

impl CameraConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Facial emotion classifier service
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Analyze endpoint URL; `None` disables facial analysis
    pub endpoint: Option<String>,
    pub detector_backend: String,
    pub timeout_ms: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            detector_backend: "opencv".to_string(),
            timeout_ms: 5000,
        }
    }
}

/// Model artifact location
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub artifacts_dir: PathBuf,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            artifacts_dir: PathBuf::from("model_artifacts"),
        }
    }
}

/// Inference loop timing
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    pub interval_ms: u64,
    /// Re-check period while no model is loaded
    pub idle_retry_ms: u64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            idle_retry_ms: 2000,
        }
    }
}

impl InferenceConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn idle_retry(&self) -> Duration {
        Duration::from_millis(self.idle_retry_ms)
    }
}

/// Frame submission settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FramesConfig {
    /// Score decrement per no-subject frame
    pub no_subject_decay: f64,
    pub max_body_bytes: usize,
}

impl Default for FramesConfig {
    fn default() -> Self {
        Self {
            no_subject_decay: 0.5,
            max_body_bytes: 10 * 1024 * 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_yields_defaults() {
        let config: ServiceConfig = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.audio.buffer_frames, 1024);
        assert_eq!(config.serial.baud_rate, 9600);
        assert_eq!(config.serial.vendor_patterns, vec!["USB", "Arduino", "CH340"]);
        assert_eq!(config.inference.idle_retry(), Duration::from_secs(2));
        assert_eq!(config.frames.no_subject_decay, 0.5);
        assert_eq!(config.hrv.baseline, 120.0);
        assert!(config.classifier.endpoint.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_sections_keep_other_defaults() {
        let toml_str = r#"
            [server]
            port = 8080

            [serial]
            port = "/dev/ttyACM0"

            [tiers]
            acute = 13.0

            [hrv]
            baseline = 110.0
        "#;
        let config: ServiceConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.event_capacity, 100);
        assert_eq!(config.serial.port.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(config.serial.read_timeout_ms, 1000);
        assert_eq!(config.tiers.acute, 13.0);
        assert_eq!(config.tiers.calm, 2.0);
        assert_eq!(config.hrv.baseline, 110.0);
    }

    #[test]
    fn test_zero_periods_and_capacity_are_rejected() {
        let toml_str = r#"
            [server]
            event_capacity = 0

            [audio]
            interval_ms = 0

            [camera]
            interval_ms = 0
        "#;
        let config: ServiceConfig = toml::from_str(toml_str).unwrap();

        match config.validate() {
            Err(Error::Config(msg)) => {
                assert!(msg.contains("server.event_capacity"));
                assert!(msg.contains("audio.interval_ms"));
                assert!(msg.contains("camera.interval_ms"));
                assert!(!msg.contains("inference.interval_ms"));
            }
            other => panic!("expected Config error, got {:?}", other),
        }
    }

    #[test]
    fn test_negative_decay_is_rejected() {
        let config: ServiceConfig = toml::from_str("[frames]\nno_subject_decay = -0.5").unwrap();
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
