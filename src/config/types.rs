//! Typed configuration structures
//!
//! Every field has a default, so a partial file (or no file at all) yields
//! a complete, usable configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::logging::LogFormat;
use crate::media::labels::{DEFAULT_FAKE_KEYWORDS, DEFAULT_REAL_KEYWORDS};
use crate::media::scoring::{
    DEFAULT_HIGH_THRESHOLD, DEFAULT_MEDIUM_THRESHOLD, DEFAULT_PERCENTILE,
};

/// Public hosted inference endpoints for the default detector model.
pub const DEFAULT_ENDPOINTS: &[&str] = &[
    "https://api-inference.huggingface.co/models/dima806/deepfake_vs_real_image_detection",
    "https://api-inference.huggingface.co/pipeline/image-classification/dima806/deepfake_vs_real_image_detection",
];

pub const DEFAULT_MODEL: &str = "dima806/deepfake_vs_real_image_detection";

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DetectorConfig {
    pub classifier: ClassifierConfig,
    pub labels: LabelsConfig,
    pub video: VideoConfig,
    pub risk: RiskConfig,
    pub logging: LoggingConfig,
}

impl DetectorConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        let has_endpoint = self
            .classifier
            .endpoints
            .iter()
            .any(|e| !e.trim().is_empty());
        if !has_endpoint && !self.classifier.local.enabled {
            errors.push(ValidationError::new(
                "classifier.endpoints",
                "at least one endpoint or the local fallback must be configured",
            ));
        }
        if self.classifier.timeout_secs == 0 {
            errors.push(ValidationError::new(
                "classifier.timeoutSecs",
                "must be greater than zero",
            ));
        }
        if self.classifier.local.enabled && self.classifier.local.program.trim().is_empty() {
            errors.push(ValidationError::new(
                "classifier.local.program",
                "must be set when the local fallback is enabled",
            ));
        }

        if self.video.max_frames == 0 {
            errors.push(ValidationError::new("video.maxFrames", "must be at least 1"));
        }
        if self.video.frame_cap == 0 {
            errors.push(ValidationError::new("video.frameCap", "must be at least 1"));
        }
        if let Some(window) = self.video.window_seconds {
            if !(window.is_finite() && window > 0.0) {
                errors.push(ValidationError::new(
                    "video.windowSeconds",
                    "must be a positive number of seconds or null",
                ));
            }
        }
        if !(0.0..=1.0).contains(&self.video.percentile) {
            errors.push(ValidationError::new(
                "video.percentile",
                "must be between 0 and 1",
            ));
        }

        let RiskConfig {
            high_threshold: high,
            medium_threshold: medium,
        } = self.risk;
        if !(0.0..=1.0).contains(&high) || !(0.0..=1.0).contains(&medium) || medium > high {
            errors.push(ValidationError::new(
                "risk",
                "thresholds must satisfy 0 <= mediumThreshold <= highThreshold <= 1",
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Validation error
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    fn new(path: &str, message: &str) -> Self {
        Self {
            path: path.to_string(),
            message: message.to_string(),
        }
    }
}

/// Classifier backends
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClassifierConfig {
    /// Remote endpoints, tried in order
    pub endpoints: Vec<String>,

    /// Bearer credential for the remote endpoints
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,

    pub local: LocalFallbackConfig,
}

impl std::fmt::Debug for ClassifierConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassifierConfig")
            .field("endpoints", &self.endpoints)
            .field("api_token", &self.api_token.as_ref().map(|_| "[REDACTED]"))
            .field("timeout_secs", &self.timeout_secs)
            .field("local", &self.local)
            .finish()
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            endpoints: DEFAULT_ENDPOINTS.iter().map(|s| s.to_string()).collect(),
            api_token: None,
            timeout_secs: 15,
            local: LocalFallbackConfig::default(),
        }
    }
}

impl ClassifierConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Configured token, or an empty string.
    pub fn token(&self) -> &str {
        self.api_token.as_deref().unwrap_or("")
    }
}

/// Local fallback model program
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LocalFallbackConfig {
    pub enabled: bool,

    /// Inference program, a path or a name looked up on `PATH`
    pub program: String,

    /// Extra arguments placed before `--model <model>`
    pub args: Vec<String>,

    pub model: String,
}

impl Default for LocalFallbackConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            program: "shadowfix-local-model".to_string(),
            args: Vec::new(),
            model: DEFAULT_MODEL.to_string(),
        }
    }
}

/// Label vocabulary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LabelsConfig {
    pub fake_keywords: Vec<String>,
    pub real_keywords: Vec<String>,
}

impl Default for LabelsConfig {
    fn default() -> Self {
        Self {
            fake_keywords: DEFAULT_FAKE_KEYWORDS.iter().map(|s| s.to_string()).collect(),
            real_keywords: DEFAULT_REAL_KEYWORDS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Video sampling and aggregation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VideoConfig {
    /// Frames requested per video
    pub max_frames: usize,

    /// Hard ceiling on frames per video
    pub frame_cap: usize,

    /// Only sample the first N seconds; `null` samples the whole video
    pub window_seconds: Option<f64>,

    /// Aggregation percentile as a fraction
    pub percentile: f64,

    /// Fail when no sampled frame could be classified instead of reporting 0.0
    pub fail_on_unscored: bool,

    pub ffmpeg_path: String,
    pub ffprobe_path: String,

    /// Scratch directory for container files (system temp dir when unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_dir: Option<PathBuf>,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            max_frames: 10,
            frame_cap: 12,
            window_seconds: Some(5.0),
            percentile: DEFAULT_PERCENTILE,
            fail_on_unscored: true,
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            temp_dir: None,
        }
    }
}

/// Risk tier thresholds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RiskConfig {
    pub high_threshold: f64,
    pub medium_threshold: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            high_threshold: DEFAULT_HIGH_THRESHOLD,
            medium_threshold: DEFAULT_MEDIUM_THRESHOLD,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingConfig {
    pub format: LogFormat,
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Text,
            level: "info".to_string(),
        }
    }
}
