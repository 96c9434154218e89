//! Configuration loading
//!
//! A JSON5 file (optional) overlaid with environment variables, then
//! validated. Deployments can retarget endpoints, credentials, thresholds
//! and sampling without code changes.

pub mod types;

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub use types::{
    ClassifierConfig, DetectorConfig, LabelsConfig, LocalFallbackConfig, LoggingConfig,
    RiskConfig, ValidationError, VideoConfig,
};

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse JSON5 at {path}: {message}")]
    ParseError { path: String, message: String },

    #[error("Failed to read config file {path}: {message}")]
    ReadError { path: String, message: String },

    #[error("Validation error at {path}: {message}")]
    ValidationError { path: String, message: String },
}

impl From<ValidationError> for ConfigError {
    fn from(e: ValidationError) -> Self {
        ConfigError::ValidationError {
            path: e.path,
            message: e.message,
        }
    }
}

/// Get the config file path.
/// Priority: SHADOWFIX_CONFIG_PATH > ~/.shadowfix/shadowfix.json5 > ~/.shadowfix/shadowfix.json
pub fn get_config_path() -> PathBuf {
    resolve_config_path(env::var("SHADOWFIX_CONFIG_PATH").ok(), dirs::home_dir())
}

fn resolve_config_path(override_path: Option<String>, home: Option<PathBuf>) -> PathBuf {
    if let Some(path) = override_path.filter(|p| !p.trim().is_empty()) {
        return PathBuf::from(path);
    }

    let base = home.unwrap_or_else(|| PathBuf::from(".")).join(".shadowfix");
    let json5 = base.join("shadowfix.json5");
    if json5.exists() {
        return json5;
    }
    base.join("shadowfix.json")
}

/// Load the configuration from the default path plus process environment.
pub fn load_config() -> Result<DetectorConfig, ConfigError> {
    load_config_with_env(&get_config_path(), |key| env::var(key).ok())
}

/// Load from `path` plus process environment.
pub fn load_config_from(path: &Path) -> Result<DetectorConfig, ConfigError> {
    load_config_with_env(path, |key| env::var(key).ok())
}

/// Load from `path` with environment lookups served by `lookup`.
/// A missing file yields defaults.
pub fn load_config_with_env<F>(path: &Path, lookup: F) -> Result<DetectorConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = if path.exists() {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        parse_config(&content, path)?
    } else {
        DetectorConfig::default()
    };

    apply_env_overrides(&mut config, lookup)?;

    if let Err(mut errors) = config.validate() {
        return Err(errors.remove(0).into());
    }
    Ok(config)
}

fn parse_config(content: &str, path: &Path) -> Result<DetectorConfig, ConfigError> {
    json5::from_str(content).map_err(|e| ConfigError::ParseError {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

/// Apply environment overrides. Blank values are ignored.
///
/// - `SHADOWFIX_API_TOKEN`, falling back to `HF_API_TOKEN`
/// - `SHADOWFIX_ENDPOINTS`: comma separated, replaces the list
/// - `SHADOWFIX_LOCAL_FALLBACK`: boolean
/// - `SHADOWFIX_MAX_FRAMES`: positive integer
/// - `SHADOWFIX_WINDOW_SECONDS`: seconds, or `none` for the whole video
pub fn apply_env_overrides<F>(config: &mut DetectorConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(token) = get("SHADOWFIX_API_TOKEN").or_else(|| get("HF_API_TOKEN")) {
        config.classifier.api_token = Some(token);
    }

    if let Some(endpoints) = get("SHADOWFIX_ENDPOINTS") {
        config.classifier.endpoints = endpoints
            .split(',')
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(str::to_string)
            .collect();
    }

    if let Some(flag) = get("SHADOWFIX_LOCAL_FALLBACK") {
        config.classifier.local.enabled =
            parse_bool(&flag).ok_or_else(|| ConfigError::ValidationError {
                path: "SHADOWFIX_LOCAL_FALLBACK".to_string(),
                message: format!("expected a boolean, got {flag:?}"),
            })?;
    }

    if let Some(frames) = get("SHADOWFIX_MAX_FRAMES") {
        config.video.max_frames =
            frames
                .trim()
                .parse()
                .map_err(|_| ConfigError::ValidationError {
                    path: "SHADOWFIX_MAX_FRAMES".to_string(),
                    message: format!("expected a positive integer, got {frames:?}"),
                })?;
    }

    if let Some(window) = get("SHADOWFIX_WINDOW_SECONDS") {
        config.video.window_seconds = if window.trim().eq_ignore_ascii_case("none") {
            None
        } else {
            Some(
                window
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::ValidationError {
                        path: "SHADOWFIX_WINDOW_SECONDS".to_string(),
                        message: format!("expected seconds or \"none\", got {window:?}"),
                    })?,
            )
        };
    }

    Ok(())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
