//! Logging subsystem
//!
//! Structured logging via tracing with plaintext (interactive) and JSON
//! (collected) output. Logs always go to stderr; stdout is reserved for
//! reports.
//!
//! # Log Targets
//!
//! - `classifier` - backend dispatch and the local model
//! - `frames` - video probing, sampling and scratch files
//! - `pipeline` - per-call analysis results
//! - `config` - configuration loading
//!
//! # Environment Variables
//!
//! - `SHADOWFIX_LOG` - Primary log level/filter (takes precedence)
//! - `RUST_LOG` - Fallback log level/filter

use std::io;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

static INIT_GUARD: OnceLock<()> = OnceLock::new();

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    #[serde(alias = "plaintext")]
    Text,
    /// One JSON object per event
    Json,
}

/// Error type for logging initialization
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("failed to parse log filter: {0}")]
    FilterParse(#[from] tracing_subscriber::filter::ParseError),
    #[error("logging already initialized")]
    AlreadyInitialized,
    #[error("failed to initialize subscriber: {0}")]
    TryInit(#[from] tracing_subscriber::util::TryInitError),
}

/// Pick the active filter directive: `SHADOWFIX_LOG`, then `RUST_LOG`, then
/// `default_level` applied to every shadowfix target.
fn filter_directive(
    shadowfix_log: Option<String>,
    rust_log: Option<String>,
    default_level: &str,
) -> String {
    if let Some(filter) = shadowfix_log.filter(|f| !f.trim().is_empty()) {
        return filter;
    }
    if let Some(filter) = rust_log.filter(|f| !f.trim().is_empty()) {
        return filter;
    }
    let level = match default_level.trim() {
        "" => "info".to_string(),
        level => level.to_lowercase(),
    };
    format!(
        "warn,{crate_name}={level},{targets}",
        crate_name = env!("CARGO_CRATE_NAME"),
        targets = targets::ALL
            .iter()
            .map(|t| format!("{t}={level}"))
            .collect::<Vec<_>>()
            .join(",")
    )
}

fn build_env_filter(default_level: &str) -> Result<EnvFilter, LoggingError> {
    let directive = filter_directive(
        std::env::var("SHADOWFIX_LOG").ok(),
        std::env::var("RUST_LOG").ok(),
        default_level,
    );
    Ok(EnvFilter::try_new(directive)?)
}

/// Install the global subscriber.
///
/// # Errors
///
/// Returns an error if logging has already been initialized, the filter
/// directive does not parse, or another subscriber is already installed.
pub fn init_logging(format: LogFormat, default_level: &str) -> Result<(), LoggingError> {
    if INIT_GUARD.set(()).is_err() {
        return Err(LoggingError::AlreadyInitialized);
    }

    let filter = build_env_filter(default_level)?;
    let timer = UtcTime::rfc_3339();

    match format {
        LogFormat::Json => {
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_timer(timer)
                .with_target(true)
                .with_current_span(true)
                .with_writer(io::stderr)
                .with_filter(filter);
            tracing_subscriber::registry().with(layer).try_init()?;
        }
        LogFormat::Text => {
            let layer = tracing_subscriber::fmt::layer()
                .with_timer(timer)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .with_writer(io::stderr)
                .with_filter(filter);
            tracing_subscriber::registry().with(layer).try_init()?;
        }
    }

    Ok(())
}

/// Log target constants
pub mod targets {
    pub const CLASSIFIER: &str = "classifier";
    pub const FRAMES: &str = "frames";
    pub const PIPELINE: &str = "pipeline";
    pub const CONFIG: &str = "config";

    pub const ALL: &[&str] = &[CLASSIFIER, FRAMES, PIPELINE, CONFIG];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_default_covers_targets() {
        let directive = filter_directive(None, None, "debug");
        assert!(directive.starts_with("warn,shadowfix=debug"));
        for target in targets::ALL {
            assert!(directive.contains(&format!("{target}=debug")));
        }
        assert!(EnvFilter::try_new(directive).is_ok());
    }

    #[test]
    fn test_filter_blank_level_is_info() {
        assert!(filter_directive(None, None, " ").contains("classifier=info"));
    }

    #[test]
    fn test_filter_shadowfix_log_takes_precedence() {
        let directive = filter_directive(
            Some("classifier=trace".into()),
            Some("debug".into()),
            "info",
        );
        assert_eq!(directive, "classifier=trace");
    }

    #[test]
    fn test_filter_rust_log_fallback() {
        assert_eq!(filter_directive(None, Some("warn".into()), "info"), "warn");
        assert_eq!(
            filter_directive(Some("  ".into()), Some("warn".into()), "info"),
            "warn"
        );
    }

    #[test]
    fn test_log_format_serde() {
        assert_eq!(
            serde_json::from_str::<LogFormat>("\"json\"").unwrap(),
            LogFormat::Json
        );
        assert_eq!(
            serde_json::from_str::<LogFormat>("\"plaintext\"").unwrap(),
            LogFormat::Text
        );
        assert_eq!(serde_json::to_string(&LogFormat::Text).unwrap(), "\"text\"");
        assert_eq!(LogFormat::default(), LogFormat::Text);
    }

    #[test]
    fn test_logging_error_display() {
        assert_eq!(
            LoggingError::AlreadyInitialized.to_string(),
            "logging already initialized"
        );
    }
}
