//! CLI subcommand definitions and handlers.
//!
//! Uses clap derive to define the subcommand hierarchy:
//! - `analyze <FILE>` -- run the deepfake pipeline on an image or video
//! - `config show|path` -- inspect configuration
//! - `version` -- print build/version info

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::config::{self, DetectorConfig};
use crate::media::local::{LocalModelHandle, ProcessModelConfig};
use crate::media::{
    ForensicError, ForensicResult, MediaAnalysisPipeline, MediaBuffer, MediaKind, RiskTier,
    Verdict,
};
use crate::security::redact_secrets;

/// Default end-to-end limit for one `analyze` run.
pub const DEFAULT_ANALYZE_TIMEOUT_SECS: u64 = 120;

pub const SECURITY_NOTE: &str = "Zero-retention: media discarded.";

/// Deepfake probability estimation for images and video.
#[derive(Parser, Debug)]
#[command(
    name = "shadowfix",
    version = env!("CARGO_PKG_VERSION"),
    about = "Shadowfix: estimate whether an image or video was synthetically generated"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Analyze an image or video file and print a JSON report.
    Analyze {
        /// Media file to analyze.
        file: PathBuf,

        /// Media kind (default: inferred from the file extension).
        #[arg(short, long, value_enum)]
        kind: Option<KindArg>,

        /// Abort the analysis after this many seconds.
        #[arg(long, default_value_t = DEFAULT_ANALYZE_TIMEOUT_SECS)]
        timeout_secs: u64,
    },

    /// Inspect configuration.
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Print version, build date, and git commit information.
    Version,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the fully loaded configuration (secrets redacted) as JSON.
    Show,

    /// Print the resolved configuration file path.
    Path,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KindArg {
    Image,
    Video,
}

impl From<KindArg> for MediaKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Image => MediaKind::Image,
            KindArg::Video => MediaKind::Video,
        }
    }
}

/// Failures of the `analyze` subcommand.
#[derive(Error, Debug)]
pub enum AnalyzeError {
    #[error("cannot infer media kind of {0}; pass --kind image|video")]
    UnknownKind(String),

    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("analysis timed out after {0}s")]
    Timeout(u64),

    #[error("analysis worker failed: {0}")]
    Worker(String),

    #[error(transparent)]
    Forensic(#[from] ForensicError),
}

/// JSON report printed by `analyze`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub verdict: Verdict,
    pub probability: f64,
    pub risk_level: RiskTier,
    pub security_note: &'static str,
}

impl From<&ForensicResult> for AnalysisReport {
    fn from(result: &ForensicResult) -> Self {
        Self {
            verdict: result.verdict,
            probability: (result.probability * 10_000.0).round() / 10_000.0,
            risk_level: result.risk_tier,
            security_note: SECURITY_NOTE,
        }
    }
}

// ---------------------------------------------------------------------------
// Subcommand handlers
// ---------------------------------------------------------------------------

/// Run the `analyze` subcommand.
pub async fn handle_analyze(
    cfg: &DetectorConfig,
    file: &Path,
    kind: Option<KindArg>,
    timeout_secs: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    let kind = resolve_kind(file, kind)?;
    let hint = file
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default();
    let bytes = Zeroizing::new(tokio::fs::read(file).await.map_err(|source| {
        AnalyzeError::Read {
            path: file.display().to_string(),
            source,
        }
    })?);

    let local = local_model_handle(cfg);
    let cfg = cfg.clone();
    let result = analyze_with_timeout(
        move || MediaAnalysisPipeline::from_config(&cfg, local),
        bytes,
        kind,
        hint,
        Duration::from_secs(timeout_secs),
    )
    .await?;

    let report = AnalysisReport::from(&result);
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Build and run a pipeline on a blocking worker under a deadline.
///
/// The pipeline is constructed on the worker too: the blocking HTTP client
/// must not be created or dropped on an async thread. The media buffer is
/// zeroized when the worker finishes with it.
pub async fn analyze_with_timeout<F>(
    build: F,
    bytes: Zeroizing<Vec<u8>>,
    kind: MediaKind,
    hint: String,
    timeout: Duration,
) -> Result<ForensicResult, AnalyzeError>
where
    F: FnOnce() -> Result<MediaAnalysisPipeline, ForensicError> + Send + 'static,
{
    let worker = tokio::task::spawn_blocking(move || {
        let pipeline = build()?;
        pipeline.analyze(&MediaBuffer::new(&bytes, kind, &hint))
    });

    match tokio::time::timeout(timeout, worker).await {
        Err(_) => Err(AnalyzeError::Timeout(timeout.as_secs())),
        Ok(Err(join)) => Err(AnalyzeError::Worker(join.to_string())),
        Ok(Ok(result)) => Ok(result?),
    }
}

/// Run the `config show` subcommand.
pub fn handle_config_show() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = config::load_config()?;
    let redacted = redact_secrets(&serde_json::to_value(&cfg)?);
    println!("{}", serde_json::to_string_pretty(&redacted)?);
    Ok(())
}

/// Run the `config path` subcommand.
pub fn handle_config_path() {
    println!("{}", config::get_config_path().display());
}

/// Run the `version` subcommand.
pub fn handle_version() {
    println!("shadowfix {}", env!("CARGO_PKG_VERSION"));
    println!("  Build date: {}", env!("SHADOWFIX_BUILD_DATE"));
    println!("  Git commit: {}", env!("SHADOWFIX_GIT_HASH"));
    println!(
        "  Platform:   {} ({})",
        std::env::consts::OS,
        std::env::consts::ARCH
    );
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn resolve_kind(file: &Path, explicit: Option<KindArg>) -> Result<MediaKind, AnalyzeError> {
    if let Some(kind) = explicit {
        return Ok(kind.into());
    }
    file.extension()
        .and_then(|e| e.to_str())
        .and_then(MediaKind::from_extension)
        .ok_or_else(|| AnalyzeError::UnknownKind(file.display().to_string()))
}

/// The process-wide local model handle, when the fallback is enabled.
fn local_model_handle(cfg: &DetectorConfig) -> Option<Arc<LocalModelHandle>> {
    let local = &cfg.classifier.local;
    local.enabled.then(|| {
        Arc::new(LocalModelHandle::process(ProcessModelConfig {
            program: local.program.clone(),
            args: local.args.clone(),
            model: local.model.clone(),
        }))
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
