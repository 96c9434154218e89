//! Errors surfaced by the inference pipeline to its callers.

use thiserror::Error;

/// Failures that make a whole forensic result impossible to produce.
///
/// Per-backend and per-frame problems are recovered inside the pipeline and
/// only show up here once nothing else can be tried.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ForensicError {
    /// The media cannot be parsed as the declared kind.
    #[error("media could not be decoded: {0}")]
    Decode(String),

    /// The video yielded no usable frames.
    #[error("no usable frames could be extracted: {0}")]
    Extraction(String),

    /// A classifier response did not match the expected schema.
    #[error("invalid classifier response: {0}")]
    InvalidResponse(String),

    /// Every configured backend, remote and local, failed.
    #[error("inference engine unavailable (last error: {last_error})")]
    EngineUnavailable { last_error: String },

    /// Temporary materialization of the media failed.
    #[error("I/O error: {0}")]
    Io(String),
}
