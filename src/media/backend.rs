//! Classifier backends and the fallback chain that dispatches across them.

use std::io::Cursor;
use std::sync::Arc;

use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use thiserror::Error;

use crate::media::error::ForensicError;
use crate::media::labels::LabelScore;

/// JPEG quality used when shipping frames to a backend.
pub const JPEG_QUALITY: u8 = 90;

/// Why a single backend could not classify an image.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendFailure {
    #[error("request failed: {0}")]
    Request(String),

    #[error("{status}: {body}")]
    Status { status: u16, body: String },

    #[error("backend reported error: {0}")]
    ErrorPayload(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("failed to encode image: {0}")]
    Encode(String),

    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// Anything that can turn one decoded image into ordered label/score pairs.
///
/// A call is all-or-nothing: either the full list the backend produced, or a
/// failure. Implementations must be shareable across threads since the local
/// model handle outlives individual calls.
pub trait ClassifierBackend: Send + Sync {
    /// Short name used in logs (endpoint host, "local", ...).
    fn name(&self) -> &str;

    /// Classify a single RGB image.
    fn classify(&self, image: &RgbImage) -> Result<Vec<LabelScore>, BackendFailure>;
}

/// Encode an RGB image as JPEG for the wire.
pub fn encode_jpeg(image: &RgbImage) -> Result<Vec<u8>, BackendFailure> {
    let mut buf = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY)
        .encode_image(image)
        .map_err(|e| BackendFailure::Encode(e.to_string()))?;
    Ok(buf.into_inner())
}

/// Ordered remote backends followed by at most one local backend.
///
/// Every call walks the chain from the start; a backend that failed for the
/// previous image is still tried first for the next one.
#[derive(Clone, Default)]
pub struct ClassifierChain {
    remote: Vec<Arc<dyn ClassifierBackend>>,
    local: Option<Arc<dyn ClassifierBackend>>,
}

impl std::fmt::Debug for ClassifierChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassifierChain")
            .field(
                "remote",
                &self.remote.iter().map(|b| b.name()).collect::<Vec<_>>(),
            )
            .field("local", &self.local.as_ref().map(|b| b.name()))
            .finish()
    }
}

impl ClassifierChain {
    pub fn new(remote: Vec<Arc<dyn ClassifierBackend>>) -> Self {
        Self {
            remote,
            local: None,
        }
    }

    /// Set the local backend tried after every remote backend has failed.
    pub fn with_local(mut self, local: Option<Arc<dyn ClassifierBackend>>) -> Self {
        self.local = local;
        self
    }

    /// Returns `true` if no backend is configured at all.
    pub fn is_empty(&self) -> bool {
        self.remote.is_empty() && self.local.is_none()
    }

    pub fn len(&self) -> usize {
        self.remote.len() + usize::from(self.local.is_some())
    }

    /// Classify an image with the first backend that succeeds.
    ///
    /// Fails with [`ForensicError::EngineUnavailable`] carrying the last
    /// failure reason once the chain is exhausted.
    pub fn classify(&self, image: &RgbImage) -> Result<Vec<LabelScore>, ForensicError> {
        let mut last_error = String::from("no classifier backends configured");

        for backend in self.remote.iter().chain(self.local.iter()) {
            match backend.classify(image) {
                Ok(scores) => {
                    tracing::debug!(
                        target: "classifier",
                        backend = backend.name(),
                        labels = scores.len(),
                        "Classification succeeded"
                    );
                    return Ok(scores);
                }
                Err(e) => {
                    tracing::warn!(
                        target: "classifier",
                        backend = backend.name(),
                        error = %e,
                        "Classifier backend failed, trying next"
                    );
                    last_error = format!("{}: {}", backend.name(), e);
                }
            }
        }

        Err(ForensicError::EngineUnavailable { last_error })
    }
}
