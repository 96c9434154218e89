//! Deepfake inference pipeline
//!
//! Turns a caller-owned media buffer into a [`ForensicResult`]:
//!
//! - **ClassifierChain**: ordered remote classifier endpoints followed by an
//!   optional local model, tried until one returns label/score pairs
//! - **LabelResolver**: collapses a label/score list into one fake probability
//! - **FrameSampler**: evenly spaced, time-bounded frame extraction from video
//!   through a scrubbed, auto-deleted temp file
//! - **ScoreAggregator** / **RiskThresholds**: percentile aggregation of frame
//!   scores and mapping to a risk tier
//!
//! Nothing in here retains media beyond the call that received it.
//!
//! # Example
//!
//! ```ignore
//! use shadowfix::config;
//! use shadowfix::media::MediaAnalysisPipeline;
//!
//! let cfg = config::load_config()?;
//! let pipeline = MediaAnalysisPipeline::from_config(&cfg, None)?;
//! let result = pipeline.classify_image(&std::fs::read("face.jpg")?)?;
//! println!("{:?} {:.4}", result.verdict, result.probability);
//! ```

pub mod backend;
pub mod error;
pub mod ffmpeg;
pub mod frames;
pub mod labels;
pub mod local;
pub mod pipeline;
pub mod remote;
pub mod scoring;

use serde::{Deserialize, Serialize};

pub use backend::{BackendFailure, ClassifierBackend, ClassifierChain};
pub use error::ForensicError;
pub use ffmpeg::FfmpegDecoder;
pub use frames::{FrameSampler, FrameSet, SampledFrame, VideoDecoder, VideoInfo};
pub use labels::{parse_label_scores, LabelResolver, LabelScore};
pub use local::{LocalClassifier, LocalModel, LocalModelHandle, ProcessModel};
pub use pipeline::{ForensicResult, MediaAnalysisPipeline, VideoSettings};
pub use remote::RemoteClassifier;
pub use scoring::{RiskThresholds, RiskTier, ScoreAggregator, Verdict};

/// Declared kind of a submitted media buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// Determine media kind from a MIME type string.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let lower = mime.trim().to_lowercase();
        if lower.starts_with("image/") {
            Some(MediaKind::Image)
        } else if lower.starts_with("video/") {
            Some(MediaKind::Video)
        } else {
            None
        }
    }

    /// Determine media kind from a file extension (with or without the dot).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.').to_lowercase().as_str() {
            "jpg" | "jpeg" | "png" | "webp" | "gif" | "bmp" => Some(MediaKind::Image),
            "mp4" | "webm" | "mov" | "mkv" | "avi" | "m4v" => Some(MediaKind::Video),
            _ => None,
        }
    }
}

/// An immutable, caller-owned media buffer plus what the caller says it is.
#[derive(Debug, Clone, Copy)]
pub struct MediaBuffer<'a> {
    bytes: &'a [u8],
    kind: MediaKind,
    format_hint: &'a str,
}

impl<'a> MediaBuffer<'a> {
    pub fn new(bytes: &'a [u8], kind: MediaKind, format_hint: &'a str) -> Self {
        Self {
            bytes,
            kind,
            format_hint,
        }
    }

    pub fn image(bytes: &'a [u8]) -> Self {
        Self::new(bytes, MediaKind::Image, "")
    }

    pub fn video(bytes: &'a [u8], container_hint: &'a str) -> Self {
        Self::new(bytes, MediaKind::Video, container_hint)
    }

    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn format_hint(&self) -> &'a str {
        self.format_hint
    }

    /// File suffix to give the container when it has to touch disk.
    ///
    /// Accepts an extension, a file name or a MIME type. Demuxers sniff the
    /// content anyway; the suffix only steers container probing, so unknown
    /// hints fall back to `.mp4`.
    pub fn container_suffix(&self) -> &'static str {
        let hint = self.format_hint.to_lowercase();
        if hint.contains("webm") {
            ".webm"
        } else if hint.contains("quicktime") || hint.ends_with("mov") {
            ".mov"
        } else if hint.contains("matroska") || hint.ends_with("mkv") {
            ".mkv"
        } else if hint.contains("avi") {
            ".avi"
        } else {
            ".mp4"
        }
    }
}
