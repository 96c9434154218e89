//! Video frame sampling.
//!
//! Containers need random access to seek, so the caller's buffer is written
//! to a private temp file for the duration of one [`FrameSampler::sample`]
//! call. The file is zero-filled and unlinked when the call returns, on
//! every path out of it.

use std::fs::File;
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::RgbImage;
use tempfile::NamedTempFile;

use crate::media::error::ForensicError;
use crate::media::{MediaBuffer, MediaKind};

/// Hard ceiling on frames sampled from one video.
pub const DEFAULT_FRAME_CAP: usize = 12;

const SCRUB_CHUNK: usize = 64 * 1024;

/// Stream properties reported by a decoder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoInfo {
    pub fps: f64,
    pub frame_count: u64,
}

/// Container/codec access used by the sampler.
pub trait VideoDecoder: Send + Sync {
    /// Read frame rate and total frame count. Failure means the file is not
    /// a decodable video.
    fn probe(&self, path: &Path) -> Result<VideoInfo, ForensicError>;

    /// Seek to `index` and decode exactly that frame as RGB.
    fn decode_frame(
        &self,
        path: &Path,
        info: &VideoInfo,
        index: u64,
    ) -> Result<RgbImage, ForensicError>;
}

/// A decoded frame and where it came from.
#[derive(Debug, Clone)]
pub struct SampledFrame {
    pub index: u64,
    pub image: RgbImage,
}

/// Frames sampled from one video, in source order.
#[derive(Debug, Clone, Default)]
pub struct FrameSet {
    frames: Vec<SampledFrame>,
}

impl FrameSet {
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Source frame indices, in order.
    pub fn indices(&self) -> Vec<u64> {
        self.frames.iter().map(|f| f.index).collect()
    }

}

impl<'a> IntoIterator for &'a FrameSet {
    type Item = &'a SampledFrame;
    type IntoIter = std::slice::Iter<'a, SampledFrame>;

    fn into_iter(self) -> Self::IntoIter {
        self.frames.iter()
    }
}

/// Number of frames eligible for sampling.
///
/// With a window, only the first `floor(window_seconds * fps)` frames count.
/// A non-positive or unknown frame rate disables the window.
pub fn usable_frame_count(info: &VideoInfo, window_seconds: Option<f64>) -> u64 {
    match window_seconds {
        Some(window) if window > 0.0 && info.fps.is_finite() && info.fps > 0.0 => {
            let limit = (window * info.fps).floor() as u64;
            info.frame_count.min(limit)
        }
        _ => info.frame_count,
    }
}

/// `n` indices spread evenly over `[0, usable_total)`: `floor(i * total / n)`.
///
/// When `n` exceeds `usable_total` some indices repeat; each repeat is kept
/// so it carries its own weight in aggregation.
pub fn sample_indices(usable_total: u64, n: usize) -> Vec<u64> {
    if usable_total == 0 || n == 0 {
        return Vec::new();
    }
    let n = n as u128;
    (0..n)
        .map(|i| (i * usable_total as u128 / n) as u64)
        .collect()
}

/// Extracts an evenly spaced, optionally time-bounded subset of frames.
#[derive(Clone)]
pub struct FrameSampler {
    decoder: Arc<dyn VideoDecoder>,
    frame_cap: usize,
    temp_dir: Option<PathBuf>,
}

impl std::fmt::Debug for FrameSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSampler")
            .field("frame_cap", &self.frame_cap)
            .field("temp_dir", &self.temp_dir)
            .finish()
    }
}

impl FrameSampler {
    pub fn new(decoder: Arc<dyn VideoDecoder>) -> Self {
        Self {
            decoder,
            frame_cap: DEFAULT_FRAME_CAP,
            temp_dir: None,
        }
    }

    pub fn with_frame_cap(mut self, frame_cap: usize) -> Self {
        self.frame_cap = frame_cap;
        self
    }

    /// Directory for the scratch file (defaults to the system temp dir).
    pub fn with_temp_dir(mut self, temp_dir: Option<PathBuf>) -> Self {
        self.temp_dir = temp_dir;
        self
    }

    /// Sample up to `min(max_frames, frame_cap)` frames from `video`.
    ///
    /// Frames that fail to decode are skipped. A video with no usable frames
    /// yields an empty set rather than an error; a buffer the decoder cannot
    /// open at all is [`ForensicError::Decode`].
    pub fn sample(
        &self,
        video: &MediaBuffer<'_>,
        max_frames: usize,
        window_seconds: Option<f64>,
    ) -> Result<FrameSet, ForensicError> {
        if video.kind() != MediaKind::Video {
            return Err(ForensicError::Decode(
                "frame sampling requires a video buffer".to_string(),
            ));
        }
        if video.bytes().is_empty() {
            return Err(ForensicError::Decode("video buffer is empty".to_string()));
        }

        let scratch = ScrubbedTempFile::create(
            self.temp_dir.as_deref(),
            video.container_suffix(),
            video.bytes(),
        )?;

        let info = self.decoder.probe(scratch.path())?;
        let usable_total = usable_frame_count(&info, window_seconds);
        let n = max_frames.min(self.frame_cap);

        tracing::debug!(
            target: "frames",
            fps = info.fps,
            total = info.frame_count,
            usable = usable_total,
            sampled = n,
            "Probed video"
        );

        let mut frames: Vec<SampledFrame> = Vec::with_capacity(n);
        let mut last_failed = None;
        for index in sample_indices(usable_total, n) {
            // Indices are non-decreasing, so a repeat is always the previous one.
            if let Some(image) = frames
                .last()
                .filter(|f| f.index == index)
                .map(|f| f.image.clone())
            {
                frames.push(SampledFrame { index, image });
                continue;
            }
            if last_failed == Some(index) {
                continue;
            }
            match self.decoder.decode_frame(scratch.path(), &info, index) {
                Ok(image) => frames.push(SampledFrame { index, image }),
                Err(e) => {
                    last_failed = Some(index);
                    tracing::warn!(target: "frames", index, error = %e, "Skipping undecodable frame");
                }
            }
        }

        drop(scratch);
        Ok(FrameSet { frames })
    }
}

/// Temp file that is overwritten with zeros before it is unlinked.
struct ScrubbedTempFile {
    file: Option<NamedTempFile>,
    len: u64,
}

impl ScrubbedTempFile {
    fn create(dir: Option<&Path>, suffix: &str, bytes: &[u8]) -> Result<Self, ForensicError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(".shadowfix-").suffix(suffix);
        let file = match dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .map_err(|e| ForensicError::Io(format!("failed to create scratch file: {e}")))?;

        // Guard first: a failed write below still scrubs and unlinks.
        let mut guard = Self {
            file: Some(file),
            len: bytes.len() as u64,
        };
        if let Some(file) = guard.file.as_mut() {
            file.write_all(bytes)
                .and_then(|()| file.flush())
                .map_err(|e| ForensicError::Io(format!("failed to write scratch file: {e}")))?;
        }
        Ok(guard)
    }

    fn path(&self) -> &Path {
        self.file
            .as_ref()
            .map(|f| f.path())
            .unwrap_or_else(|| Path::new(""))
    }
}

impl Drop for ScrubbedTempFile {
    fn drop(&mut self) {
        let Some(mut file) = self.file.take() else {
            return;
        };
        if let Err(e) = scrub(file.as_file_mut(), self.len) {
            tracing::warn!(target: "frames", error = %e, "Failed to scrub scratch file");
        }
        let path = file.path().to_path_buf();
        if let Err(e) = file.close() {
            tracing::error!(
                target: "frames",
                path = %path.display(),
                error = %e,
                "Failed to delete scratch file"
            );
        }
    }
}

fn scrub(file: &mut File, len: u64) -> io::Result<()> {
    file.seek(SeekFrom::Start(0))?;
    let zeros = [0u8; SCRUB_CHUNK];
    let mut remaining = len;
    while remaining > 0 {
        let chunk = remaining.min(SCRUB_CHUNK as u64) as usize;
        file.write_all(&zeros[..chunk])?;
        remaining -= chunk as u64;
    }
    file.sync_all()
}
