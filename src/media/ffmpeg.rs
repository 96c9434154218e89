//! `ffprobe`/`ffmpeg` subprocess decoder.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use image::RgbImage;
use serde::Deserialize;

use crate::media::error::ForensicError;
use crate::media::frames::{VideoDecoder, VideoInfo};
use crate::security::logging::diagnostic_snippet;

/// Decoder that shells out to the ffmpeg tool suite.
#[derive(Debug, Clone)]
pub struct FfmpegDecoder {
    ffmpeg_path: PathBuf,
    ffprobe_path: PathBuf,
}

impl Default for FfmpegDecoder {
    fn default() -> Self {
        Self::new("ffmpeg", "ffprobe")
    }
}

impl FfmpegDecoder {
    pub fn new(ffmpeg_path: impl Into<PathBuf>, ffprobe_path: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            ffprobe_path: ffprobe_path.into(),
        }
    }

}

impl VideoDecoder for FfmpegDecoder {
    fn probe(&self, path: &Path) -> Result<VideoInfo, ForensicError> {
        let output = Command::new(&self.ffprobe_path)
            .args([
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-show_entries",
                "stream=avg_frame_rate,r_frame_rate,nb_frames,duration:format=duration",
                "-of",
                "json",
            ])
            .arg(path)
            .output()
            .map_err(|e| {
                ForensicError::Decode(format!(
                    "failed to run {}: {e}",
                    self.ffprobe_path.display()
                ))
            })?;
        let stdout = check_output("ffprobe", output)?;
        parse_probe_output(&stdout)
    }

    fn decode_frame(
        &self,
        path: &Path,
        info: &VideoInfo,
        index: u64,
    ) -> Result<RgbImage, ForensicError> {
        let mut command = Command::new(&self.ffmpeg_path);
        command.args(["-hide_banner", "-loglevel", "error", "-nostdin"]);
        match seek_timestamp(info, index) {
            Some(timestamp) => {
                command.arg("-ss").arg(timestamp).arg("-i").arg(path);
            }
            // Without a frame rate there is no timestamp to seek to; decode
            // from the start and keep only frame number `index`.
            None => {
                command.arg("-i").arg(path).arg("-vf").arg(select_filter(index));
            }
        }
        let output = command
            .args(["-frames:v", "1", "-f", "image2pipe", "-vcodec", "png", "-"])
            .output()
            .map_err(|e| {
                ForensicError::Decode(format!(
                    "failed to run {}: {e}",
                    self.ffmpeg_path.display()
                ))
            })?;
        let png = check_output("ffmpeg", output)?;
        if png.is_empty() {
            return Err(ForensicError::Decode(format!(
                "no frame produced at index {index}"
            )));
        }

        image::load_from_memory(&png)
            .map(|img| img.to_rgb8())
            .map_err(|e| ForensicError::Decode(format!("frame {index}: {e}")))
    }
}

fn check_output(tool: &str, output: Output) -> Result<Vec<u8>, ForensicError> {
    if output.status.success() {
        return Ok(output.stdout);
    }
    Err(ForensicError::Decode(format!(
        "{tool} exited with {}: {}",
        output.status,
        diagnostic_snippet(&String::from_utf8_lossy(&output.stderr))
    )))
}

/// Seek position for a frame index, in seconds with millisecond precision.
/// `None` when the frame rate is unknown.
fn seek_timestamp(info: &VideoInfo, index: u64) -> Option<String> {
    (info.fps.is_finite() && info.fps > 0.0).then(|| format!("{:.3}", index as f64 / info.fps))
}

/// Filter that passes only decoded frame number `index`.
fn select_filter(index: u64) -> String {
    format!("select=eq(n\\,{index})")
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    nb_frames: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

fn parse_probe_output(stdout: &[u8]) -> Result<VideoInfo, ForensicError> {
    let probe: ProbeOutput = serde_json::from_slice(stdout)
        .map_err(|e| ForensicError::Decode(format!("unreadable ffprobe output: {e}")))?;
    let stream = probe
        .streams
        .first()
        .ok_or_else(|| ForensicError::Decode("no video stream".to_string()))?;

    let fps = stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_rate)
        .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_rate))
        .unwrap_or(0.0);

    let counted = stream
        .nb_frames
        .as_deref()
        .and_then(|n| n.trim().parse::<u64>().ok())
        .filter(|&n| n > 0);

    let frame_count = match counted {
        Some(n) => n,
        None => {
            let duration = stream
                .duration
                .as_deref()
                .or(probe.format.as_ref().and_then(|f| f.duration.as_deref()))
                .and_then(|d| d.trim().parse::<f64>().ok())
                .filter(|d| d.is_finite() && *d > 0.0)
                .unwrap_or(0.0);
            (duration * fps).floor() as u64
        }
    };

    Ok(VideoInfo { fps, frame_count })
}

/// Parse an ffprobe rational such as `30000/1001`. Zero or malformed rates are `None`.
fn parse_rate(rate: &str) -> Option<f64> {
    let rate = rate.trim();
    let value = match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => rate.parse().ok()?,
    };
    (value.is_finite() && value > 0.0).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rate() {
        assert_eq!(parse_rate("25/1"), Some(25.0));
        assert!((parse_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert_eq!(parse_rate("24"), Some(24.0));
        assert_eq!(parse_rate("0/0"), None);
        assert_eq!(parse_rate("0/1"), None);
        assert_eq!(parse_rate("abc"), None);
    }

    #[test]
    fn test_probe_with_frame_count() {
        let out = br#"{"streams":[{"avg_frame_rate":"25/1","r_frame_rate":"25/1","nb_frames":"100","duration":"4.000000"}],"format":{"duration":"4.000000"}}"#;
        assert_eq!(
            parse_probe_output(out).unwrap(),
            VideoInfo {
                fps: 25.0,
                frame_count: 100
            }
        );
    }

    #[test]
    fn test_probe_falls_back_to_r_frame_rate() {
        let out = br#"{"streams":[{"avg_frame_rate":"0/0","r_frame_rate":"30/1","nb_frames":"90"}]}"#;
        let info = parse_probe_output(out).unwrap();
        assert_eq!(info.fps, 30.0);
        assert_eq!(info.frame_count, 90);
    }

    #[test]
    fn test_probe_estimates_frames_from_duration() {
        // WebM streams usually carry no frame count
        let out = br#"{"streams":[{"avg_frame_rate":"30/1","r_frame_rate":"30/1"}],"format":{"duration":"2.5"}}"#;
        assert_eq!(parse_probe_output(out).unwrap().frame_count, 75);
    }

    #[test]
    fn test_probe_without_duration_has_no_frames() {
        let out = br#"{"streams":[{"avg_frame_rate":"30/1"}]}"#;
        assert_eq!(parse_probe_output(out).unwrap().frame_count, 0);
    }

    #[test]
    fn test_probe_without_video_stream() {
        let out = br#"{"streams":[],"format":{"duration":"3.0"}}"#;
        assert!(matches!(
            parse_probe_output(out),
            Err(ForensicError::Decode(_))
        ));
        assert!(parse_probe_output(b"not json").is_err());
    }

    #[test]
    fn test_seek_timestamp() {
        let info = VideoInfo {
            fps: 25.0,
            frame_count: 100,
        };
        assert_eq!(seek_timestamp(&info, 0).as_deref(), Some("0.000"));
        assert_eq!(seek_timestamp(&info, 10).as_deref(), Some("0.400"));
    }

    #[test]
    fn test_unknown_rate_selects_by_frame_number() {
        // nb_frames present, rate 0/0
        let out = br#"{"streams":[{"avg_frame_rate":"0/0","r_frame_rate":"0/0","nb_frames":"48"}]}"#;
        let info = parse_probe_output(out).unwrap();
        assert_eq!(info.frame_count, 48);
        assert_eq!(seek_timestamp(&info, 5), None);
        assert_eq!(select_filter(5), r"select=eq(n\,5)");
        assert_ne!(select_filter(5), select_filter(17));
    }

    #[test]
    fn test_missing_binary_is_decode_error() {
        let decoder = FfmpegDecoder::new(
            "/nonexistent/shadowfix-ffmpeg",
            "/nonexistent/shadowfix-ffprobe",
        );
        assert!(matches!(
            decoder.probe(Path::new("/tmp/none.mp4")),
            Err(ForensicError::Decode(_))
        ));
    }
}
