//! End-to-end pipeline tests against scripted backends and a synthetic decoder.

use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use image::RgbImage;
use parking_lot::Mutex;

use shadowfix::media::{
    BackendFailure, ClassifierBackend, ClassifierChain, ForensicError, FrameSampler,
    LabelResolver, LabelScore, LocalClassifier, LocalModel, LocalModelHandle,
    MediaAnalysisPipeline, MediaBuffer, RiskTier, Verdict, VideoDecoder, VideoInfo,
    VideoSettings,
};

/// Backend that returns a fixed outcome and counts calls.
struct Scripted {
    name: &'static str,
    outcome: Result<Vec<LabelScore>, BackendFailure>,
    calls: AtomicUsize,
}

impl Scripted {
    fn new(name: &'static str, outcome: Result<Vec<LabelScore>, BackendFailure>) -> Arc<Self> {
        Arc::new(Self {
            name,
            outcome,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ClassifierBackend for Scripted {
    fn name(&self) -> &str {
        self.name
    }

    fn classify(&self, _image: &RgbImage) -> Result<Vec<LabelScore>, BackendFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcome.clone()
    }
}

/// Backend scoring frames by the red channel the synthetic decoder paints.
struct ByFrame {
    scores: Vec<f64>,
}

impl ClassifierBackend for ByFrame {
    fn name(&self) -> &str {
        "by-frame"
    }

    fn classify(&self, image: &RgbImage) -> Result<Vec<LabelScore>, BackendFailure> {
        let frame = image.get_pixel(0, 0)[0] as usize;
        self.scores
            .get(frame)
            .map(|&s| vec![LabelScore::new("Fake", s), LabelScore::new("Real", 1.0 - s)])
            .ok_or_else(|| BackendFailure::InvalidResponse(format!("unexpected frame {frame}")))
    }
}

/// `frames` frames at `fps`; frame `i` decodes to an image with red `i`.
struct SyntheticVideo {
    fps: f64,
    frames: u64,
    decoded: Mutex<Vec<u64>>,
}

impl SyntheticVideo {
    fn new(fps: f64, frames: u64) -> Arc<Self> {
        Arc::new(Self {
            fps,
            frames,
            decoded: Mutex::new(Vec::new()),
        })
    }
}

impl VideoDecoder for SyntheticVideo {
    fn probe(&self, path: &Path) -> Result<VideoInfo, ForensicError> {
        assert!(path.exists(), "container must be on disk while probing");
        Ok(VideoInfo {
            fps: self.fps,
            frame_count: self.frames,
        })
    }

    fn decode_frame(
        &self,
        _path: &Path,
        _info: &VideoInfo,
        index: u64,
    ) -> Result<RgbImage, ForensicError> {
        self.decoded.lock().push(index);
        Ok(RgbImage::from_pixel(
            4,
            4,
            image::Rgb([(index % 256) as u8, 0, 0]),
        ))
    }
}

fn dyn_backend<B: ClassifierBackend + 'static>(backend: &Arc<B>) -> Arc<dyn ClassifierBackend> {
    backend.clone()
}

fn jpeg_bytes() -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    RgbImage::from_fn(16, 16, |x, y| image::Rgb([(x * 16) as u8, (y * 16) as u8, 128]))
        .write_to(&mut out, image::ImageFormat::Jpeg)
        .unwrap();
    out.into_inner()
}

fn whole_video() -> VideoSettings {
    VideoSettings {
        max_frames: 10,
        window_seconds: None,
        fail_on_unscored: true,
    }
}

#[test]
fn test_image_falls_through_to_second_backend() {
    let first = Scripted::new(
        "primary",
        Err(BackendFailure::Request("connection refused".into())),
    );
    let second = Scripted::new("secondary", Ok(vec![LabelScore::new("fake", 0.92)]));
    let pipeline = MediaAnalysisPipeline::new(
        ClassifierChain::new(vec![dyn_backend(&first), dyn_backend(&second)]),
        FrameSampler::new(SyntheticVideo::new(25.0, 0)),
    );

    let result = pipeline.classify_image(&jpeg_bytes()).unwrap();
    assert_eq!(result.probability, 0.92);
    assert_eq!(result.risk_tier, RiskTier::High);
    assert_eq!(result.verdict, Verdict::Fake);
    assert_eq!((first.calls(), second.calls()), (1, 1));
}

#[test]
fn test_image_real_top_label_is_inverted() {
    let backend = Scripted::new(
        "remote",
        Ok(vec![
            LabelScore::new("Realism", 0.9),
            LabelScore::new("Deepfake", 0.1),
        ]),
    );
    let pipeline = MediaAnalysisPipeline::new(
        ClassifierChain::new(vec![dyn_backend(&backend)]),
        FrameSampler::new(SyntheticVideo::new(25.0, 0)),
    );

    let result = pipeline.analyze(&MediaBuffer::image(&jpeg_bytes())).unwrap();
    assert!((result.probability - 0.1).abs() < 1e-9);
    assert_eq!(result.risk_tier, RiskTier::Low);
    assert_eq!(result.verdict, Verdict::Real);
}

#[test]
fn test_image_custom_vocabulary() {
    let backend = Scripted::new(
        "remote",
        Ok(vec![
            LabelScore::new("LABEL_0", 0.2),
            LabelScore::new("synthetic", 0.8),
        ]),
    );
    let pipeline = MediaAnalysisPipeline::new(
        ClassifierChain::new(vec![dyn_backend(&backend)]),
        FrameSampler::new(SyntheticVideo::new(25.0, 0)),
    )
    .with_resolver(LabelResolver::new(["synthetic"], ["camera"]));

    let result = pipeline.classify_image(&jpeg_bytes()).unwrap();
    assert_eq!(result.probability, 0.8);
    assert_eq!(result.risk_tier, RiskTier::High);
}

#[test]
fn test_video_upper_quartile_aggregation() {
    let backend = Arc::new(ByFrame {
        scores: vec![0.1, 0.3, 0.2, 0.6],
    });
    let pipeline = MediaAnalysisPipeline::new(
        ClassifierChain::new(vec![dyn_backend(&backend)]),
        FrameSampler::new(SyntheticVideo::new(1.0, 4)),
    )
    .with_video_settings(VideoSettings {
        max_frames: 4,
        ..whole_video()
    });

    let result = pipeline.classify_video(b"\x00\x00\x00\x18ftypmp42", "video/mp4").unwrap();
    assert_eq!(result.probability, 0.6);
    assert_eq!(result.risk_tier, RiskTier::Medium);
    assert_eq!(result.verdict, Verdict::Real);
}

#[test]
fn test_short_video_repeats_count_toward_percentile() {
    let video = SyntheticVideo::new(1.0, 4);
    let backend = Arc::new(ByFrame {
        scores: vec![0.1, 0.9, 0.2, 0.8],
    });
    let pipeline = MediaAnalysisPipeline::new(
        ClassifierChain::new(vec![dyn_backend(&backend)]),
        FrameSampler::new(video.clone()),
    )
    .with_video_settings(whole_video());

    // Ten samples over four frames: [0,0,0,1,1,2,2,2,3,3]. Sorted scores put
    // 0.8 at rank 7; the four distinct frames alone would give 0.9.
    let result = pipeline.classify_video(b"container", "mp4").unwrap();
    assert_eq!(result.probability, 0.8);
    assert_eq!(result.risk_tier, RiskTier::High);
    assert_eq!(*video.decoded.lock(), vec![0, 1, 2, 3]);
}

#[test]
fn test_video_window_limits_sampled_frames() {
    let video = SyntheticVideo::new(25.0, 1000);
    let backend = Arc::new(ByFrame {
        scores: vec![0.4; 256],
    });
    let pipeline = MediaAnalysisPipeline::new(
        ClassifierChain::new(vec![dyn_backend(&backend)]),
        FrameSampler::new(video.clone()),
    );

    pipeline.classify_video(b"container", "webm").unwrap();
    let decoded = video.decoded.lock().clone();
    assert_eq!(decoded.len(), 10);
    assert!(decoded.iter().all(|&i| i < 125));
    assert!(decoded.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn test_video_frame_failures_do_not_abort() {
    // Frames 2 and 3 are unknown to the backend and fail.
    let backend = Arc::new(ByFrame {
        scores: vec![0.9, 0.8],
    });
    let pipeline = MediaAnalysisPipeline::new(
        ClassifierChain::new(vec![dyn_backend(&backend)]),
        FrameSampler::new(SyntheticVideo::new(1.0, 4)),
    )
    .with_video_settings(whole_video());

    let result = pipeline.classify_video(b"container", "mp4").unwrap();
    assert_eq!(result.probability, 0.9);
    assert_eq!(result.risk_tier, RiskTier::High);
}

#[test]
fn test_video_every_frame_fails() {
    let backend = Scripted::new("remote", Err(BackendFailure::Request("timed out".into())));
    let pipeline = MediaAnalysisPipeline::new(
        ClassifierChain::new(vec![dyn_backend(&backend)]),
        FrameSampler::new(SyntheticVideo::new(1.0, 3)),
    )
    .with_video_settings(whole_video());

    match pipeline.classify_video(b"container", "mp4") {
        Err(ForensicError::EngineUnavailable { last_error }) => {
            assert!(last_error.contains("timed out"))
        }
        other => panic!("expected EngineUnavailable, got {other:?}"),
    }
    assert_eq!(backend.calls(), 3);
}

#[test]
fn test_video_without_frames_is_extraction_error() {
    let backend = Scripted::new("remote", Ok(vec![LabelScore::new("fake", 0.5)]));
    let pipeline = MediaAnalysisPipeline::new(
        ClassifierChain::new(vec![dyn_backend(&backend)]),
        FrameSampler::new(SyntheticVideo::new(30.0, 0)),
    );

    assert!(matches!(
        pipeline.classify_video(b"container", "mp4"),
        Err(ForensicError::Extraction(_))
    ));
    assert_eq!(backend.calls(), 0);
}

// ==================== local fallback ====================

struct ConstantModel(f64);

impl LocalModel for ConstantModel {
    fn classify(&self, _image: &RgbImage) -> Result<Vec<LabelScore>, BackendFailure> {
        Ok(vec![LabelScore::new("artificial", self.0)])
    }
}

#[test]
fn test_local_fallback_loaded_once_across_pipelines() {
    let loads = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&loads);
    let handle = Arc::new(LocalModelHandle::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(ConstantModel(0.55)) as Arc<dyn LocalModel>)
    }));
    let remote = Scripted::new(
        "remote",
        Err(BackendFailure::Status {
            status: 503,
            body: "Model is currently loading".into(),
        }),
    );

    for _ in 0..3 {
        let local: Arc<dyn ClassifierBackend> = Arc::new(LocalClassifier::new(handle.clone()));
        let pipeline = MediaAnalysisPipeline::new(
            ClassifierChain::new(vec![dyn_backend(&remote)]).with_local(Some(local)),
            FrameSampler::new(SyntheticVideo::new(1.0, 2)),
        )
        .with_video_settings(whole_video());

        let image = pipeline.classify_image(&jpeg_bytes()).unwrap();
        assert_eq!(image.probability, 0.55);
        assert_eq!(image.risk_tier, RiskTier::Medium);

        let video = pipeline.classify_video(b"container", "mp4").unwrap();
        assert_eq!(video.probability, 0.55);
    }

    assert_eq!(loads.load(Ordering::SeqCst), 1);
    // Remote is retried for every image and frame: 3 * (1 + 2).
    assert_eq!(remote.calls(), 9);
}
