//! End-to-end analysis of one media buffer.

use std::sync::Arc;

use image::RgbImage;
use serde::Serialize;

use crate::config::DetectorConfig;
use crate::media::backend::{ClassifierBackend, ClassifierChain};
use crate::media::error::ForensicError;
use crate::media::ffmpeg::FfmpegDecoder;
use crate::media::frames::FrameSampler;
use crate::media::labels::LabelResolver;
use crate::media::local::{LocalClassifier, LocalModelHandle, ProcessModelConfig};
use crate::media::remote::RemoteClassifier;
use crate::media::scoring::{RiskThresholds, RiskTier, ScoreAggregator, Verdict};
use crate::media::{MediaBuffer, MediaKind};

/// Outcome of one analysis. `verdict` is `Fake` exactly when `risk_tier` is `High`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ForensicResult {
    pub probability: f64,
    pub risk_tier: RiskTier,
    pub verdict: Verdict,
}

impl ForensicResult {
    pub fn from_probability(probability: f64, thresholds: &RiskThresholds) -> Self {
        let (risk_tier, is_fake) = thresholds.classify(probability);
        Self {
            probability,
            risk_tier,
            verdict: if is_fake { Verdict::Fake } else { Verdict::Real },
        }
    }

    pub fn is_fake(&self) -> bool {
        self.verdict == Verdict::Fake
    }
}

/// Per-call video sampling parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoSettings {
    pub max_frames: usize,
    pub window_seconds: Option<f64>,
    /// When no sampled frame could be classified: fail (`true`) or report 0.0.
    pub fail_on_unscored: bool,
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            max_frames: 10,
            window_seconds: Some(5.0),
            fail_on_unscored: true,
        }
    }
}

/// Orchestrates classification, resolution, sampling, aggregation and risk.
///
/// Stateless between calls apart from the shared local model handle held by
/// the chain; one pipeline can serve any number of sequential calls.
#[derive(Debug, Clone)]
pub struct MediaAnalysisPipeline {
    chain: ClassifierChain,
    resolver: LabelResolver,
    sampler: FrameSampler,
    aggregator: ScoreAggregator,
    thresholds: RiskThresholds,
    video: VideoSettings,
}

impl MediaAnalysisPipeline {
    pub fn new(chain: ClassifierChain, sampler: FrameSampler) -> Self {
        Self {
            chain,
            resolver: LabelResolver::default(),
            sampler,
            aggregator: ScoreAggregator::default(),
            thresholds: RiskThresholds::default(),
            video: VideoSettings::default(),
        }
    }

    pub fn with_resolver(mut self, resolver: LabelResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_aggregator(mut self, aggregator: ScoreAggregator) -> Self {
        self.aggregator = aggregator;
        self
    }

    pub fn with_thresholds(mut self, thresholds: RiskThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn with_video_settings(mut self, video: VideoSettings) -> Self {
        self.video = video;
        self
    }

    /// Build the production pipeline from configuration.
    ///
    /// `local` is the host's process-wide model handle. When it is `None`
    /// and the local fallback is enabled, a handle for the configured
    /// program is created; hosts that build several pipelines should pass
    /// their own so the model loads only once.
    pub fn from_config(
        config: &DetectorConfig,
        local: Option<Arc<LocalModelHandle>>,
    ) -> Result<Self, ForensicError> {
        let classifier = &config.classifier;
        let mut remote: Vec<Arc<dyn ClassifierBackend>> = Vec::new();
        let mut last_error = String::from("no classifier backends configured");

        for endpoint in classifier.endpoints.iter().filter(|e| !e.trim().is_empty()) {
            match RemoteClassifier::new(endpoint, classifier.token(), classifier.timeout()) {
                Ok(backend) => remote.push(Arc::new(backend)),
                Err(e) => {
                    tracing::error!(target: "classifier", error = %e, "Skipping unusable endpoint");
                    last_error = e.to_string();
                }
            }
        }

        if !remote.is_empty() && classifier.token().trim().is_empty() {
            tracing::warn!(
                target: "config",
                "No API token configured; remote inference requests will be unauthenticated"
            );
        }

        let local = local.or_else(|| {
            classifier.local.enabled.then(|| {
                Arc::new(LocalModelHandle::process(ProcessModelConfig {
                    program: classifier.local.program.clone(),
                    args: classifier.local.args.clone(),
                    model: classifier.local.model.clone(),
                }))
            })
        });
        let local = local
            .map(|handle| Arc::new(LocalClassifier::new(handle)) as Arc<dyn ClassifierBackend>);

        let chain = ClassifierChain::new(remote).with_local(local);
        if chain.is_empty() {
            return Err(ForensicError::EngineUnavailable { last_error });
        }

        let decoder = FfmpegDecoder::new(&config.video.ffmpeg_path, &config.video.ffprobe_path);
        let sampler = FrameSampler::new(Arc::new(decoder))
            .with_frame_cap(config.video.frame_cap)
            .with_temp_dir(config.video.temp_dir.clone());

        tracing::debug!(target: "pipeline", chain = ?chain, "Pipeline configured");

        Ok(Self::new(chain, sampler)
            .with_resolver(LabelResolver::new(
                &config.labels.fake_keywords,
                &config.labels.real_keywords,
            ))
            .with_aggregator(ScoreAggregator::new(config.video.percentile))
            .with_thresholds(RiskThresholds::new(
                config.risk.high_threshold,
                config.risk.medium_threshold,
            ))
            .with_video_settings(VideoSettings {
                max_frames: config.video.max_frames,
                window_seconds: config.video.window_seconds,
                fail_on_unscored: config.video.fail_on_unscored,
            }))
    }

    pub fn chain(&self) -> &ClassifierChain {
        &self.chain
    }

    /// Dispatch on the buffer's declared kind.
    pub fn analyze(&self, media: &MediaBuffer<'_>) -> Result<ForensicResult, ForensicError> {
        match media.kind() {
            MediaKind::Image => self.classify_image(media.bytes()),
            MediaKind::Video => self.classify_video(media.bytes(), media.format_hint()),
        }
    }

    /// Classify an encoded still image.
    pub fn classify_image(&self, bytes: &[u8]) -> Result<ForensicResult, ForensicError> {
        if bytes.is_empty() {
            return Err(ForensicError::Decode("image buffer is empty".to_string()));
        }
        let image = image::load_from_memory(bytes)
            .map_err(|e| ForensicError::Decode(e.to_string()))?
            .to_rgb8();

        let probability = self.score_frame(&image)?;
        let result = ForensicResult::from_probability(probability, &self.thresholds);
        tracing::info!(
            target: "pipeline",
            kind = "image",
            probability = result.probability,
            risk = %result.risk_tier,
            "Analysis complete"
        );
        Ok(result)
    }

    /// Classify a video by sampling frames and aggregating their scores.
    pub fn classify_video(
        &self,
        bytes: &[u8],
        container_hint: &str,
    ) -> Result<ForensicResult, ForensicError> {
        let frames = self.sampler.sample(
            &MediaBuffer::video(bytes, container_hint),
            self.video.max_frames,
            self.video.window_seconds,
        )?;
        if frames.is_empty() {
            return Err(ForensicError::Extraction(
                "video has no decodable frames in the sampling window".to_string(),
            ));
        }

        let mut scores = Vec::with_capacity(frames.len());
        let mut last_error = String::new();
        // A frame sampled more than once is classified once and counted each time.
        let mut previous: Option<(u64, Option<f64>)> = None;
        for frame in &frames {
            let score = match previous {
                Some((index, score)) if index == frame.index => score,
                _ => {
                    let score = match self.score_frame(&frame.image) {
                        Ok(p) => Some(p),
                        Err(e) => {
                            tracing::warn!(
                                target: "pipeline",
                                index = frame.index,
                                error = %e,
                                "Frame classification failed, skipping"
                            );
                            last_error = match e {
                                ForensicError::EngineUnavailable { last_error } => last_error,
                                other => other.to_string(),
                            };
                            None
                        }
                    };
                    previous = Some((frame.index, score));
                    score
                }
            };
            scores.extend(score);
        }

        if scores.is_empty() {
            if self.video.fail_on_unscored {
                return Err(ForensicError::EngineUnavailable { last_error });
            }
            tracing::warn!(
                target: "pipeline",
                frames = frames.len(),
                "No frame could be classified; reporting 0.0"
            );
        }

        let probability = self.aggregator.aggregate(&scores);
        let result = ForensicResult::from_probability(probability, &self.thresholds);
        tracing::info!(
            target: "pipeline",
            kind = "video",
            sampled = frames.len(),
            scored = scores.len(),
            probability = result.probability,
            risk = %result.risk_tier,
            "Analysis complete"
        );
        Ok(result)
    }

    fn score_frame(&self, image: &RgbImage) -> Result<f64, ForensicError> {
        let labels = self.chain.classify(image)?;
        self.resolver.resolve(&labels)
    }
}
