//! Frame score aggregation and risk tiers.

use serde::{Deserialize, Serialize};

pub const DEFAULT_PERCENTILE: f64 = 0.75;
pub const DEFAULT_HIGH_THRESHOLD: f64 = 0.75;
pub const DEFAULT_MEDIUM_THRESHOLD: f64 = 0.5;

/// Collapses per-frame fake probabilities into one video score.
///
/// An upper percentile rather than the mean, so a handful of manipulated
/// frames in an otherwise clean clip still register.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreAggregator {
    percentile: f64,
}

impl Default for ScoreAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_PERCENTILE)
    }
}

impl ScoreAggregator {
    /// `percentile` is a fraction; values outside `[0, 1]` are clamped.
    pub fn new(percentile: f64) -> Self {
        let percentile = if percentile.is_nan() {
            DEFAULT_PERCENTILE
        } else {
            percentile.clamp(0.0, 1.0)
        };
        Self { percentile }
    }

    pub fn percentile(&self) -> f64 {
        self.percentile
    }

    /// Element `min(floor(len * p), len - 1)` of the ascending sort. Empty is `0.0`.
    pub fn aggregate(&self, scores: &[f64]) -> f64 {
        if scores.is_empty() {
            return 0.0;
        }
        let mut sorted = scores.to_vec();
        sorted.sort_by(f64::total_cmp);
        let idx = ((sorted.len() as f64 * self.percentile).floor() as usize).min(sorted.len() - 1);
        sorted[idx]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

impl RiskTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskTier::Low => "LOW",
            RiskTier::Medium => "MEDIUM",
            RiskTier::High => "HIGH",
        }
    }
}

impl std::fmt::Display for RiskTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Real,
    Fake,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Real => "REAL",
            Verdict::Fake => "FAKE",
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Probability cut-offs for the risk tiers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskThresholds {
    pub high: f64,
    pub medium: f64,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            high: DEFAULT_HIGH_THRESHOLD,
            medium: DEFAULT_MEDIUM_THRESHOLD,
        }
    }
}

impl RiskThresholds {
    pub fn new(high: f64, medium: f64) -> Self {
        Self { high, medium }
    }

    /// `p > high` is HIGH and fake; `medium <= p <= high` is MEDIUM;
    /// anything lower is LOW. Only HIGH is a fake verdict.
    pub fn classify(&self, probability: f64) -> (RiskTier, bool) {
        if probability > self.high {
            (RiskTier::High, true)
        } else if probability >= self.medium {
            (RiskTier::Medium, false)
        } else {
            (RiskTier::Low, false)
        }
    }
}
