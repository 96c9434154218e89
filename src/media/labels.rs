//! Label/score responses and their reduction to a single fake probability.
//!
//! Classifier backends answer with an ordered list of `{label, score}` pairs
//! whose label vocabulary depends on the model ("Fake"/"Real",
//! "artificial"/"human", "LABEL_1", ...). [`LabelResolver`] maps that list to
//! one probability using configurable keyword sets.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::media::backend::BackendFailure;
use crate::media::error::ForensicError;
use crate::security::logging::diagnostic_snippet;

/// Labels treated as "synthetic" when no configuration overrides them.
pub const DEFAULT_FAKE_KEYWORDS: &[&str] = &["fake", "ai", "artificial", "generated", "deepfake"];

/// Labels treated as "genuine" when no configuration overrides them.
pub const DEFAULT_REAL_KEYWORDS: &[&str] = &["real", "human", "authentic", "natural", "realism"];

/// One classifier prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelScore {
    pub label: String,
    pub score: f64,
}

impl LabelScore {
    pub fn new(label: impl Into<String>, score: f64) -> Self {
        Self {
            label: label.into(),
            score,
        }
    }
}

/// Parse a classifier response body into label/score pairs.
///
/// Accepts only a non-empty JSON array of `{"label": string, "score": number}`
/// objects with scores in `[0, 1]`. An `{"error": ...}` object (what hosted
/// inference APIs return while a model is loading or rate limited) becomes
/// [`BackendFailure::ErrorPayload`]; anything else is
/// [`BackendFailure::InvalidResponse`]. Nothing is coerced.
pub fn parse_label_scores(body: &[u8]) -> Result<Vec<LabelScore>, BackendFailure> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| BackendFailure::InvalidResponse(format!("body is not valid JSON: {e}")))?;

    match value {
        Value::Array(items) => {
            if items.is_empty() {
                return Err(BackendFailure::InvalidResponse(
                    "empty label list".to_string(),
                ));
            }
            items
                .into_iter()
                .enumerate()
                .map(|(i, item)| {
                    let entry: LabelScore = serde_json::from_value(item).map_err(|e| {
                        BackendFailure::InvalidResponse(format!("entry {i}: {e}"))
                    })?;
                    if !entry.score.is_finite() || !(0.0..=1.0).contains(&entry.score) {
                        return Err(BackendFailure::InvalidResponse(format!(
                            "entry {i}: score {} outside [0, 1]",
                            entry.score
                        )));
                    }
                    Ok(entry)
                })
                .collect()
        }
        Value::Object(map) if map.contains_key("error") => {
            let message = match map.get("error") {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => String::new(),
            };
            Err(BackendFailure::ErrorPayload(diagnostic_snippet(&message)))
        }
        other => Err(BackendFailure::InvalidResponse(format!(
            "expected a JSON array, got {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Reduces an ordered label/score list to a fake probability.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelResolver {
    fake_keywords: Vec<String>,
    real_keywords: Vec<String>,
}

impl Default for LabelResolver {
    fn default() -> Self {
        Self::new(DEFAULT_FAKE_KEYWORDS, DEFAULT_REAL_KEYWORDS)
    }
}

impl LabelResolver {
    /// Build a resolver from keyword lists. Keywords are matched as
    /// case-insensitive substrings; blank entries are ignored since they
    /// would match every label.
    pub fn new<F, R>(fake_keywords: F, real_keywords: R) -> Self
    where
        F: IntoIterator,
        F::Item: AsRef<str>,
        R: IntoIterator,
        R::Item: AsRef<str>,
    {
        Self {
            fake_keywords: normalize_keywords(fake_keywords),
            real_keywords: normalize_keywords(real_keywords),
        }
    }

    pub fn fake_keywords(&self) -> &[String] {
        &self.fake_keywords
    }

    pub fn real_keywords(&self) -> &[String] {
        &self.real_keywords
    }

    fn is_fake(&self, label: &str) -> bool {
        matches_any(label, &self.fake_keywords)
    }

    fn is_real(&self, label: &str) -> bool {
        matches_any(label, &self.real_keywords)
    }

    /// Resolve the fake probability.
    ///
    /// The first entry is the backend's top prediction:
    /// 1. top label is a real label: `1 - top.score`
    /// 2. top label is a fake label: `top.score`
    /// 3. otherwise the score of the first later entry with a fake label
    /// 4. otherwise `top.score`
    pub fn resolve(&self, scores: &[LabelScore]) -> Result<f64, ForensicError> {
        let Some((top, rest)) = scores.split_first() else {
            return Err(ForensicError::InvalidResponse(
                "classifier returned no labels".to_string(),
            ));
        };

        if self.is_real(&top.label) {
            return Ok(1.0 - top.score);
        }
        if self.is_fake(&top.label) {
            return Ok(top.score);
        }
        if let Some(fake) = rest.iter().find(|entry| self.is_fake(&entry.label)) {
            return Ok(fake.score);
        }
        Ok(top.score)
    }
}

fn normalize_keywords<I>(keywords: I) -> Vec<String>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    keywords
        .into_iter()
        .map(|k| k.as_ref().trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect()
}

fn matches_any(label: &str, keywords: &[String]) -> bool {
    let label = label.to_lowercase();
    keywords.iter().any(|k| label.contains(k.as_str()))
}
