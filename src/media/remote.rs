//! Remote HTTP classifier backend.
//!
//! Speaks the hosted image-classification contract: the image goes out as a
//! raw JPEG body with a bearer token, and a `200` carrying
//! `[{"label": ..., "score": ...}]` comes back. Everything else is a
//! [`BackendFailure`] so the chain can move on to the next endpoint.

use std::io::Read;
use std::time::Duration;

use image::RgbImage;
use reqwest::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use url::Url;
use zeroize::Zeroizing;

use crate::media::backend::{encode_jpeg, BackendFailure, ClassifierBackend};
use crate::media::labels::{parse_label_scores, LabelScore};
use crate::security::logging::{diagnostic_snippet, sanitize_log_message};
use crate::security::sanitize_credential;

/// Default per-call timeout for remote inference.
pub const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_secs(15);

/// Upper bound on the TCP/TLS connect phase.
const MAX_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Largest response body read from an endpoint. A label array is far smaller.
pub const MAX_RESPONSE_BYTES: u64 = 64 * 1024;

/// One remote inference endpoint.
pub struct RemoteClassifier {
    client: reqwest::blocking::Client,
    endpoint: Url,
    name: String,
    api_token: Zeroizing<String>,
}

impl std::fmt::Debug for RemoteClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteClassifier")
            .field("name", &self.name)
            .field("api_token", &"<redacted>")
            .finish()
    }
}

impl RemoteClassifier {
    /// Create a backend for `endpoint`.
    ///
    /// The token is passed through [`sanitize_credential`] before it is ever
    /// placed in a header.
    pub fn new(endpoint: &str, api_token: &str, timeout: Duration) -> Result<Self, BackendFailure> {
        let endpoint = Url::parse(endpoint.trim()).map_err(|e| {
            BackendFailure::Unavailable(format!(
                "invalid endpoint {}: {e}",
                sanitize_log_message(endpoint)
            ))
        })?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(BackendFailure::Unavailable(format!(
                "unsupported endpoint scheme: {}",
                endpoint.scheme()
            )));
        }

        let client = reqwest::blocking::Client::builder()
            .connect_timeout(timeout.min(MAX_CONNECT_TIMEOUT))
            .timeout(timeout)
            .build()
            .map_err(|e| BackendFailure::Unavailable(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            name: endpoint_name(&endpoint),
            endpoint,
            api_token: Zeroizing::new(sanitize_credential(api_token)),
        })
    }

    fn authorization(&self) -> Result<HeaderValue, BackendFailure> {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", self.api_token.as_str()))
            .map_err(|_| {
                BackendFailure::Unavailable(
                    "API token contains characters not allowed in a header".to_string(),
                )
            })?;
        value.set_sensitive(true);
        Ok(value)
    }
}

impl ClassifierBackend for RemoteClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn classify(&self, image: &RgbImage) -> Result<Vec<LabelScore>, BackendFailure> {
        let jpeg = encode_jpeg(image)?;

        tracing::debug!(
            target: "classifier",
            endpoint = %self.name,
            bytes = jpeg.len(),
            "Requesting remote inference"
        );

        let response = self
            .client
            .post(self.endpoint.clone())
            .header(AUTHORIZATION, self.authorization()?)
            .header(CONTENT_TYPE, "image/jpeg")
            .body(jpeg)
            .send()
            .map_err(|e| BackendFailure::Request(sanitize_log_message(&e.to_string())))?;

        let status = response.status();
        let (body, oversized) = read_capped(response)?;

        if status != StatusCode::OK {
            return Err(BackendFailure::Status {
                status: status.as_u16(),
                body: diagnostic_snippet(&String::from_utf8_lossy(&body)),
            });
        }

        if oversized {
            return Err(BackendFailure::InvalidResponse(format!(
                "response body exceeds {MAX_RESPONSE_BYTES} bytes"
            )));
        }

        parse_label_scores(&body)
    }
}

/// Read at most [`MAX_RESPONSE_BYTES`]; the flag reports whether more was on offer.
fn read_capped(response: reqwest::blocking::Response) -> Result<(Vec<u8>, bool), BackendFailure> {
    let mut body = Vec::new();
    response
        .take(MAX_RESPONSE_BYTES + 1)
        .read_to_end(&mut body)
        .map_err(|e| BackendFailure::Request(format!("failed to read body: {e}")))?;
    let oversized = body.len() as u64 > MAX_RESPONSE_BYTES;
    body.truncate(MAX_RESPONSE_BYTES as usize);
    Ok((body, oversized))
}

/// Log-friendly name: host plus path, never userinfo or query.
fn endpoint_name(url: &Url) -> String {
    let host = url.host_str().unwrap_or("remote");
    match url.port() {
        Some(port) => format!("{host}:{port}{}", url.path()),
        None => format!("{host}{}", url.path()),
    }
}
