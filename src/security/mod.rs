//! Security utilities module
//!
//! Provides functionality for:
//! - Normalizing API credentials before they reach an `Authorization` header
//! - Redacting sensitive fields from configuration dumps
//! - Secure logging without secret leakage (see [`logging`])

use serde_json::Value;

pub mod logging;

/// Field names whose string values are always redacted (case-insensitive)
const SENSITIVE_FIELD_NAMES: &[&str] = &[
    "apikey",
    "api_key",
    "apitoken",
    "api_token",
    "token",
    "access_token",
    "bearer_token",
    "password",
    "secret",
    "credential",
    "credentials",
];

/// Redaction placeholder
pub const REDACTED_PLACEHOLDER: &str = "***REDACTED***";

/// Normalize an API credential.
///
/// Configuration sources (dotenv files, CI secret stores, copy-paste) tend to
/// wrap secrets in quotes or leave stray whitespace, including line breaks in
/// the middle of the value. Every whitespace character and every `"` / `'` is
/// removed. The function is total and idempotent.
///
/// # Example
/// ```
/// use shadowfix::security::sanitize_credential;
///
/// assert_eq!(sanitize_credential(" h f_ ab\n'c'"), "hf_abc");
/// assert_eq!(sanitize_credential(""), "");
/// ```
pub fn sanitize_credential(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace() && *c != '"' && *c != '\'')
        .collect()
}

/// Check if a field name indicates sensitive content
fn is_sensitive_field_name(name: &str) -> bool {
    let name_lower = name.to_lowercase();
    SENSITIVE_FIELD_NAMES.iter().any(|&s| name_lower == s)
}

/// Recursively redact sensitive fields from a JSON value.
///
/// String values under sensitive field names (e.g. `apiToken`) and strings
/// that look like URLs with embedded credentials are replaced with
/// [`REDACTED_PLACEHOLDER`]. Everything else is copied as-is.
///
/// # Example
/// ```
/// use serde_json::json;
/// use shadowfix::security::redact_secrets;
///
/// let config = json!({
///     "classifier": {
///         "timeoutSecs": 15,
///         "apiToken": "hf_secret"
///     }
/// });
///
/// let redacted = redact_secrets(&config);
/// assert_eq!(redacted["classifier"]["apiToken"], "***REDACTED***");
/// assert_eq!(redacted["classifier"]["timeoutSecs"], 15);
/// ```
pub fn redact_secrets(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut redacted = serde_json::Map::new();
            for (key, val) in map.iter() {
                if should_redact_field(key, val) {
                    redacted.insert(key.clone(), Value::String(REDACTED_PLACEHOLDER.to_string()));
                } else {
                    redacted.insert(key.clone(), redact_secrets(val));
                }
            }
            Value::Object(redacted)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(redact_secrets).collect()),
        _ => value.clone(),
    }
}

/// Determine if a field should be redacted based on its name and value
fn should_redact_field(key: &str, value: &Value) -> bool {
    // Only string values carry secrets
    let Some(s) = value.as_str() else {
        return false;
    };
    is_sensitive_field_name(key) || looks_like_url_with_credentials(s)
}

/// Check if a string looks like a URL containing `user:password@`
fn looks_like_url_with_credentials(s: &str) -> bool {
    let Some(scheme_end) = s.find("://") else {
        return false;
    };
    let rest = &s[scheme_end + 3..];
    let authority = rest.split('/').next().unwrap_or("");
    match authority.find('@') {
        Some(at_pos) => authority[..at_pos].contains(':'),
        None => false,
    }
}
