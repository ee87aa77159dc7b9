//! Error types and HTTP failure classification.
//!
//! Remote failures are reported to the engine as [`RemoteError`]s; this
//! module decides which category a status code or transport failure falls
//! into. [`Error`] covers problems building a client at all.

use reconcile::RemoteError;
use serde::Deserialize;

/// Result type alias for client construction.
pub type Result<T> = std::result::Result<T, Error>;

/// Longest response excerpt carried in an error message.
const MAX_MESSAGE_LEN: usize = 200;

/// Errors that prevent a client from being built.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// API key missing or blank.
    #[error("API key is empty")]
    EmptyApiKey,

    /// Base URL is not an http(s) URL.
    #[error("invalid API base URL '{0}': expected http:// or https://")]
    InvalidBaseUrl(String),
}

/// Map a non-2xx status to a remote error.
///
/// 404 is not-found; 408, 429 and 5xx are transient; every other status is a
/// business error reported by the remote.
pub fn classify_status(status: u16, what: &str, message: &str) -> RemoteError {
    let detail = if message.is_empty() {
        format!("HTTP {status}")
    } else {
        format!("HTTP {status}: {message}")
    };

    match status {
        404 => RemoteError::not_found(what),
        408 | 429 | 500..=599 => RemoteError::transport(detail, Some(status)),
        _ => RemoteError::logic(detail, Some(status)),
    }
}

/// Map a failure below HTTP (connect, TLS, timeout) to a remote error.
pub fn classify_transport(operation: &str, err: ureq::Error) -> RemoteError {
    match err {
        ureq::Error::Timeout(_) => RemoteError::timeout(operation),
        ureq::Error::StatusCode(status) => classify_status(status, operation, ""),
        other => RemoteError::transport(format!("{operation}: {other}"), None),
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Extract a readable message from an error response body.
pub fn error_message(body: &str) -> String {
    let message = serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.error)
        .unwrap_or_else(|_| body.trim().to_string());

    if message.chars().count() > MAX_MESSAGE_LEN {
        let truncated: String = message.chars().take(MAX_MESSAGE_LEN).collect();
        format!("{truncated}...")
    } else {
        message
    }
}
