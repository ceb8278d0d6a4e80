//! Typed failures surfaced by the API client
//!
//! Every failure of a call (non-2xx response, transport failure, timeout,
//! undecodable body, spent retry budget) is funneled into one `ApiError`.
//! Callers match on `category` / `status` rather than on transport errors.

use std::fmt;
use std::time::Duration;

use reqwest::StatusCode;
use serde::Serialize;
use serde_json::{Value, json};

use crate::options::millis;

/// Coarse classification of an `ApiError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    /// 4xx except 429. Never retried.
    ClientError,
    /// 5xx or 429 that was not retried away.
    ServerError,
    /// The attempt exceeded its timeout (status 408).
    Timeout,
    /// DNS, connection refused, reset, offline (status 0).
    NetworkError,
    /// Anything else: bad URL, unencodable body, response that fails to decode.
    UnknownError,
    /// Every permitted attempt failed retriably (status 503).
    RetryExhausted,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClientError => "CLIENT_ERROR",
            Self::ServerError => "SERVER_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::NetworkError => "NETWORK_ERROR",
            Self::UnknownError => "UNKNOWN_ERROR",
            Self::RetryExhausted => "RETRY_EXHAUSTED",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of a single API call.
///
/// `status` is HTTP-like: the response status for HTTP failures, `0` for
/// network failures, `408` for timeouts, `503` for exhausted retries and
/// `500` for unknown failures.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message} ({category}, status {status})")]
pub struct ApiError {
    pub message: String,
    pub status: u16,
    /// Parsed response body (or a JSON string of the raw text when it was not JSON)
    pub body: Option<Value>,
    pub category: ErrorCategory,
}

impl ApiError {
    fn new(
        category: ErrorCategory,
        status: u16,
        message: impl Into<String>,
        body: Option<Value>,
    ) -> Self {
        Self {
            message: message.into(),
            status,
            body,
            category,
        }
    }

    /// Build the error for a non-2xx response.
    ///
    /// 4xx other than 429 is a terminal `ClientError`; everything else
    /// (5xx, 429, stray 1xx/3xx) is a retriable `ServerError`.
    pub fn from_status(status: StatusCode, body: Option<Value>) -> Self {
        let message = status.canonical_reason().unwrap_or("Request failed");
        let category = if status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS {
            ErrorCategory::ClientError
        } else {
            ErrorCategory::ServerError
        };
        Self::new(category, status.as_u16(), message, body)
    }

    pub fn timeout(timeout: Duration) -> Self {
        Self::new(
            ErrorCategory::Timeout,
            408,
            "Request timeout",
            Some(json!({ "timeout": millis(timeout) })),
        )
    }

    pub fn network(detail: impl fmt::Display) -> Self {
        Self::new(
            ErrorCategory::NetworkError,
            0,
            format!("Network error - check your connection ({detail})"),
            None,
        )
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::UnknownError, 500, message, None)
    }

    /// A 2xx body that could not be decoded into the caller's expected shape.
    pub fn invalid_body(detail: impl fmt::Display, raw: Option<Value>) -> Self {
        Self::new(
            ErrorCategory::UnknownError,
            500,
            format!("invalid response body: {detail}"),
            raw,
        )
    }

    /// Terminal error once every permitted attempt failed retriably.
    pub fn retry_exhausted(attempts: u32, last: &ApiError) -> Self {
        Self::new(
            ErrorCategory::RetryExhausted,
            503,
            "Service unavailable after retries",
            Some(json!({
                "attempts": attempts,
                "last_status": last.status,
                "last_category": last.category,
            })),
        )
    }

    /// Whether another attempt may succeed (5xx, 429, transport failure).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category,
            ErrorCategory::ServerError | ErrorCategory::NetworkError
        )
    }

    /// Human-readable reason supplied by the backend, if any.
    ///
    /// Looks for `detail` then `message` in a JSON object body, or uses a
    /// plain-text body directly. Falls back to `message`.
    pub fn detail(&self) -> &str {
        match &self.body {
            Some(Value::Object(map)) => ["detail", "message"]
                .iter()
                .find_map(|key| map.get(*key).and_then(Value::as_str))
                .unwrap_or(&self.message),
            Some(Value::String(text)) if !text.is_empty() => text,
            _ => &self.message,
        }
    }
}

/// Result alias for client operations.
pub type Result<T> = std::result::Result<T, ApiError>;

/// Failure reading or writing the local credential store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("credential parse error: {0}")]
    Parse(String),
}
