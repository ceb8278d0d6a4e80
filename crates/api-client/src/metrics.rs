//! Client-side request metrics
//!
//! Emitted through the `metrics` facade; calls are no-ops until the host
//! installs a recorder.
//!
//! - `api_client_requests_total` (counter): labels `method`, `outcome`
//! - `api_client_retries_total` (counter): label `method`
//! - `api_client_request_duration_seconds` (histogram): label `outcome`

/// Record a finished call. `outcome` is `ok` or an error category tag.
pub fn record_request(method: &str, outcome: &str, duration_secs: f64) {
    metrics::counter!(
        "api_client_requests_total",
        "method" => method.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
    metrics::histogram!("api_client_request_duration_seconds", "outcome" => outcome.to_string())
        .record(duration_secs);
}

/// Record one retry (an attempt after the first).
pub fn record_retry(method: &str) {
    metrics::counter!("api_client_retries_total", "method" => method.to_string()).increment(1);
}
