//! Per-call options and the retry strategy
//!
//! A `RetryStrategy` is the client-wide default; `RequestOptions` may override
//! any part of it for a single call (JSON parsing, timeout, retry toggle,
//! retry count and delay).

use std::time::Duration;

/// Default per-attempt timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(30_000);

/// Default number of retries after the first attempt.
pub const DEFAULT_RETRY_COUNT: u32 = 2;

/// Default linear backoff base.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1_000);

/// Whole milliseconds in `d`, saturating at `u64::MAX`.
pub(crate) fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Linear-backoff retry strategy.
///
/// Retry `n` (the `n+1`th attempt) waits `retry_delay * n`. There is no
/// exponential growth and no jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryStrategy {
    pub enabled: bool,
    pub retry_count: u32,
    pub retry_delay: Duration,
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self {
            enabled: true,
            retry_count: DEFAULT_RETRY_COUNT,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryStrategy {
    /// Single attempt, failures surface as-is. Count and delay keep their
    /// defaults so a per-call `retry(true)` gets the usual schedule.
    pub const fn none() -> Self {
        Self {
            enabled: false,
            retry_count: DEFAULT_RETRY_COUNT,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    pub const fn linear(retry_count: u32, retry_delay: Duration) -> Self {
        Self {
            enabled: true,
            retry_count,
            retry_delay,
        }
    }

    /// Retries permitted after the first attempt.
    pub fn retries(&self) -> u32 {
        if self.enabled { self.retry_count } else { 0 }
    }

    pub fn max_attempts(&self) -> u32 {
        self.retries().saturating_add(1)
    }

    /// Delay inserted before `attempt` (1-based). Attempt 1 never waits.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        self.retry_delay.saturating_mul(attempt - 1)
    }
}

/// Overrides for one call. Unset fields fall back to the client's defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOptions {
    /// Decode the response body as JSON (default true). When false, a 2xx
    /// resolves to JSON `null` and error bodies are not read into the error.
    pub parse_json: bool,
    pub timeout: Option<Duration>,
    pub retry: Option<bool>,
    pub retry_count: Option<u32>,
    pub retry_delay: Option<Duration>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            parse_json: true,
            timeout: None,
            retry: None,
            retry_count: None,
            retry_delay: None,
        }
    }
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse_json(mut self, parse_json: bool) -> Self {
        self.parse_json = parse_json;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn retry(mut self, retry: bool) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = Some(retry_count);
        self
    }

    pub fn retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = Some(retry_delay);
        self
    }

    /// Replace the whole strategy for this call.
    pub fn strategy(mut self, strategy: RetryStrategy) -> Self {
        self.retry = Some(strategy.enabled);
        self.retry_count = Some(strategy.retry_count);
        self.retry_delay = Some(strategy.retry_delay);
        self
    }

    /// Shorthand for the simple contract: one attempt, no retry.
    pub fn no_retry() -> Self {
        Self::default().retry(false)
    }

    /// Overlay these options on `default`. A retry count given without an
    /// explicit toggle turns retry on.
    pub(crate) fn resolve_strategy(&self, default: RetryStrategy) -> RetryStrategy {
        let enabled = match (self.retry, self.retry_count) {
            (Some(retry), _) => retry,
            (None, Some(_)) => true,
            (None, None) => default.enabled,
        };
        RetryStrategy {
            enabled,
            retry_count: self.retry_count.unwrap_or(default.retry_count),
            retry_delay: self.retry_delay.unwrap_or(default.retry_delay),
        }
    }

    pub(crate) fn resolve_timeout(&self, default: Duration) -> Duration {
        self.timeout.unwrap_or(default)
    }
}
