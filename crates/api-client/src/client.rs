//! The API client: one attempt/retry loop behind every HTTP verb
//!
//! Each call resolves its URL once, then runs up to `1 + retry_count`
//! attempts. Every attempt re-reads the bearer token, is raced against the
//! call's timeout, and is classified:
//!
//! - 2xx: decode and return
//! - 4xx except 429: terminal `CLIENT_ERROR`, no retry
//! - timeout: terminal `TIMEOUT` (408), no retry
//! - 5xx / 429 / transport failure: retry after `retry_delay * n`
//!
//! When a retrying strategy runs out of attempts the call fails with
//! `RETRY_EXHAUSTED` (503). With `RetryStrategy::none()` the single failure
//! is returned as-is.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{StatusCode, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{Span, debug, instrument, warn};

use crate::credentials::{Anonymous, StaticToken, TokenSource};
use crate::error::{ApiError, Result};
use crate::metrics;
use crate::options::{DEFAULT_TIMEOUT, RequestOptions, RetryStrategy, millis};
use crate::request::ApiRequest;
use crate::url::resolve_url;

/// Correlation header sent on every attempt of a call.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Backend API client.
///
/// Cheap to clone: the connection pool and token source are shared.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Option<Url>,
    tokens: Arc<dyn TokenSource>,
    retry: RetryStrategy,
    timeout: Duration,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url.as_ref().map(Url::as_str))
            .field("retry", &self.retry)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Builder for `ApiClient`. Defaults: no base URL, anonymous, two linear
/// retries one second apart (`RetryStrategy::default()`), 30s timeout,
/// cookie store enabled. Pass `RetryStrategy::none()` for a single attempt.
pub struct ApiClientBuilder {
    http: Option<reqwest::Client>,
    base_url: Option<Url>,
    tokens: Arc<dyn TokenSource>,
    retry: RetryStrategy,
    timeout: Duration,
}

impl Default for ApiClientBuilder {
    fn default() -> Self {
        Self {
            http: None,
            base_url: None,
            tokens: Arc::new(Anonymous),
            retry: RetryStrategy::default(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ApiClientBuilder {
    /// Origin that relative request paths are joined onto.
    pub fn base_url(mut self, base_url: Url) -> Self {
        self.base_url = Some(base_url);
        self
    }

    pub fn token_source(mut self, tokens: Arc<dyn TokenSource>) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn bearer_token(self, token: impl Into<common::Secret<String>>) -> Self {
        self.token_source(Arc::new(StaticToken::new(token)))
    }

    /// Default strategy for calls that don't override it.
    pub fn retry(mut self, retry: RetryStrategy) -> Self {
        self.retry = retry;
        self
    }

    /// Default per-attempt timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Use a preconfigured reqwest client instead of the default one.
    pub fn http_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    pub fn build(self) -> Result<ApiClient> {
        let http = match self.http {
            Some(http) => http,
            None => reqwest::Client::builder()
                .cookie_store(true)
                .build()
                .map_err(|e| ApiError::unknown(format!("failed to build HTTP client: {e}")))?,
        };

        if self.base_url.is_none() {
            warn!("API base URL is not set; relative paths will not resolve");
        }

        Ok(ApiClient {
            http,
            base_url: self.base_url,
            tokens: self.tokens,
            retry: self.retry,
            timeout: self.timeout,
        })
    }
}

impl ApiClient {
    pub fn builder() -> ApiClientBuilder {
        ApiClientBuilder::default()
    }

    /// A client sharing this one's pool and defaults but authenticating with
    /// `tokens`.
    pub fn with_token_source(&self, tokens: Arc<dyn TokenSource>) -> Self {
        Self {
            tokens,
            ..self.clone()
        }
    }

    pub fn base_url(&self) -> Option<&Url> {
        self.base_url.as_ref()
    }

    pub fn retry_strategy(&self) -> RetryStrategy {
        self.retry
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send(ApiRequest::get(path)).await
    }

    pub async fn get_with<T: DeserializeOwned>(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> Result<T> {
        self.send(ApiRequest::get(path).options(options)).await
    }

    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(ApiRequest::post(path).json(body)?).await
    }

    pub async fn post_with<B, T>(&self, path: &str, body: &B, options: RequestOptions) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(ApiRequest::post(path).json(body)?.options(options))
            .await
    }

    pub async fn put<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(ApiRequest::put(path).json(body)?).await
    }

    pub async fn put_with<B, T>(&self, path: &str, body: &B, options: RequestOptions) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(ApiRequest::put(path).json(body)?.options(options))
            .await
    }

    pub async fn patch<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(ApiRequest::patch(path).json(body)?).await
    }

    pub async fn patch_with<B, T>(
        &self,
        path: &str,
        body: &B,
        options: RequestOptions,
    ) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(ApiRequest::patch(path).json(body)?.options(options))
            .await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send(ApiRequest::delete(path)).await
    }

    pub async fn delete_with<T: DeserializeOwned>(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> Result<T> {
        self.send(ApiRequest::delete(path).options(options)).await
    }

    /// Issue `request` and decode a successful body into `T`.
    ///
    /// `T` is the expected shape of the body; a 2xx whose body does not
    /// match is rejected as `UNKNOWN_ERROR` instead of being trusted.
    /// Bodiless successes (204, `parse_json = false`, empty body) decode from
    /// `null`, so use `()`, `Option<_>` or `Value` for them.
    #[instrument(skip_all, fields(method = %request.method, path = %request.path, request_id = tracing::field::Empty))]
    pub async fn send<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T> {
        let request_id = format!("req_{}", uuid::Uuid::new_v4().as_simple());
        Span::current().record("request_id", request_id.as_str());

        let started = Instant::now();
        let result = match self.execute(&request, &request_id).await {
            Ok(value) => decode(value),
            Err(e) => Err(e),
        };

        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => e.category.as_str(),
        };
        metrics::record_request(
            request.method.as_str(),
            outcome,
            started.elapsed().as_secs_f64(),
        );
        result
    }

    async fn execute(&self, request: &ApiRequest, request_id: &str) -> Result<Value> {
        let url = resolve_url(self.base_url.as_ref(), &request.path)?;
        let strategy = request.options.resolve_strategy(self.retry);
        let timeout = request.options.resolve_timeout(self.timeout);
        let max_attempts = strategy.max_attempts();

        let mut last_error: Option<ApiError> = None;

        for attempt in 1..=max_attempts {
            if let Some(previous) = &last_error {
                let delay = strategy.delay_before(attempt);
                warn!(
                    attempt,
                    max_attempts,
                    delay_ms = millis(delay),
                    status = previous.status,
                    category = %previous.category,
                    "retrying request"
                );
                metrics::record_retry(request.method.as_str());
                tokio::time::sleep(delay).await;
            }

            match self.attempt(request, &url, timeout, request_id).await {
                Ok(value) => {
                    debug!(attempt, "request succeeded");
                    return Ok(value);
                }
                Err(e) if e.is_retryable() => {
                    debug!(attempt, status = e.status, error = %e, "attempt failed");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        let last = last_error.unwrap_or_else(|| ApiError::unknown("request was never attempted"));
        if strategy.retries() > 0 {
            warn!(
                attempts = max_attempts,
                last_status = last.status,
                "retries exhausted"
            );
            Err(ApiError::retry_exhausted(max_attempts, &last))
        } else {
            Err(last)
        }
    }

    async fn attempt(
        &self,
        request: &ApiRequest,
        url: &Url,
        timeout: Duration,
        request_id: &str,
    ) -> Result<Value> {
        let headers = self.attempt_headers(request, request_id).await;
        let mut builder = self
            .http
            .request(request.method.clone(), url.clone())
            .headers(headers);
        if let Some(body) = &request.body {
            builder = builder.body(body.to_string());
        }

        let exchange = async move {
            let response = builder.send().await?;
            let status = response.status();
            let bytes = response.bytes().await?;
            Ok::<_, reqwest::Error>((status, bytes))
        };

        let (status, bytes) = match tokio::time::timeout(timeout, exchange).await {
            Err(_) => {
                warn!(timeout_ms = millis(timeout), "request timed out");
                return Err(ApiError::timeout(timeout));
            }
            Ok(Err(e)) if e.is_timeout() => return Err(ApiError::timeout(timeout)),
            Ok(Err(e)) if e.is_builder() => {
                return Err(ApiError::unknown(format!("failed to build request: {e}")));
            }
            Ok(Err(e)) => return Err(ApiError::network(e)),
            Ok(Ok(exchanged)) => exchanged,
        };

        let parse_json = request.options.parse_json;

        if status.is_success() {
            if !parse_json
                || status == StatusCode::NO_CONTENT
                || bytes.iter().all(u8::is_ascii_whitespace)
            {
                return Ok(Value::Null);
            }
            return serde_json::from_slice(&bytes).map_err(|e| {
                ApiError::invalid_body(
                    e,
                    Some(Value::String(String::from_utf8_lossy(&bytes).into_owned())),
                )
            });
        }

        let body = parse_json.then(|| error_body(&bytes));
        Err(ApiError::from_status(status, body))
    }

    /// Headers for one attempt: JSON content type, caller overrides, request
    /// id, then the bearer token (looked up fresh every attempt).
    async fn attempt_headers(&self, request: &ApiRequest, request_id: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        for (name, value) in &request.headers {
            headers.insert(name.clone(), value.clone());
        }
        if let Ok(value) = HeaderValue::from_str(request_id) {
            headers.insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
        }

        if let Some(token) = self.tokens.bearer_token().await {
            match HeaderValue::from_str(&format!("Bearer {}", token.expose())) {
                Ok(mut value) => {
                    value.set_sensitive(true);
                    headers.insert(AUTHORIZATION, value);
                }
                Err(_) => {
                    warn!("stored bearer token is not a valid header value; sending unauthenticated");
                }
            }
        }

        headers
    }
}

/// Error body: JSON when it parses, otherwise the raw text as a JSON string.
fn error_body(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T> {
    match T::deserialize(&value) {
        Ok(decoded) => Ok(decoded),
        Err(e) => Err(ApiError::invalid_body(e, Some(value))),
    }
}
