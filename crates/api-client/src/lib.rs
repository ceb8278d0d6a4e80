//! HTTP client for the recovery backend
//!
//! `ApiClient` wraps reqwest with the backend's calling conventions: JSON
//! bodies, a bearer token injected from a pluggable `TokenSource`, a
//! per-attempt timeout, linear-backoff retries for 5xx/429/transport
//! failures, and a single typed `ApiError` for every failure mode.
//!
//! ```no_run
//! # async fn run() -> api_client::Result<()> {
//! use api_client::{ApiClient, RetryStrategy};
//! use std::time::Duration;
//!
//! let client = ApiClient::builder()
//!     .base_url("https://api.example.com".parse().expect("valid url"))
//!     .retry(RetryStrategy::linear(2, Duration::from_secs(1)))
//!     .build()?;
//! let policies: Vec<serde_json::Value> = client.get("/v1/retry/policies").await?;
//! # let _ = policies;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod credentials;
pub mod error;
pub mod metrics;
pub mod options;
pub mod request;
pub mod url;

pub use client::{ApiClient, ApiClientBuilder, REQUEST_ID_HEADER};
pub use credentials::{Anonymous, StaticToken, TokenSource, TokenStore};
pub use error::{ApiError, ErrorCategory, Result, StoreError};
pub use options::{RequestOptions, RetryStrategy};
pub use request::ApiRequest;
pub use url::resolve_url;

pub use reqwest::{Method, StatusCode, Url, header};
