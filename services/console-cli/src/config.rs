//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The bearer token for unattended use comes from the API_TOKEN env var,
//! never from the TOML, so it cannot leak through a committed config file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use api_client::{RetryStrategy, Url};
use common::Secret;
use serde::Deserialize;

const DEFAULT_CONFIG_PATH: &str = "recovery-console.toml";

/// Root configuration
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
    /// Fixed token from API_TOKEN; replaces the credential store when set.
    #[serde(skip)]
    pub api_token: Option<Secret<String>>,
}

/// Backend location and per-attempt timeout
#[derive(Debug, Deserialize)]
pub struct ApiConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_retry_enabled")]
    pub enabled: bool,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct CredentialsConfig {
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_retry_enabled() -> bool {
    true
}

fn default_retry_count() -> u32 {
    2
}

fn default_retry_delay_ms() -> u64 {
    1_000
}

fn default_store_path() -> PathBuf {
    PathBuf::from("recovery-console-credentials.json")
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: default_retry_enabled(),
            retry_count: default_retry_count(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
        }
    }
}

impl RetryConfig {
    pub fn strategy(&self) -> RetryStrategy {
        RetryStrategy {
            enabled: self.enabled,
            retry_count: self.retry_count,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Parsed base URL; `None` when unset.
    pub fn base_url(&self) -> common::Result<Option<Url>> {
        self.base_url
            .as_deref()
            .map(|raw| {
                Url::parse(raw)
                    .map_err(|e| common::Error::Config(format!("invalid base_url {raw:?}: {e}")))
            })
            .transpose()
    }
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// A missing file is only an error when `required` (the path was given
    /// explicitly); otherwise defaults plus env apply.
    pub fn load(path: &Path, required: bool) -> common::Result<Self> {
        let config = if path.exists() || required {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str(&contents)?
        } else {
            Config::default()
        };
        config.with_env()
    }

    /// Overlay API_URL / NEXT_PUBLIC_API_URL, CREDENTIALS_PATH and API_TOKEN,
    /// then validate.
    fn with_env(mut self) -> common::Result<Self> {
        if let Some(url) = env_non_empty("API_URL").or_else(|| env_non_empty("NEXT_PUBLIC_API_URL"))
        {
            self.api.base_url = Some(url);
        }
        if let Some(path) = env_non_empty("CREDENTIALS_PATH") {
            self.credentials.store_path = PathBuf::from(path);
        }
        if let Some(token) = env_non_empty("API_TOKEN") {
            self.api_token = Some(Secret::new(token));
        }

        if let Some(url) = &self.api.base_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(common::Error::Config(format!(
                    "base_url must start with http:// or https://, got: {url}"
                )));
            }
        }
        self.api.base_url()?;

        if self.api.timeout_ms == 0 {
            return Err(common::Error::Config(
                "timeout_ms must be greater than 0".into(),
            ));
        }

        Ok(self)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    /// The flag reports whether the file must exist.
    pub fn resolve_path(cli_path: Option<&str>) -> (PathBuf, bool) {
        if let Some(p) = cli_path {
            return (PathBuf::from(p), true);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return (PathBuf::from(p), true);
        }
        (PathBuf::from(DEFAULT_CONFIG_PATH), false)
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}
