//! Request URL resolution against the configured backend base

use reqwest::Url;
use tracing::warn;

use crate::error::{ApiError, Result};

/// Whether `path` already carries an `http://` or `https://` scheme.
pub fn is_absolute(path: &str) -> bool {
    let lower = path.get(..8).unwrap_or(path).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Resolve the URL a request is dispatched to.
///
/// Absolute http(s) paths ignore the base. Relative paths are joined onto
/// `base` with standard URL-join semantics (`/v1/x` replaces the base path,
/// `v1/x` appends to the base's last directory). Without a base the path is
/// dispatched as-is after a warning, which only succeeds if it parses as an
/// absolute URL on its own.
pub fn resolve_url(base: Option<&Url>, path: &str) -> Result<Url> {
    if is_absolute(path) {
        return Url::parse(path)
            .map_err(|e| ApiError::unknown(format!("invalid request url {path:?}: {e}")));
    }

    match base {
        Some(base) => base.join(path).map_err(|e| {
            ApiError::unknown(format!("failed to construct API URL from {path:?}: {e}"))
        }),
        None => {
            warn!(path, "no API base URL configured; dispatching relative path as-is");
            Url::parse(path).map_err(|e| {
                ApiError::unknown(format!(
                    "relative path {path:?} cannot be dispatched without a base URL: {e}"
                ))
            })
        }
    }
}
