//! Bearer-token sources for outbound requests
//!
//! The client never reaches into ambient storage itself. A `TokenSource` is
//! injected at construction and queried before every attempt:
//!
//! - `Anonymous` never yields a token
//! - `StaticToken` yields a fixed token (service accounts, `API_TOKEN`)
//! - `TokenStore` is the console's persistent client storage: an
//!   `auth_token` entry mirrored into a session cookie
//!
//! The store is written only by the auth flows (login, signup, OTP verify,
//! logout). A request that races a concurrent login/logout may read either
//! the old or the new token.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use common::Secret;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::StoreError;

/// Storage key holding the bearer token.
pub const AUTH_TOKEN_KEY: &str = "auth_token";

/// Storage key holding the cached user profile JSON.
pub const USER_DATA_KEY: &str = "user_data";

/// Cookie the token is mirrored into at login.
pub const SESSION_COOKIE: &str = "authjs.session-token";

/// Session cookies consulted when storage holds no token, in lookup order.
pub const SESSION_COOKIES: &[&str] = &[
    SESSION_COOKIE,
    "__Secure-authjs.session-token",
    "next-auth.session-token",
    "__Secure-next-auth.session-token",
];

type TokenFuture<'a> = Pin<Box<dyn Future<Output = Option<Secret<String>>> + Send + 'a>>;

/// Supplies the bearer token for a request, if any.
///
/// Uses `Pin<Box<dyn Future>>` so the client can hold `Arc<dyn TokenSource>`.
pub trait TokenSource: Send + Sync {
    fn bearer_token(&self) -> TokenFuture<'_>;
}

/// Token source for unauthenticated callers.
#[derive(Debug, Default, Clone, Copy)]
pub struct Anonymous;

impl TokenSource for Anonymous {
    fn bearer_token(&self) -> TokenFuture<'_> {
        Box::pin(async { None })
    }
}

/// Fixed bearer token.
#[derive(Debug, Clone)]
pub struct StaticToken(Secret<String>);

impl StaticToken {
    pub fn new(token: impl Into<Secret<String>>) -> Self {
        Self(token.into())
    }
}

impl TokenSource for StaticToken {
    fn bearer_token(&self) -> TokenFuture<'_> {
        let token = self.0.clone();
        Box::pin(async move { Some(token) })
    }
}

/// On-disk layout: a key/value storage area plus a cookie jar.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct StoredState {
    #[serde(default)]
    storage: BTreeMap<String, String>,
    #[serde(default)]
    cookies: BTreeMap<String, String>,
}

impl StoredState {
    fn put_token(&mut self, token: &str) {
        self.storage
            .insert(AUTH_TOKEN_KEY.to_owned(), token.to_owned());
        self.cookies.insert(
            SESSION_COOKIE.to_owned(),
            urlencoding::encode(token).into_owned(),
        );
    }

    fn token(&self) -> Option<String> {
        if let Some(token) = self.storage.get(AUTH_TOKEN_KEY).filter(|t| !t.is_empty()) {
            return Some(token.clone());
        }
        SESSION_COOKIES.iter().find_map(|name| {
            let raw = self.cookies.get(*name).filter(|v| !v.is_empty())?;
            Some(
                urlencoding::decode(raw)
                    .map(|decoded| decoded.into_owned())
                    .unwrap_or_else(|_| raw.clone()),
            )
        })
    }
}

/// File-backed client storage for the console's bearer token.
///
/// A tokio Mutex serializes writes; reads hold the lock only long enough to
/// look up the token.
pub struct TokenStore {
    path: PathBuf,
    state: Mutex<StoredState>,
}

impl TokenStore {
    /// Load the store from `path`, creating an empty file on first use.
    pub async fn load(path: PathBuf) -> Result<Self, StoreError> {
        let state = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| StoreError::Io(format!("reading credential file: {e}")))?;
            let state: StoredState = if contents.trim().is_empty() {
                StoredState::default()
            } else {
                serde_json::from_str(&contents)
                    .map_err(|e| StoreError::Parse(format!("parsing credential file: {e}")))?
            };
            info!(path = %path.display(), has_token = state.token().is_some(), "loaded credential store");
            state
        } else {
            info!(path = %path.display(), "credential file not found, starting signed out");
            let state = StoredState::default();
            write_atomic(&path, &state).await?;
            state
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current bearer token: storage first, then the session cookies.
    pub async fn token(&self) -> Option<Secret<String>> {
        let state = self.state.lock().await;
        state.token().map(Secret::new)
    }

    /// Persist a freshly issued token and mirror it into the session cookie.
    pub async fn set_token(&self, token: &str) -> Result<(), StoreError> {
        self.update(|state| state.put_token(token)).await?;
        debug!("stored bearer token");
        Ok(())
    }

    /// Persist a token together with the cached user profile in one write.
    pub async fn set_session(&self, token: &str, user_data: String) -> Result<(), StoreError> {
        self.update(|state| {
            state.put_token(token);
            state.storage.insert(USER_DATA_KEY.to_owned(), user_data);
        })
        .await?;
        debug!("stored session");
        Ok(())
    }

    pub async fn get_item(&self, key: &str) -> Option<String> {
        let state = self.state.lock().await;
        state.storage.get(key).cloned()
    }

    pub async fn set_item(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.update(|state| {
            state.storage.insert(key.to_owned(), value);
        })
        .await
    }

    /// Forget the token, cached user data and every session cookie.
    pub async fn clear(&self) -> Result<(), StoreError> {
        self.update(|state| {
            state.storage.remove(AUTH_TOKEN_KEY);
            state.storage.remove(USER_DATA_KEY);
            for name in SESSION_COOKIES {
                state.cookies.remove(*name);
            }
        })
        .await?;
        debug!("cleared stored credentials");
        Ok(())
    }

    /// Apply `change` to a copy, persist it, and only then make it visible.
    /// A failed write leaves the in-memory state untouched.
    async fn update(&self, change: impl FnOnce(&mut StoredState)) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let mut next = state.clone();
        change(&mut next);
        write_atomic(&self.path, &next).await?;
        *state = next;
        Ok(())
    }
}

impl TokenSource for TokenStore {
    fn bearer_token(&self) -> TokenFuture<'_> {
        Box::pin(self.token())
    }
}

/// Write the store atomically (temp file + rename) with 0600 permissions.
async fn write_atomic(path: &Path, state: &StoredState) -> Result<(), StoreError> {
    let json = serde_json::to_string_pretty(state)
        .map_err(|e| StoreError::Parse(format!("serializing credentials: {e}")))?;

    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| StoreError::Io(format!("creating credential directory: {e}")))?;

    let tmp_path = dir.join(format!(".credentials.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| StoreError::Io(format!("writing temp credential file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| StoreError::Io(format!("setting credential file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| StoreError::Io(format!("renaming temp credential file: {e}")))?;

    debug!(path = %path.display(), "persisted credentials");
    Ok(())
}
