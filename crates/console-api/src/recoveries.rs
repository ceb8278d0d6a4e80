//! Customer-facing recovery links (`/v1/recoveries`)
//!
//! A recovery link carries an opaque token. Looking it up yields the failed
//! transaction it recovers; an expired or used link comes back as
//! `ok: false` rather than an HTTP error.

use std::sync::Arc;

use api_client::{ApiClient, ApiRequest, RequestOptions, StaticToken};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::envelope::Envelope;
use crate::error::{Error, Result};

const RECOVERIES_PATH: &str = "/v1/recoveries";

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RecoveryLink {
    #[serde(default)]
    pub transaction_ref: Option<String>,
    #[serde(default)]
    pub attempt_id: Option<u64>,
    #[serde(default)]
    pub status: Option<String>,
}

pub type RecoveryLookup = Envelope<RecoveryLink>;

impl Envelope<RecoveryLink> {
    /// The transaction being recovered, when the link is live.
    pub fn transaction_ref(&self) -> Option<&str> {
        if !self.ok {
            return None;
        }
        self.data.as_ref()?.transaction_ref.as_deref()
    }
}

fn token_path(token: &str) -> Result<String> {
    if token.trim().is_empty() {
        return Err(Error::Validation("recovery token must not be empty".into()));
    }
    Ok(format!(
        "{RECOVERIES_PATH}/by_token/{}",
        urlencoding::encode(token)
    ))
}

pub async fn recovery_by_token(client: &ApiClient, token: &str) -> Result<RecoveryLookup> {
    let lookup: RecoveryLookup = client.get(&token_path(token)?).await?;
    debug!(ok = lookup.ok, "looked up recovery link");
    Ok(lookup)
}

/// Mark the link as opened by the customer.
pub async fn open_recovery(client: &ApiClient, token: &str) -> Result<RecoveryLookup> {
    let path = format!("{}/open", token_path(token)?);
    let lookup: RecoveryLookup = client.post(&path, &json!({})).await?;
    info!(ok = lookup.ok, "opened recovery link");
    Ok(lookup)
}

/// Reschedule the next automatic retry of `attempt_id` to `at` (ISO-8601).
/// The recovery token authorizes the change, not the console session.
pub async fn next_retry_at(
    client: &ApiClient,
    recovery_token: &str,
    attempt_id: u64,
    at: &str,
) -> Result<()> {
    if at.trim().is_empty() {
        return Err(Error::Validation("next_retry_at must not be empty".into()));
    }
    if recovery_token.trim().is_empty() {
        return Err(Error::Validation("recovery token must not be empty".into()));
    }

    let request = ApiRequest::patch(format!("{RECOVERIES_PATH}/{attempt_id}/next_retry_at"))
        .json(&json!({ "next_retry_at": at }))?
        .options(RequestOptions::new().parse_json(false));
    client
        .with_token_source(Arc::new(StaticToken::new(recovery_token)))
        .send::<()>(request)
        .await?;

    info!(attempt_id, next_retry_at = at, "rescheduled retry");
    Ok(())
}
