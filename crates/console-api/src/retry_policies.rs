//! Retry policy management (`/v1/retry/policies`)

use api_client::{ApiClient, RequestOptions};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};

const POLICIES_PATH: &str = "/v1/retry/policies";

/// Upper bound the backend accepts for `max_retries`.
pub const MAX_RETRIES_LIMIT: u32 = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub id: u64,
    pub org_id: u64,
    pub name: String,
    pub max_retries: u32,
    pub initial_delay_minutes: u32,
    pub backoff_multiplier: f64,
    pub max_delay_minutes: u32,
    #[serde(default)]
    pub enabled_channels: Vec<String>,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Body for creating a policy. `enabled_channels` defaults server-side to
/// `["email"]` when omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicyInput {
    pub name: String,
    pub max_retries: u32,
    pub initial_delay_minutes: u32,
    pub backoff_multiplier: f64,
    pub max_delay_minutes: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled_channels: Option<Vec<String>>,
}

impl RetryPolicyInput {
    /// Check the constraints the backend enforces before spending a request.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Validation("policy name must not be empty".into()));
        }
        if !(1..=MAX_RETRIES_LIMIT).contains(&self.max_retries) {
            return Err(Error::Validation(format!(
                "max_retries must be between 1 and {MAX_RETRIES_LIMIT}, got {}",
                self.max_retries
            )));
        }
        if self.backoff_multiplier.is_nan() || self.backoff_multiplier < 1.0 {
            return Err(Error::Validation(format!(
                "backoff_multiplier must be at least 1, got {}",
                self.backoff_multiplier
            )));
        }
        if self.max_delay_minutes < self.initial_delay_minutes {
            return Err(Error::Validation(format!(
                "max_delay_minutes ({}) must not be less than initial_delay_minutes ({})",
                self.max_delay_minutes, self.initial_delay_minutes
            )));
        }
        Ok(())
    }
}

pub async fn list_policies(client: &ApiClient) -> Result<Vec<RetryPolicy>> {
    Ok(client.get(POLICIES_PATH).await?)
}

/// The organization's active policy, or `None` when none is active.
pub async fn get_active_policy(client: &ApiClient) -> Result<Option<RetryPolicy>> {
    Ok(client.get(&format!("{POLICIES_PATH}/active")).await?)
}

pub async fn create_policy(client: &ApiClient, input: &RetryPolicyInput) -> Result<RetryPolicy> {
    input.validate()?;
    let policy: RetryPolicy = client.post(POLICIES_PATH, input).await?;
    info!(policy_id = policy.id, name = %policy.name, "created retry policy");
    Ok(policy)
}

pub async fn delete_policy(client: &ApiClient, id: u64) -> Result<()> {
    client
        .delete_with::<()>(
            &format!("{POLICIES_PATH}/{id}"),
            RequestOptions::new().parse_json(false),
        )
        .await?;
    info!(policy_id = id, "deleted retry policy");
    Ok(())
}
