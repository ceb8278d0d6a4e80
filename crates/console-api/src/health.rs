//! Backend liveness and readiness probes

use api_client::{ApiClient, RequestOptions};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// `/healthz` body. Older deployments answer `{"ok": true}`, newer ones
/// `{"status": "ok", "version": "…"}`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Health {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ok: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl Health {
    pub fn is_healthy(&self) -> bool {
        self.ok.unwrap_or(false)
            || matches!(self.status.as_deref(), Some("ok" | "healthy"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Readiness {
    pub ready: bool,
}

/// Probes are single-shot: a failing backend should be reported, not waited on.
pub async fn health_check(client: &ApiClient) -> Result<Health> {
    Ok(client.get_with("/healthz", RequestOptions::no_retry()).await?)
}

pub async fn readiness_check(client: &ApiClient) -> Result<Readiness> {
    Ok(client.get_with("/readyz", RequestOptions::no_retry()).await?)
}
