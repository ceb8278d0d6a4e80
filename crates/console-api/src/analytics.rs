//! Recovery dashboard figures (`/v1/analytics`)

use api_client::ApiClient;
use serde::{Deserialize, Serialize};

use crate::error::Result;

const ANALYTICS_PATH: &str = "/v1/analytics";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevenueRecovered {
    pub total_recovered: f64,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryRate {
    /// Percentage, 0 to 100.
    pub recovery_rate: f64,
    pub total_attempts: u64,
    pub successful: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureCategory {
    pub category: String,
    pub count: u64,
}

/// Everything the dashboard shows, fetched together.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSummary {
    pub revenue: RevenueRecovered,
    pub rate: RecoveryRate,
    pub categories: Vec<FailureCategory>,
}

/// `days` narrows the window; the backend defaults to 30.
fn windowed(endpoint: &str, days: Option<u32>) -> String {
    match days {
        Some(days) => format!("{ANALYTICS_PATH}/{endpoint}?days={days}"),
        None => format!("{ANALYTICS_PATH}/{endpoint}"),
    }
}

pub async fn revenue_recovered(client: &ApiClient, days: Option<u32>) -> Result<RevenueRecovered> {
    Ok(client.get(&windowed("revenue_recovered", days)).await?)
}

pub async fn recovery_rate(client: &ApiClient, days: Option<u32>) -> Result<RecoveryRate> {
    Ok(client.get(&windowed("recovery_rate", days)).await?)
}

pub async fn failure_categories(client: &ApiClient) -> Result<Vec<FailureCategory>> {
    Ok(client
        .get(&format!("{ANALYTICS_PATH}/failure_categories"))
        .await?)
}

/// Fetch all three figures concurrently; the first failure wins.
pub async fn dashboard_summary(client: &ApiClient, days: Option<u32>) -> Result<DashboardSummary> {
    let (revenue, rate, categories) = tokio::try_join!(
        revenue_recovered(client, days),
        recovery_rate(client, days),
        failure_categories(client),
    )?;
    Ok(DashboardSummary {
        revenue,
        rate,
        categories,
    })
}
