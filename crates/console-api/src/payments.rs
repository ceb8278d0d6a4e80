//! Hosted checkout for recovered payments (Stripe, Razorpay)

use api_client::ApiClient;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::envelope::Envelope;
use crate::error::{Error, Result};

/// Longest transaction reference the Razorpay order endpoint accepts.
pub const MAX_REF_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub transaction_ref: String,
    pub success_url: String,
    pub cancel_url: String,
}

/// Where to send the customer to pay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub url: String,
}

#[derive(Debug, Deserialize)]
struct CheckoutData {
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RazorpayOrder {
    pub order_id: String,
    pub key_id: String,
    /// Minor units (paise, cents).
    pub amount: u64,
    pub currency: String,
}

pub async fn create_stripe_checkout(
    client: &ApiClient,
    request: &CheckoutRequest,
) -> Result<CheckoutSession> {
    if request.transaction_ref.trim().is_empty() {
        return Err(Error::Validation("transaction_ref must not be empty".into()));
    }
    let envelope: Envelope<CheckoutData> = client
        .post("/v1/payments/stripe/checkout", request)
        .await?;
    let url = envelope
        .into_data("stripe checkout")?
        .url
        .filter(|url| !url.is_empty())
        .ok_or_else(|| Error::Validation("No checkout URL returned".into()))?;

    info!(transaction_ref = %request.transaction_ref, "created stripe checkout session");
    Ok(CheckoutSession { url })
}

/// Create (or fetch the existing) Razorpay order for a transaction.
/// Idempotent on the backend: repeated calls return the same order.
pub async fn create_razorpay_order(client: &ApiClient, reference: &str) -> Result<RazorpayOrder> {
    let len = reference.chars().count();
    if len == 0 || len > MAX_REF_LEN {
        return Err(Error::Validation(format!(
            "transaction ref must be 1 to {MAX_REF_LEN} characters, got {len}"
        )));
    }
    let order: RazorpayOrder = client
        .post(
            "/v1/payments/razorpay/orders-public",
            &json!({ "ref": reference }),
        )
        .await?;
    info!(order_id = %order.order_id, "created razorpay order");
    Ok(order)
}
