//! Command-line grammar and dispatch onto the console endpoints

use anyhow::Result;
use api_client::{ApiClient, TokenStore};
use clap::{Parser, Subcommand};
use console_api::auth::Registration;
use console_api::payments::CheckoutRequest;
use console_api::retry_policies::RetryPolicyInput;
use console_api::{analytics, auth, health, payments, recoveries, retry_policies};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

/// `recovery-console` arguments.
#[derive(Debug, Parser)]
#[command(
    name = "recovery-console",
    about = "Drive the payment-recovery backend and print JSON results",
    version
)]
pub struct Cli {
    /// Config file. Falls back to `CONFIG_PATH`, then `recovery-console.toml`.
    #[arg(long, value_name = "path", global = true)]
    pub config: Option<String>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Backend liveness (`/healthz`)
    Health,
    /// Backend readiness (`/readyz`)
    Ready,
    /// Retry policies of the signed-in organization
    Policies {
        #[command(subcommand)]
        action: PolicyCommand,
    },
    /// Sign in with email and password
    Login { email: String, password: String },
    /// Create an account (and organization) from a JSON object
    Register {
        #[arg(value_name = "json", value_parser = parse_json::<Registration>)]
        registration: Registration,
    },
    /// Passwordless sign-in with an emailed code
    Otp {
        #[command(subcommand)]
        action: OtpCommand,
    },
    /// Profile of the signed-in user
    Me,
    /// Clear the local session and revoke it on the backend
    Logout,
    /// Customer recovery links
    Recovery {
        #[command(subcommand)]
        action: RecoveryCommand,
    },
    /// Start a payment for a failed transaction
    Checkout {
        #[command(subcommand)]
        action: CheckoutCommand,
    },
    /// Dashboard figures
    Analytics {
        /// Only count the last N days.
        #[arg(long, value_name = "n")]
        days: Option<u32>,
    },
}

#[derive(Debug, Subcommand)]
pub enum PolicyCommand {
    List,
    Active,
    /// Create a policy from a JSON object
    Create {
        #[arg(value_name = "json", value_parser = parse_json::<RetryPolicyInput>)]
        policy: RetryPolicyInput,
    },
    Delete { id: u64 },
}

#[derive(Debug, Subcommand)]
pub enum OtpCommand {
    Send { email: String },
    Verify { email: String, code: String },
}

#[derive(Debug, Subcommand)]
pub enum RecoveryCommand {
    /// Look up the transaction behind a link
    Show { token: String },
    /// Mark a link as opened
    Open { token: String },
    /// Set when the next retry of an attempt runs
    Schedule {
        token: String,
        attempt_id: u64,
        /// RFC 3339 timestamp
        at: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum CheckoutCommand {
    Stripe {
        #[arg(value_name = "ref")]
        reference: String,
        success_url: String,
        cancel_url: String,
    },
    Razorpay {
        #[arg(value_name = "ref")]
        reference: String,
    },
}

fn parse_json<T: DeserializeOwned>(raw: &str) -> std::result::Result<T, String> {
    serde_json::from_str(raw).map_err(|e| format!("expected a JSON object: {e}"))
}

/// Run `command` and return the JSON to print.
pub async fn execute(command: Command, client: &ApiClient, store: &TokenStore) -> Result<Value> {
    let value = match command {
        Command::Health => serde_json::to_value(health::health_check(client).await?)?,
        Command::Ready => serde_json::to_value(health::readiness_check(client).await?)?,
        Command::Policies { action } => match action {
            PolicyCommand::List => {
                serde_json::to_value(retry_policies::list_policies(client).await?)?
            }
            PolicyCommand::Active => {
                serde_json::to_value(retry_policies::get_active_policy(client).await?)?
            }
            PolicyCommand::Create { policy } => {
                serde_json::to_value(retry_policies::create_policy(client, &policy).await?)?
            }
            PolicyCommand::Delete { id } => {
                retry_policies::delete_policy(client, id).await?;
                json!({ "deleted": id })
            }
        },
        Command::Login { email, password } => {
            serde_json::to_value(auth::login(client, store, &email, &password).await?)?
        }
        Command::Register { registration } => {
            serde_json::to_value(auth::register(client, store, &registration).await?)?
        }
        Command::Otp { action } => match action {
            OtpCommand::Send { email } => {
                serde_json::to_value(auth::request_otp(client, &email).await?)?
            }
            OtpCommand::Verify { email, code } => {
                serde_json::to_value(auth::verify_otp(client, store, &email, &code).await?)?
            }
        },
        Command::Me => serde_json::to_value(auth::me(client).await?)?,
        Command::Logout => {
            auth::logout(client, store).await?;
            json!({ "logged_out": true })
        }
        Command::Recovery { action } => match action {
            RecoveryCommand::Show { token } => {
                serde_json::to_value(recoveries::recovery_by_token(client, &token).await?)?
            }
            RecoveryCommand::Open { token } => {
                serde_json::to_value(recoveries::open_recovery(client, &token).await?)?
            }
            RecoveryCommand::Schedule {
                token,
                attempt_id,
                at,
            } => {
                recoveries::next_retry_at(client, &token, attempt_id, &at).await?;
                json!({ "attempt_id": attempt_id, "next_retry_at": at })
            }
        },
        Command::Checkout { action } => match action {
            CheckoutCommand::Stripe {
                reference,
                success_url,
                cancel_url,
            } => {
                let request = CheckoutRequest {
                    transaction_ref: reference,
                    success_url,
                    cancel_url,
                };
                serde_json::to_value(payments::create_stripe_checkout(client, &request).await?)?
            }
            CheckoutCommand::Razorpay { reference } => {
                serde_json::to_value(payments::create_razorpay_order(client, &reference).await?)?
            }
        },
        Command::Analytics { days } => {
            serde_json::to_value(analytics::dashboard_summary(client, days).await?)?
        }
    };
    Ok(value)
}
