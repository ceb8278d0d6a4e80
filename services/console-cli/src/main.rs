//! Recovery Console CLI
//!
//! Drives the payment-recovery backend from a terminal or CI job:
//! 1. Loads TOML config, overlaid by env
//! 2. Opens the local credential store (or uses API_TOKEN)
//! 3. Runs one command and prints its JSON result on stdout

mod commands;
mod config;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use api_client::{ApiClient, StaticToken, TokenSource, TokenStore};
use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::commands::Cli;
use crate::config::Config;

#[tokio::main]
async fn main() -> ExitCode {
    // JSON logs on stderr so stdout stays machine-readable
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", describe_error(&e));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let (config_path, required) = Config::resolve_path(cli.config.as_deref());
    debug!(path = %config_path.display(), required, "loading configuration");
    let config = Config::load(&config_path, required)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    let store = TokenStore::load(config.credentials.store_path.clone())
        .await
        .with_context(|| {
            format!(
                "failed to open credential store {}",
                config.credentials.store_path.display()
            )
        })?;
    let store = Arc::new(store);
    let client = build_client(&config, store.clone())?;

    info!(
        base_url = config.api.base_url.as_deref().unwrap_or("<unset>"),
        timeout_ms = config.api.timeout_ms,
        retries = config.retry.strategy().retries(),
        static_token = config.api_token.is_some(),
        "configuration loaded"
    );

    let output = commands::execute(cli.command, &client, &store).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn build_client(config: &Config, store: Arc<TokenStore>) -> Result<ApiClient> {
    let tokens: Arc<dyn TokenSource> = match &config.api_token {
        Some(token) => Arc::new(StaticToken::new(token.clone())),
        None => store,
    };
    let mut builder = ApiClient::builder()
        .token_source(tokens)
        .retry(config.retry.strategy())
        .timeout(config.api.timeout());
    if let Some(base_url) = config.api.base_url()? {
        builder = builder.base_url(base_url);
    }
    Ok(builder.build()?)
}

/// One stderr line: category, status and backend detail for API failures,
/// the context chain for everything else.
fn describe_error(e: &anyhow::Error) -> String {
    match e
        .downcast_ref::<console_api::Error>()
        .and_then(console_api::Error::api)
    {
        Some(api) => format!(
            "error: {} (status {}): {}",
            api.category,
            api.status,
            api.detail()
        ),
        None => format!("error: {e:#}"),
    }
}
