//! Password and email-OTP sign-in (`/v1/auth`)
//!
//! Successful sign-ins persist the issued access token into the
//! `TokenStore`, which the `ApiClient` reads before each request.
//! `logout` clears the store before telling the backend.

use std::sync::Arc;

use api_client::{ApiClient, ApiRequest, RequestOptions, StaticToken, TokenStore};
use common::Secret;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::error::{Error, Result};

const AUTH_PATH: &str = "/v1/auth";

/// Minimum password length accepted at registration.
pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub email: String,
    #[serde(default)]
    pub full_name: Option<String>,
    pub role: String,
    pub is_active: bool,
    pub org_id: u64,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Organization {
    pub id: u64,
    pub name: String,
    pub slug: String,
    pub is_active: bool,
    pub created_at: String,
}

/// Password login / registration response. The token is never serialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    #[serde(skip_serializing)]
    pub access_token: Secret<String>,
    #[serde(default = "bearer")]
    pub token_type: String,
    pub user: User,
    pub organization: Organization,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OtpSent {
    pub message: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: u64,
    pub email: String,
}

/// OTP login response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    #[serde(skip_serializing)]
    pub access_token: Secret<String>,
    #[serde(default = "bearer")]
    pub token_type: String,
    pub user: UserInfo,
}

fn bearer() -> String {
    "bearer".to_owned()
}

/// New account plus (optionally) its organization.
#[derive(Clone, Serialize, Deserialize)]
pub struct Registration {
    pub email: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_slug: Option<String>,
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .field("full_name", &self.full_name)
            .field("org_name", &self.org_name)
            .field("org_slug", &self.org_slug)
            .finish()
    }
}

impl Registration {
    pub fn validate(&self) -> Result<()> {
        validate_email(&self.email)?;
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(Error::Validation(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        Ok(())
    }
}

fn validate_email(email: &str) -> Result<()> {
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(()),
        _ => Err(Error::Validation(format!("invalid email address: {email:?}"))),
    }
}

async fn persist_session<U: Serialize>(
    store: &TokenStore,
    token: &Secret<String>,
    user: &U,
) -> Result<()> {
    let user_data = serde_json::to_string(user)
        .map_err(|e| Error::Credential(format!("serializing user data: {e}")))?;
    store.set_session(token.expose(), user_data).await?;
    Ok(())
}

pub async fn login(
    client: &ApiClient,
    store: &TokenStore,
    email: &str,
    password: &str,
) -> Result<TokenResponse> {
    validate_email(email)?;
    let response: TokenResponse = client
        .post(
            &format!("{AUTH_PATH}/login"),
            &json!({ "email": email, "password": password }),
        )
        .await?;
    persist_session(store, &response.access_token, &response.user).await?;
    info!(user_id = response.user.id, org_id = response.user.org_id, "logged in");
    Ok(response)
}

pub async fn register(
    client: &ApiClient,
    store: &TokenStore,
    registration: &Registration,
) -> Result<TokenResponse> {
    registration.validate()?;
    let response: TokenResponse = client
        .post(&format!("{AUTH_PATH}/register"), registration)
        .await?;
    persist_session(store, &response.access_token, &response.user).await?;
    info!(
        user_id = response.user.id,
        organization = %response.organization.slug,
        "registered account"
    );
    Ok(response)
}

/// Ask the backend to email a one-time code to an existing user.
pub async fn request_otp(client: &ApiClient, email: &str) -> Result<OtpSent> {
    validate_email(email)?;
    Ok(client
        .post(
            &format!("{AUTH_PATH}/login/request-otp"),
            &json!({ "email": email }),
        )
        .await?)
}

pub async fn verify_otp(
    client: &ApiClient,
    store: &TokenStore,
    email: &str,
    code: &str,
) -> Result<LoginResponse> {
    validate_email(email)?;
    let code = code.trim();
    if code.is_empty() {
        return Err(Error::Validation("OTP code must not be empty".into()));
    }
    let response: LoginResponse = client
        .post(
            &format!("{AUTH_PATH}/login/verify-otp"),
            &json!({ "email": email, "otp_code": code }),
        )
        .await?;
    persist_session(store, &response.access_token, &response.user).await?;
    info!(user_id = response.user.id, "logged in with OTP");
    Ok(response)
}

pub async fn me(client: &ApiClient) -> Result<User> {
    Ok(client.get(&format!("{AUTH_PATH}/me")).await?)
}

/// Clear the local session, then tell the backend (best effort, single
/// attempt). Only a failure to clear the store is returned.
pub async fn logout(client: &ApiClient, store: &TokenStore) -> Result<()> {
    let token = store.token().await;
    store.clear().await?;
    info!("cleared local session");

    let Some(token) = token else {
        return Ok(());
    };

    // The store is already empty, so the captured token is sent explicitly.
    let request = ApiRequest::post(format!("{AUTH_PATH}/logout"))
        .options(RequestOptions::no_retry().parse_json(false));
    let client = client.with_token_source(Arc::new(StaticToken::new(token)));

    if let Err(e) = client.send::<()>(request).await {
        warn!(error = %e, "logout call failed, local session cleared anyway");
    }
    Ok(())
}
