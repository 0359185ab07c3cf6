//! Shared Google OAuth plumbing for the YouTube and Calendar providers
//!
//! Both platforms authenticate against the same Google OAuth app; only the
//! requested scopes differ.

use reqwest::Client;
use serde::Deserialize;
use url::Url;

use crate::config::OAuthAppConfig;
use crate::error::{ProviderError, Result};
use crate::providers::http;
use crate::types::TokenSet;

pub const AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

#[derive(Debug, Deserialize)]
pub struct GoogleTokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
}

impl GoogleTokenResponse {
    pub fn into_token_set(self, now: i64) -> TokenSet {
        TokenSet {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: self.expires_in.map(|secs| now + secs),
            account_id: None,
            account_username: None,
        }
    }
}

/// Build the Google consent URL.
///
/// access_type=offline plus prompt=consent is what makes Google return a
/// refresh token on every authorization, not just the first.
pub fn authorize_url(config: &OAuthAppConfig, scope: &str, state: &str) -> Result<Url> {
    Url::parse_with_params(
        AUTHORIZE_URL,
        &[
            ("client_id", config.client_id.as_str()),
            ("redirect_uri", config.redirect_uri.as_str()),
            ("response_type", "code"),
            ("scope", scope),
            ("state", state),
            ("access_type", "offline"),
            ("prompt", "consent"),
        ],
    )
    .map_err(|e| ProviderError::OAuth(format!("Failed to build authorize URL: {}", e)).into())
}

pub async fn exchange_code(
    client: &Client,
    config: &OAuthAppConfig,
    code: &str,
    label: &str,
) -> Result<GoogleTokenResponse> {
    token_request(
        client,
        &[
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.as_str()),
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", config.redirect_uri.as_str()),
        ],
        label,
        "token exchange",
    )
    .await
}

pub async fn refresh(
    client: &Client,
    config: &OAuthAppConfig,
    refresh_token: &str,
    label: &str,
) -> Result<GoogleTokenResponse> {
    token_request(
        client,
        &[
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.as_str()),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ],
        label,
        "token refresh",
    )
    .await
}

async fn token_request(
    client: &Client,
    params: &[(&str, &str)],
    label: &str,
    context: &str,
) -> Result<GoogleTokenResponse> {
    let response = client
        .post(TOKEN_URL)
        .form(params)
        .send()
        .await
        .map_err(|e| http::transport_error(label, context, e))?;

    if !response.status().is_success() {
        let status = response.status();
        let body = http::error_body(response).await;
        return Err(http::classify_token_status(label, context, status, &body).into());
    }

    response.json().await.map_err(|e| {
        ProviderError::OAuth(format!("{} {} returned unexpected body: {}", label, context, e))
            .into()
    })
}
