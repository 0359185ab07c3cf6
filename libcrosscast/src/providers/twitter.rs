//! Twitter provider (X API v2, OAuth 2.0 with PKCE)

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::debug;
use url::Url;

use crate::config::OAuthAppConfig;
use crate::error::{ProviderError, Result};
use crate::providers::{http, Provider};
use crate::types::{Platform, ScheduledPost, TokenSet};

pub const CHARACTER_LIMIT: usize = 280;

const AUTHORIZE_URL: &str = "https://twitter.com/i/oauth2/authorize";
const TOKEN_URL: &str = "https://api.twitter.com/2/oauth2/token";
const USERS_ME_URL: &str = "https://api.twitter.com/2/users/me";
const TWEETS_URL: &str = "https://api.twitter.com/2/tweets";

/// offline.access is what makes Twitter hand out refresh tokens
const SCOPES: &str = "tweet.read tweet.write users.read offline.access";

pub struct TwitterProvider {
    config: OAuthAppConfig,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct TwitterTokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

impl TwitterTokenResponse {
    fn into_token_set(self, now: i64) -> TokenSet {
        TokenSet {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: self.expires_in.map(|secs| now + secs),
            account_id: None,
            account_username: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TwitterUserEnvelope {
    data: TwitterUser,
}

#[derive(Debug, Deserialize)]
struct TwitterUser {
    id: String,
    username: String,
}

#[derive(Debug, Deserialize)]
struct TweetEnvelope {
    data: TweetData,
}

#[derive(Debug, Deserialize)]
struct TweetData {
    id: String,
}

/// RFC 7636 S256: base64url(sha256(verifier)), no padding
fn pkce_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

impl TwitterProvider {
    pub fn new(config: &OAuthAppConfig) -> Result<Self> {
        Ok(Self {
            config: config.clone(),
            client: http::build_client()?,
        })
    }

    async fn token_request(&self, params: &[(&str, &str)], context: &str) -> Result<TokenSet> {
        let response = self
            .client
            .post(TOKEN_URL)
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(params)
            .send()
            .await
            .map_err(|e| http::transport_error("twitter", context, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = http::error_body(response).await;
            return Err(http::classify_token_status("twitter", context, status, &body).into());
        }

        let tokens: TwitterTokenResponse = response.json().await.map_err(|e| {
            ProviderError::OAuth(format!("twitter {} returned unexpected body: {}", context, e))
        })?;

        Ok(tokens.into_token_set(chrono::Utc::now().timestamp()))
    }

    async fn fetch_identity(&self, access_token: &str) -> Result<TwitterUser> {
        let response = self
            .client
            .get(USERS_ME_URL)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| http::transport_error("twitter", "fetch identity", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = http::error_body(response).await;
            return Err(http::classify_status("twitter", "fetch identity", status, &body).into());
        }

        let envelope: TwitterUserEnvelope = response.json().await.map_err(|e| {
            ProviderError::Network(format!("twitter identity response unreadable: {}", e))
        })?;

        Ok(envelope.data)
    }
}

#[async_trait]
impl Provider for TwitterProvider {
    fn platform(&self) -> Platform {
        Platform::Twitter
    }

    fn uses_pkce(&self) -> bool {
        true
    }

    fn authorize_url(&self, state: &str, code_verifier: Option<&str>) -> Result<Url> {
        let verifier = code_verifier.ok_or_else(|| {
            ProviderError::OAuth("Twitter authorization requires a PKCE code verifier".to_string())
        })?;

        let url = Url::parse_with_params(
            AUTHORIZE_URL,
            &[
                ("response_type", "code"),
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("scope", SCOPES),
                ("state", state),
                ("code_challenge", pkce_challenge(verifier).as_str()),
                ("code_challenge_method", "S256"),
            ],
        )
        .map_err(|e| ProviderError::OAuth(format!("Failed to build authorize URL: {}", e)))?;

        Ok(url)
    }

    async fn exchange_code(&self, code: &str, code_verifier: Option<&str>) -> Result<TokenSet> {
        let verifier = code_verifier.ok_or_else(|| {
            ProviderError::OAuth("Twitter code exchange requires the PKCE code verifier".to_string())
        })?;

        let mut tokens = self
            .token_request(
                &[
                    ("grant_type", "authorization_code"),
                    ("code", code),
                    ("redirect_uri", self.config.redirect_uri.as_str()),
                    ("client_id", self.config.client_id.as_str()),
                    ("code_verifier", verifier),
                ],
                "token exchange",
            )
            .await?;

        // Identity lookup is best-effort; a linked account without a username
        // still posts fine
        match self.fetch_identity(&tokens.access_token).await {
            Ok(user) => {
                tokens.account_id = Some(user.id);
                tokens.account_username = Some(user.username);
            }
            Err(e) => debug!("twitter identity lookup failed after exchange: {}", e),
        }

        Ok(tokens)
    }

    fn supports_refresh(&self) -> bool {
        true
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenSet> {
        self.token_request(
            &[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", self.config.client_id.as_str()),
            ],
            "token refresh",
        )
        .await
    }

    async fn verify_token(&self, access_token: &str) -> Result<bool> {
        let response = self
            .client
            .get(USERS_ME_URL)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| http::transport_error("twitter", "verify token", e))?;

        Ok(response.status().is_success())
    }

    fn validate_content(&self, post: &ScheduledPost) -> Result<()> {
        if post.content.trim().is_empty() {
            return Err(ProviderError::Validation("Tweet content is empty".to_string()).into());
        }

        let count = post.content.chars().count();
        if count > CHARACTER_LIMIT {
            return Err(ProviderError::Validation(format!(
                "Content exceeds Twitter's {} character limit (current: {} characters)",
                CHARACTER_LIMIT, count
            ))
            .into());
        }

        Ok(())
    }

    fn character_limit(&self) -> Option<usize> {
        Some(CHARACTER_LIMIT)
    }

    async fn publish(&self, access_token: &str, post: &ScheduledPost) -> Result<String> {
        self.validate_content(post)?;

        let response = self
            .client
            .post(TWEETS_URL)
            .bearer_auth(access_token)
            .json(&serde_json::json!({ "text": post.content }))
            .send()
            .await
            .map_err(|e| http::transport_error("twitter", "publish tweet", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = http::error_body(response).await;
            return Err(http::classify_status("twitter", "publish tweet", status, &body).into());
        }

        let envelope: TweetEnvelope = response.json().await.map_err(|e| {
            ProviderError::Publish(format!("twitter tweet response unreadable: {}", e))
        })?;

        Ok(envelope.data.id)
    }
}
