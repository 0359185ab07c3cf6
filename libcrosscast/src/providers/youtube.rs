//! YouTube provider (Google OAuth)
//!
//! The OAuth linking and verification sides are fully functional; publishing
//! is declined locally because a post here has no rendered video asset to
//! upload. The dispatch loop records that as a per-post failure and moves on.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::config::OAuthAppConfig;
use crate::error::{ProviderError, Result};
use crate::providers::{google, http, Provider};
use crate::types::{Platform, ScheduledPost, TokenSet};

const SCOPES: &str =
    "https://www.googleapis.com/auth/youtube.readonly https://www.googleapis.com/auth/youtube.upload";
const CHANNELS_URL: &str = "https://www.googleapis.com/youtube/v3/channels";

pub struct YoutubeProvider {
    config: OAuthAppConfig,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct ChannelListResponse {
    #[serde(default)]
    items: Vec<Channel>,
}

#[derive(Debug, Deserialize)]
struct Channel {
    id: String,
    snippet: Option<ChannelSnippet>,
}

#[derive(Debug, Deserialize)]
struct ChannelSnippet {
    title: String,
}

impl YoutubeProvider {
    pub fn new(config: &OAuthAppConfig) -> Result<Self> {
        Ok(Self {
            config: config.clone(),
            client: http::build_client()?,
        })
    }

    async fn fetch_channel(&self, access_token: &str) -> Result<Option<Channel>> {
        let response = self
            .client
            .get(CHANNELS_URL)
            .query(&[("part", "snippet"), ("mine", "true")])
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| http::transport_error("youtube", "fetch channel", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = http::error_body(response).await;
            return Err(http::classify_status("youtube", "fetch channel", status, &body).into());
        }

        let list: ChannelListResponse = response.json().await.map_err(|e| {
            ProviderError::Network(format!("youtube channel response unreadable: {}", e))
        })?;

        Ok(list.items.into_iter().next())
    }
}

#[async_trait]
impl Provider for YoutubeProvider {
    fn platform(&self) -> Platform {
        Platform::Youtube
    }

    fn authorize_url(&self, state: &str, _code_verifier: Option<&str>) -> Result<Url> {
        google::authorize_url(&self.config, SCOPES, state)
    }

    async fn exchange_code(&self, code: &str, _code_verifier: Option<&str>) -> Result<TokenSet> {
        let response = google::exchange_code(&self.client, &self.config, code, "youtube").await?;
        let mut tokens = response.into_token_set(chrono::Utc::now().timestamp());

        match self.fetch_channel(&tokens.access_token).await {
            Ok(Some(channel)) => {
                tokens.account_id = Some(channel.id);
                tokens.account_username = channel.snippet.map(|s| s.title);
            }
            Ok(None) => debug!("youtube account has no channel"),
            Err(e) => debug!("youtube channel lookup failed after exchange: {}", e),
        }

        Ok(tokens)
    }

    fn supports_refresh(&self) -> bool {
        true
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenSet> {
        let response =
            google::refresh(&self.client, &self.config, refresh_token, "youtube").await?;
        Ok(response.into_token_set(chrono::Utc::now().timestamp()))
    }

    async fn verify_token(&self, access_token: &str) -> Result<bool> {
        let response = self
            .client
            .get(CHANNELS_URL)
            .query(&[("part", "id"), ("mine", "true")])
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| http::transport_error("youtube", "verify token", e))?;

        Ok(response.status().is_success())
    }

    fn validate_content(&self, post: &ScheduledPost) -> Result<()> {
        if post.content.trim().is_empty() {
            return Err(ProviderError::Validation("Post content is empty".to_string()).into());
        }
        Ok(())
    }

    async fn publish(&self, _access_token: &str, _post: &ScheduledPost) -> Result<String> {
        // Terminal by classification: retrying will never make a video appear
        Err(ProviderError::NotSupported(
            "YouTube publishing requires a rendered video asset".to_string(),
        )
        .into())
    }
}
