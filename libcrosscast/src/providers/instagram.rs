//! Instagram provider (Basic Display OAuth + Graph content publishing)
//!
//! Instagram's code exchange is two-stage: the short-lived token from the
//! OAuth endpoint is immediately traded for a 60-day long-lived token, and
//! only the long-lived one is persisted. There is no refresh grant; an
//! expired token means the account must be reconnected.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::config::OAuthAppConfig;
use crate::error::{ProviderError, Result};
use crate::providers::{http, Provider};
use crate::types::{Platform, ScheduledPost, TokenSet};

pub const CAPTION_LIMIT: usize = 2200;

const AUTHORIZE_URL: &str = "https://api.instagram.com/oauth/authorize";
const SHORT_LIVED_TOKEN_URL: &str = "https://api.instagram.com/oauth/access_token";
const GRAPH_URL: &str = "https://graph.instagram.com";

const SCOPES: &str = "user_profile,user_media";

pub struct InstagramProvider {
    config: OAuthAppConfig,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct ShortLivedToken {
    access_token: String,
    user_id: i64,
}

#[derive(Debug, Deserialize)]
struct LongLivedToken {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct IgProfile {
    id: String,
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IgObject {
    id: String,
}

impl InstagramProvider {
    pub fn new(config: &OAuthAppConfig) -> Result<Self> {
        Ok(Self {
            config: config.clone(),
            client: http::build_client()?,
        })
    }

    async fn exchange_short_lived(&self, code: &str) -> Result<ShortLivedToken> {
        let response = self
            .client
            .post(SHORT_LIVED_TOKEN_URL)
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("grant_type", "authorization_code"),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("code", code),
            ])
            .send()
            .await
            .map_err(|e| http::transport_error("instagram", "code exchange", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = http::error_body(response).await;
            return Err(
                http::classify_token_status("instagram", "code exchange", status, &body).into(),
            );
        }

        response.json().await.map_err(|e| {
            ProviderError::OAuth(format!("instagram code exchange returned unexpected body: {}", e))
                .into()
        })
    }

    async fn exchange_long_lived(&self, short_lived: &str) -> Result<LongLivedToken> {
        let response = self
            .client
            .get(format!("{}/access_token", GRAPH_URL))
            .query(&[
                ("grant_type", "ig_exchange_token"),
                ("client_secret", self.config.client_secret.as_str()),
                ("access_token", short_lived),
            ])
            .send()
            .await
            .map_err(|e| http::transport_error("instagram", "long-lived exchange", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = http::error_body(response).await;
            return Err(http::classify_token_status(
                "instagram",
                "long-lived exchange",
                status,
                &body,
            )
            .into());
        }

        response.json().await.map_err(|e| {
            ProviderError::OAuth(format!(
                "instagram long-lived exchange returned unexpected body: {}",
                e
            ))
            .into()
        })
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<IgProfile> {
        let response = self
            .client
            .get(format!("{}/me", GRAPH_URL))
            .query(&[("fields", "id,username"), ("access_token", access_token)])
            .send()
            .await
            .map_err(|e| http::transport_error("instagram", "fetch profile", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = http::error_body(response).await;
            return Err(http::classify_status("instagram", "fetch profile", status, &body).into());
        }

        response.json().await.map_err(|e| {
            ProviderError::Network(format!("instagram profile response unreadable: {}", e)).into()
        })
    }
}

#[async_trait]
impl Provider for InstagramProvider {
    fn platform(&self) -> Platform {
        Platform::Instagram
    }

    fn authorize_url(&self, state: &str, _code_verifier: Option<&str>) -> Result<Url> {
        let url = Url::parse_with_params(
            AUTHORIZE_URL,
            &[
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("scope", SCOPES),
                ("response_type", "code"),
                ("state", state),
            ],
        )
        .map_err(|e| ProviderError::OAuth(format!("Failed to build authorize URL: {}", e)))?;

        Ok(url)
    }

    async fn exchange_code(&self, code: &str, _code_verifier: Option<&str>) -> Result<TokenSet> {
        let short_lived = self.exchange_short_lived(code).await?;
        let long_lived = self.exchange_long_lived(&short_lived.access_token).await?;

        let mut tokens = TokenSet {
            access_token: long_lived.access_token,
            refresh_token: None,
            expires_at: Some(chrono::Utc::now().timestamp() + long_lived.expires_in),
            account_id: Some(short_lived.user_id.to_string()),
            account_username: None,
        };

        match self.fetch_profile(&tokens.access_token).await {
            Ok(profile) => tokens.account_username = profile.username,
            Err(e) => debug!("instagram profile lookup failed after exchange: {}", e),
        }

        Ok(tokens)
    }

    // supports_refresh stays false: an expired Instagram token means the
    // account must be reconnected, and the default refresh() says so without
    // any network call.

    async fn verify_token(&self, access_token: &str) -> Result<bool> {
        let response = self
            .client
            .get(format!("{}/me", GRAPH_URL))
            .query(&[("fields", "id"), ("access_token", access_token)])
            .send()
            .await
            .map_err(|e| http::transport_error("instagram", "verify token", e))?;

        Ok(response.status().is_success())
    }

    fn validate_content(&self, post: &ScheduledPost) -> Result<()> {
        if post.media_url.is_none() {
            return Err(ProviderError::Validation(
                "Instagram publishing requires a media URL; text-only posts are not supported"
                    .to_string(),
            )
            .into());
        }

        let count = post.content.chars().count();
        if count > CAPTION_LIMIT {
            return Err(ProviderError::Validation(format!(
                "Caption exceeds Instagram's {} character limit (current: {} characters)",
                CAPTION_LIMIT, count
            ))
            .into());
        }

        Ok(())
    }

    fn character_limit(&self) -> Option<usize> {
        Some(CAPTION_LIMIT)
    }

    async fn publish(&self, access_token: &str, post: &ScheduledPost) -> Result<String> {
        self.validate_content(post)?;

        // validate_content guarantees media_url above
        let media_url = post.media_url.as_deref().unwrap_or_default();
        let profile = self.fetch_profile(access_token).await?;

        // Stage 1: create a media container
        let response = self
            .client
            .post(format!("{}/v21.0/{}/media", GRAPH_URL, profile.id))
            .form(&[
                ("image_url", media_url),
                ("caption", post.content.as_str()),
                ("access_token", access_token),
            ])
            .send()
            .await
            .map_err(|e| http::transport_error("instagram", "create container", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = http::error_body(response).await;
            return Err(
                http::classify_status("instagram", "create container", status, &body).into(),
            );
        }

        let container: IgObject = response.json().await.map_err(|e| {
            ProviderError::Publish(format!("instagram container response unreadable: {}", e))
        })?;

        // Stage 2: publish the container
        let response = self
            .client
            .post(format!("{}/v21.0/{}/media_publish", GRAPH_URL, profile.id))
            .form(&[
                ("creation_id", container.id.as_str()),
                ("access_token", access_token),
            ])
            .send()
            .await
            .map_err(|e| http::transport_error("instagram", "publish container", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = http::error_body(response).await;
            return Err(
                http::classify_status("instagram", "publish container", status, &body).into(),
            );
        }

        let media: IgObject = response.json().await.map_err(|e| {
            ProviderError::Publish(format!("instagram publish response unreadable: {}", e))
        })?;

        Ok(media.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> InstagramProvider {
        InstagramProvider::new(&OAuthAppConfig {
            enabled: true,
            client_id: "ig-client".to_string(),
            client_secret: "secret".to_string(),
            redirect_uri: "https://example.com/callback/instagram".to_string(),
        })
        .unwrap()
    }

    #[test]
    fn test_authorize_url_parameters() {
        let url = provider().authorize_url("state-1", None).unwrap();

        assert_eq!(url.host_str(), Some("api.instagram.com"));
        assert_eq!(url.path(), "/oauth/authorize");

        let query: std::collections::HashMap<_, _> = url.query_pairs().collect();
        assert_eq!(query["client_id"], "ig-client");
        assert_eq!(query["scope"], "user_profile,user_media");
        assert_eq!(query["response_type"], "code");
        assert_eq!(query["state"], "state-1");
    }

    #[test]
    fn test_does_not_support_refresh() {
        assert!(!provider().supports_refresh());
    }

    #[tokio::test]
    async fn test_refresh_fails_without_network() {
        // The default refresh() rejects before any HTTP happens
        let err = provider().refresh("anything").await.unwrap_err();
        let message = format!("{}", err);
        assert!(message.contains("Not supported"));
        assert!(message.contains("instagram"));
    }

    #[test]
    fn test_validate_content_requires_media_url() {
        let p = provider();
        let post = ScheduledPost::new("u", "c", Platform::Instagram, "caption", 0);
        let err = p.validate_content(&post).unwrap_err();
        assert!(format!("{}", err).contains("media URL"));
    }

    #[test]
    fn test_validate_content_with_media_url() {
        let p = provider();
        let post = ScheduledPost::new("u", "c", Platform::Instagram, "caption", 0)
            .with_media_url("https://cdn.example.com/photo.jpg");
        assert!(p.validate_content(&post).is_ok());
    }

    #[test]
    fn test_validate_caption_limit() {
        let p = provider();
        let ok = ScheduledPost::new("u", "c", Platform::Instagram, &"x".repeat(2200), 0)
            .with_media_url("https://cdn.example.com/photo.jpg");
        assert!(p.validate_content(&ok).is_ok());

        let too_long = ScheduledPost::new("u", "c", Platform::Instagram, &"x".repeat(2201), 0)
            .with_media_url("https://cdn.example.com/photo.jpg");
        let err = p.validate_content(&too_long).unwrap_err();
        assert!(format!("{}", err).contains("2200"));
    }

    #[test]
    fn test_empty_caption_with_media_is_valid() {
        // Instagram allows caption-less media posts
        let p = provider();
        let post = ScheduledPost::new("u", "c", Platform::Instagram, "", 0)
            .with_media_url("https://cdn.example.com/photo.jpg");
        assert!(p.validate_content(&post).is_ok());
    }
}
