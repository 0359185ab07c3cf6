//! Core types for Crosscast

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::CrosscastError;

/// The platforms Crosscast can link and publish to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Twitter,
    Instagram,
    Youtube,
    GoogleCalendar,
}

impl Platform {
    pub const ALL: [Platform; 4] = [
        Platform::Twitter,
        Platform::Instagram,
        Platform::Youtube,
        Platform::GoogleCalendar,
    ];

    /// Stable identifier used in the database and on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Twitter => "twitter",
            Platform::Instagram => "instagram",
            Platform::Youtube => "youtube",
            Platform::GoogleCalendar => "google_calendar",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Platform {
    type Err = CrosscastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "twitter" => Ok(Platform::Twitter),
            "instagram" => Ok(Platform::Instagram),
            "youtube" => Ok(Platform::Youtube),
            "google_calendar" => Ok(Platform::GoogleCalendar),
            _ => Err(CrosscastError::InvalidInput(format!(
                "Unknown platform: '{}'. Valid options: twitter, instagram, youtube, google_calendar",
                s
            ))),
        }
    }
}

/// A persisted OAuth credential set for one (user, platform) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkedAccount {
    pub user_id: String,
    pub platform: Platform,
    /// Provider-side account identifier, when the provider reports one
    pub account_id: Option<String>,
    pub account_username: Option<String>,
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Absolute expiry as Unix seconds; None when the provider gave no expiry
    pub token_expires_at: Option<i64>,
    pub is_active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl LinkedAccount {
    /// Build an active account row from a freshly exchanged token set
    pub fn from_token_set(user_id: &str, platform: Platform, tokens: &TokenSet) -> Self {
        let now = Utc::now().timestamp();
        Self {
            user_id: user_id.to_string(),
            platform,
            account_id: tokens.account_id.clone(),
            account_username: tokens.account_username.clone(),
            access_token: tokens.access_token.clone(),
            refresh_token: tokens.refresh_token.clone(),
            token_expires_at: tokens.expires_at,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A post waiting to be dispatched to one platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledPost {
    pub id: String,
    pub user_id: String,
    pub client_id: String,
    pub platform: Platform,
    pub content: String,
    /// Required by Instagram, ignored by the other platforms
    pub media_url: Option<String>,
    pub scheduled_for: i64,
    pub posted: bool,
    pub provider_post_id: Option<String>,
    pub created_at: i64,
}

impl ScheduledPost {
    pub fn new(
        user_id: &str,
        client_id: &str,
        platform: Platform,
        content: &str,
        scheduled_for: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            client_id: client_id.to_string(),
            platform,
            content: content.to_string(),
            media_url: None,
            scheduled_for,
            posted: false,
            provider_post_id: None,
            created_at: Utc::now().timestamp(),
        }
    }

    pub fn with_media_url(mut self, media_url: &str) -> Self {
        self.media_url = Some(media_url.to_string());
        self
    }
}

/// Normalized token material returned by every provider adapter.
///
/// Each adapter deserializes its provider's own response shape and converts
/// into this before anything touches the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Absolute expiry as Unix seconds
    pub expires_at: Option<i64>,
    pub account_id: Option<String>,
    pub account_username: Option<String>,
}

impl TokenSet {
    pub fn new(access_token: &str) -> Self {
        Self {
            access_token: access_token.to_string(),
            refresh_token: None,
            expires_at: None,
            account_id: None,
            account_username: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_round_trip() {
        for platform in Platform::ALL {
            let parsed: Platform = platform.as_str().parse().unwrap();
            assert_eq!(parsed, platform);
        }
    }

    #[test]
    fn test_platform_parse_unknown() {
        let result = "myspace".parse::<Platform>();
        assert!(result.is_err());
        assert!(format!("{}", result.unwrap_err()).contains("myspace"));
    }

    #[test]
    fn test_platform_display() {
        assert_eq!(Platform::Twitter.to_string(), "twitter");
        assert_eq!(Platform::GoogleCalendar.to_string(), "google_calendar");
    }

    #[test]
    fn test_scheduled_post_new() {
        let post = ScheduledPost::new("user-1", "client-1", Platform::Twitter, "hello", 1735689600);

        assert_eq!(post.user_id, "user-1");
        assert_eq!(post.client_id, "client-1");
        assert_eq!(post.platform, Platform::Twitter);
        assert_eq!(post.content, "hello");
        assert_eq!(post.scheduled_for, 1735689600);
        assert!(!post.posted);
        assert!(post.provider_post_id.is_none());
        assert!(post.media_url.is_none());
        assert!(!post.id.is_empty());
    }

    #[test]
    fn test_scheduled_post_with_media_url() {
        let post = ScheduledPost::new("u", "c", Platform::Instagram, "caption", 0)
            .with_media_url("https://cdn.example.com/a.jpg");
        assert_eq!(
            post.media_url.as_deref(),
            Some("https://cdn.example.com/a.jpg")
        );
    }

    #[test]
    fn test_scheduled_post_ids_unique() {
        let a = ScheduledPost::new("u", "c", Platform::Twitter, "x", 0);
        let b = ScheduledPost::new("u", "c", Platform::Twitter, "x", 0);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_linked_account_from_token_set() {
        let tokens = TokenSet {
            access_token: "at-123".to_string(),
            refresh_token: Some("rt-456".to_string()),
            expires_at: Some(1900000000),
            account_id: Some("42".to_string()),
            account_username: Some("alice".to_string()),
        };

        let account = LinkedAccount::from_token_set("user-1", Platform::Twitter, &tokens);
        assert_eq!(account.user_id, "user-1");
        assert_eq!(account.platform, Platform::Twitter);
        assert_eq!(account.access_token, "at-123");
        assert_eq!(account.refresh_token.as_deref(), Some("rt-456"));
        assert_eq!(account.token_expires_at, Some(1900000000));
        assert_eq!(account.account_username.as_deref(), Some("alice"));
        assert!(account.is_active);
    }
}
