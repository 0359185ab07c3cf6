//! Google Calendar provider (Google OAuth)
//!
//! Publishing inserts an event on the user's primary calendar with the post
//! content as the summary and the scheduled time as the event start.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use url::Url;

use crate::config::OAuthAppConfig;
use crate::error::{ProviderError, Result};
use crate::providers::{google, http, Provider};
use crate::types::{Platform, ScheduledPost, TokenSet};

const SCOPES: &str = "https://www.googleapis.com/auth/calendar.events";
const EVENTS_URL: &str = "https://www.googleapis.com/calendar/v3/calendars/primary/events";
const CALENDAR_LIST_URL: &str = "https://www.googleapis.com/calendar/v3/users/me/calendarList";

/// Created events default to a half-hour block
const DEFAULT_EVENT_SECS: i64 = 30 * 60;

pub struct GoogleCalendarProvider {
    config: OAuthAppConfig,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct CalendarEvent {
    id: String,
}

fn rfc3339(timestamp: i64) -> String {
    DateTime::<Utc>::from_timestamp(timestamp, 0)
        .unwrap_or_else(Utc::now)
        .to_rfc3339()
}

impl GoogleCalendarProvider {
    pub fn new(config: &OAuthAppConfig) -> Result<Self> {
        Ok(Self {
            config: config.clone(),
            client: http::build_client()?,
        })
    }
}

#[async_trait]
impl Provider for GoogleCalendarProvider {
    fn platform(&self) -> Platform {
        Platform::GoogleCalendar
    }

    fn authorize_url(&self, state: &str, _code_verifier: Option<&str>) -> Result<Url> {
        google::authorize_url(&self.config, SCOPES, state)
    }

    async fn exchange_code(&self, code: &str, _code_verifier: Option<&str>) -> Result<TokenSet> {
        let response =
            google::exchange_code(&self.client, &self.config, code, "google_calendar").await?;
        Ok(response.into_token_set(Utc::now().timestamp()))
    }

    fn supports_refresh(&self) -> bool {
        true
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenSet> {
        let response =
            google::refresh(&self.client, &self.config, refresh_token, "google_calendar").await?;
        Ok(response.into_token_set(Utc::now().timestamp()))
    }

    async fn verify_token(&self, access_token: &str) -> Result<bool> {
        let response = self
            .client
            .get(CALENDAR_LIST_URL)
            .query(&[("maxResults", "1")])
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| http::transport_error("google_calendar", "verify token", e))?;

        Ok(response.status().is_success())
    }

    fn validate_content(&self, post: &ScheduledPost) -> Result<()> {
        if post.content.trim().is_empty() {
            return Err(
                ProviderError::Validation("Event summary is empty".to_string()).into(),
            );
        }
        Ok(())
    }

    async fn publish(&self, access_token: &str, post: &ScheduledPost) -> Result<String> {
        self.validate_content(post)?;

        let body = serde_json::json!({
            "summary": post.content,
            "start": { "dateTime": rfc3339(post.scheduled_for) },
            "end": { "dateTime": rfc3339(post.scheduled_for + DEFAULT_EVENT_SECS) },
        });

        let response = self
            .client
            .post(EVENTS_URL)
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| http::transport_error("google_calendar", "insert event", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = http::error_body(response).await;
            return Err(
                http::classify_status("google_calendar", "insert event", status, &body).into(),
            );
        }

        let event: CalendarEvent = response.json().await.map_err(|e| {
            ProviderError::Publish(format!("google_calendar event response unreadable: {}", e))
        })?;

        Ok(event.id)
    }
}
