//! Provider adapter abstraction and implementations

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use std::collections::HashMap;
use tracing::info;
use url::Url;

use crate::config::Config;
use crate::error::{ProviderError, Result};
use crate::types::{Platform, ScheduledPost, TokenSet};

pub mod google;
pub mod google_calendar;
pub mod http;
pub mod instagram;
pub mod mock;
pub mod twitter;
pub mod youtube;

pub use mock::{MockBehavior, MockCounters, MockProvider};

/// One social platform's OAuth and publishing surface.
///
/// Implementations hold their own HTTP client and app credentials; nothing
/// here touches the database.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Which platform this adapter serves
    fn platform(&self) -> Platform;

    /// Whether the authorization flow needs a PKCE code verifier
    fn uses_pkce(&self) -> bool {
        false
    }

    /// Build the user-facing authorization URL. Pure: no network.
    fn authorize_url(&self, state: &str, code_verifier: Option<&str>) -> Result<Url>;

    /// Exchange a callback code for token material
    async fn exchange_code(&self, code: &str, code_verifier: Option<&str>) -> Result<TokenSet>;

    /// Whether the platform issues refresh tokens at all
    fn supports_refresh(&self) -> bool {
        false
    }

    /// Exchange a refresh token for fresh token material
    async fn refresh(&self, _refresh_token: &str) -> Result<TokenSet> {
        Err(ProviderError::NotSupported(format!(
            "{} does not issue refresh tokens; reconnect the account instead",
            self.platform()
        ))
        .into())
    }

    /// Live check that a stored access token is still accepted
    async fn verify_token(&self, access_token: &str) -> Result<bool>;

    /// Local payload validation. Pure: no network.
    fn validate_content(&self, post: &ScheduledPost) -> Result<()>;

    /// Maximum content length, where the platform has one
    fn character_limit(&self) -> Option<usize> {
        None
    }

    /// Publish one post. Returns the provider-side post id.
    async fn publish(&self, access_token: &str, post: &ScheduledPost) -> Result<String>;
}

/// The set of configured provider adapters, keyed by platform.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<Platform, Box<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, provider: Box<dyn Provider>) {
        self.providers.insert(provider.platform(), provider);
    }

    pub fn get(&self, platform: Platform) -> Option<&dyn Provider> {
        self.providers.get(&platform).map(|p| p.as_ref())
    }

    pub fn platforms(&self) -> Vec<Platform> {
        let mut platforms: Vec<Platform> = self.providers.keys().copied().collect();
        platforms.sort_by_key(|p| p.as_str());
        platforms
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }
}

/// Build the registry from configuration.
///
/// Missing or disabled sections are skipped silently; the affected platform
/// surfaces a per-post error only when something actually targets it.
pub fn build_registry(config: &Config) -> Result<ProviderRegistry> {
    let mut registry = ProviderRegistry::new();

    if let Some(twitter) = &config.twitter {
        if twitter.enabled {
            registry.insert(Box::new(twitter::TwitterProvider::new(twitter)?));
            info!("Twitter provider enabled");
        }
    }

    if let Some(instagram) = &config.instagram {
        if instagram.enabled {
            registry.insert(Box::new(instagram::InstagramProvider::new(instagram)?));
            info!("Instagram provider enabled");
        }
    }

    if let Some(google) = &config.google {
        if google.enabled {
            registry.insert(Box::new(youtube::YoutubeProvider::new(google)?));
            registry.insert(Box::new(google_calendar::GoogleCalendarProvider::new(
                google,
            )?));
            info!("YouTube and Google Calendar providers enabled");
        }
    }

    Ok(registry)
}

/// Random anti-forgery state for the authorization round trip
pub fn generate_state() -> String {
    let mut bytes = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Random PKCE code verifier (RFC 7636 length rules: 43-128 chars)
pub fn generate_code_verifier() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
