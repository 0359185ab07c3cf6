//! Mock provider implementation for testing
//!
//! A configurable in-memory provider so the dispatch loop, token lifecycle,
//! and trigger surface can be exercised without platform credentials or
//! network access. Counters are shared through `MockCounters`, which a test
//! clones before handing the provider to a registry.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use url::Url;

use crate::error::{ProviderError, Result};
use crate::providers::Provider;
use crate::types::{Platform, ScheduledPost, TokenSet};

/// Shared call counters and captured publishes
#[derive(Debug, Clone, Default)]
pub struct MockCounters {
    pub exchange_calls: Arc<Mutex<usize>>,
    pub refresh_calls: Arc<Mutex<usize>>,
    pub verify_calls: Arc<Mutex<usize>>,
    pub publish_calls: Arc<Mutex<usize>>,
    /// (post id, content) pairs that reached publish successfully
    pub published: Arc<Mutex<Vec<(String, String)>>>,
}

impl MockCounters {
    pub fn exchange_count(&self) -> usize {
        *self.exchange_calls.lock().unwrap()
    }

    pub fn refresh_count(&self) -> usize {
        *self.refresh_calls.lock().unwrap()
    }

    pub fn verify_count(&self) -> usize {
        *self.verify_calls.lock().unwrap()
    }

    pub fn publish_count(&self) -> usize {
        *self.publish_calls.lock().unwrap()
    }

    pub fn published(&self) -> Vec<(String, String)> {
        self.published.lock().unwrap().clone()
    }
}

/// Configuration for mock provider behavior
#[derive(Debug, Clone)]
pub struct MockBehavior {
    pub platform: Platform,

    /// Error returned by publish; None means publish succeeds
    pub publish_error: Option<ProviderError>,

    /// Token material returned by exchange_code and refresh
    pub tokens: TokenSet,

    pub supports_refresh: bool,

    /// Error returned by refresh; None means refresh succeeds
    pub refresh_error: Option<ProviderError>,

    /// What verify_token reports
    pub token_valid: bool,

    pub character_limit: Option<usize>,
}

impl MockBehavior {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            publish_error: None,
            tokens: TokenSet::new("mock-access-token"),
            supports_refresh: false,
            refresh_error: None,
            token_valid: true,
            character_limit: None,
        }
    }
}

/// Mock provider for testing
pub struct MockProvider {
    behavior: MockBehavior,
    counters: MockCounters,
}

impl MockProvider {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            counters: MockCounters::default(),
        }
    }

    /// A provider where every operation succeeds
    pub fn success(platform: Platform) -> Self {
        Self::new(MockBehavior::new(platform))
    }

    /// A provider whose publish always fails with the given error
    pub fn publish_failure(platform: Platform, error: ProviderError) -> Self {
        let mut behavior = MockBehavior::new(platform);
        behavior.publish_error = Some(error);
        Self::new(behavior)
    }

    /// A refreshing provider that hands out the given token material
    pub fn with_refresh(platform: Platform, tokens: TokenSet) -> Self {
        let mut behavior = MockBehavior::new(platform);
        behavior.supports_refresh = true;
        behavior.tokens = tokens;
        Self::new(behavior)
    }

    /// A refreshing provider whose refresh always fails
    pub fn refresh_failure(platform: Platform, error: ProviderError) -> Self {
        let mut behavior = MockBehavior::new(platform);
        behavior.supports_refresh = true;
        behavior.refresh_error = Some(error);
        Self::new(behavior)
    }

    /// A provider that enforces a content length limit
    pub fn with_limit(platform: Platform, limit: usize) -> Self {
        let mut behavior = MockBehavior::new(platform);
        behavior.character_limit = Some(limit);
        Self::new(behavior)
    }

    /// Clone the counter handles before the provider is boxed away
    pub fn counters(&self) -> MockCounters {
        self.counters.clone()
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn platform(&self) -> Platform {
        self.behavior.platform
    }

    fn authorize_url(&self, state: &str, _code_verifier: Option<&str>) -> Result<Url> {
        let url = Url::parse_with_params(
            "https://mock.invalid/oauth/authorize",
            &[("state", state)],
        )
        .map_err(|e| ProviderError::OAuth(format!("Failed to build authorize URL: {}", e)))?;
        Ok(url)
    }

    async fn exchange_code(&self, _code: &str, _code_verifier: Option<&str>) -> Result<TokenSet> {
        *self.counters.exchange_calls.lock().unwrap() += 1;
        Ok(self.behavior.tokens.clone())
    }

    fn supports_refresh(&self) -> bool {
        self.behavior.supports_refresh
    }

    async fn refresh(&self, _refresh_token: &str) -> Result<TokenSet> {
        *self.counters.refresh_calls.lock().unwrap() += 1;

        if !self.behavior.supports_refresh {
            return Err(ProviderError::NotSupported(format!(
                "{} does not issue refresh tokens",
                self.behavior.platform
            ))
            .into());
        }

        match &self.behavior.refresh_error {
            Some(error) => Err(error.clone().into()),
            None => Ok(self.behavior.tokens.clone()),
        }
    }

    async fn verify_token(&self, _access_token: &str) -> Result<bool> {
        *self.counters.verify_calls.lock().unwrap() += 1;
        Ok(self.behavior.token_valid)
    }

    fn validate_content(&self, post: &ScheduledPost) -> Result<()> {
        if post.content.is_empty() {
            return Err(ProviderError::Validation("Content cannot be empty".to_string()).into());
        }

        if let Some(limit) = self.behavior.character_limit {
            let count = post.content.chars().count();
            if count > limit {
                return Err(ProviderError::Validation(format!(
                    "Content exceeds {} character limit (got {} characters)",
                    limit, count
                ))
                .into());
            }
        }

        Ok(())
    }

    fn character_limit(&self) -> Option<usize> {
        self.behavior.character_limit
    }

    async fn publish(&self, _access_token: &str, post: &ScheduledPost) -> Result<String> {
        *self.counters.publish_calls.lock().unwrap() += 1;

        self.validate_content(post)?;

        if let Some(error) = &self.behavior.publish_error {
            return Err(error.clone().into());
        }

        self.counters
            .published
            .lock()
            .unwrap()
            .push((post.id.clone(), post.content.clone()));

        Ok(format!(
            "{}:mock-{}",
            self.behavior.platform,
            uuid::Uuid::new_v4()
        ))
    }
}
