//! Token lifecycle management
//!
//! `TokenBroker` turns a stored credential into a usable access token,
//! refreshing transparently where the platform supports it. One broker lives
//! for one dispatch batch; its cache guarantees at most one database lookup
//! and one refresh attempt per (user, platform) within that batch, negative
//! outcomes included.

use chrono::Utc;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::db::Database;
use crate::error::Result;
use crate::providers::ProviderRegistry;
use crate::types::Platform;

/// Tokens expiring within this window are treated as already expired, so a
/// token never dies mid-publish.
pub const EXPIRY_MARGIN_SECS: i64 = 60;

pub struct TokenBroker<'a> {
    db: &'a Database,
    registry: &'a ProviderRegistry,
    cache: HashMap<(String, Platform), Option<String>>,
}

impl<'a> TokenBroker<'a> {
    pub fn new(db: &'a Database, registry: &'a ProviderRegistry) -> Self {
        Self {
            db,
            registry,
            cache: HashMap::new(),
        }
    }

    /// Resolve a usable access token for one (user, platform).
    ///
    /// Returns None when no active account exists, the token is expired with
    /// no way to refresh it, or the refresh attempt failed. Database errors
    /// propagate.
    pub async fn valid_token(&mut self, user_id: &str, platform: Platform) -> Result<Option<String>> {
        let key = (user_id.to_string(), platform);
        if let Some(cached) = self.cache.get(&key) {
            debug!("token cache hit for {} on {}", user_id, platform);
            return Ok(cached.clone());
        }

        let resolved = self.resolve(user_id, platform).await?;
        self.cache.insert(key, resolved.clone());
        Ok(resolved)
    }

    async fn resolve(&self, user_id: &str, platform: Platform) -> Result<Option<String>> {
        let Some(account) = self.db.get_linked_account(user_id, platform).await? else {
            debug!("no linked {} account for {}", platform, user_id);
            return Ok(None);
        };

        if !account.is_active {
            debug!("{} account for {} is disconnected", platform, user_id);
            return Ok(None);
        }

        let now = Utc::now().timestamp();
        match account.token_expires_at {
            // No expiry metadata: the stored token is all there is
            None => return Ok(Some(account.access_token)),
            Some(expires_at) if expires_at - EXPIRY_MARGIN_SECS > now => {
                return Ok(Some(account.access_token));
            }
            Some(_) => {}
        }

        // Expired (or about to): try a transparent refresh
        let Some(provider) = self.registry.get(platform) else {
            warn!(
                "{} token for {} expired but no provider is configured",
                platform, user_id
            );
            return Ok(None);
        };

        if !provider.supports_refresh() {
            warn!(
                "{} token for {} expired and the platform issues no refresh tokens; reconnect required",
                platform, user_id
            );
            return Ok(None);
        }

        let Some(refresh_token) = account.refresh_token.as_deref() else {
            warn!(
                "{} token for {} expired and no refresh token is stored; reconnect required",
                platform, user_id
            );
            return Ok(None);
        };

        match provider.refresh(refresh_token).await {
            Ok(tokens) => {
                self.db
                    .update_account_tokens(
                        user_id,
                        platform,
                        &tokens.access_token,
                        tokens.refresh_token.as_deref(),
                        tokens.expires_at,
                    )
                    .await?;
                debug!("refreshed {} token for {}", platform, user_id);
                Ok(Some(tokens.access_token))
            }
            Err(e) => {
                // The account stays linked; the operator may reconnect or the
                // next batch may succeed
                warn!("{} token refresh for {} failed: {}", platform, user_id, e);
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::providers::{MockProvider, ProviderRegistry};
    use crate::types::{LinkedAccount, TokenSet};

    async fn test_db() -> Database {
        Database::new(":memory:").await.unwrap()
    }

    fn far_future() -> i64 {
        Utc::now().timestamp() + 86_400
    }

    fn expired() -> i64 {
        Utc::now().timestamp() - 10
    }

    fn account(
        user: &str,
        platform: Platform,
        access: &str,
        refresh: Option<&str>,
        expires_at: Option<i64>,
    ) -> LinkedAccount {
        let mut tokens = TokenSet::new(access);
        tokens.refresh_token = refresh.map(|s| s.to_string());
        tokens.expires_at = expires_at;
        LinkedAccount::from_token_set(user, platform, &tokens)
    }

    #[tokio::test]
    async fn test_fresh_token_returned_without_refresh() {
        let db = test_db().await;
        db.upsert_linked_account(&account(
            "u",
            Platform::Twitter,
            "fresh",
            Some("rt"),
            Some(far_future()),
        ))
        .await
        .unwrap();

        let mut registry = ProviderRegistry::new();
        let provider = MockProvider::with_refresh(Platform::Twitter, TokenSet::new("refreshed"));
        let counters = provider.counters();
        registry.insert(Box::new(provider));

        let mut broker = TokenBroker::new(&db, &registry);
        let token = broker.valid_token("u", Platform::Twitter).await.unwrap();

        assert_eq!(token.as_deref(), Some("fresh"));
        assert_eq!(counters.refresh_count(), 0);
    }

    #[tokio::test]
    async fn test_expired_token_refreshed_and_persisted() {
        let db = test_db().await;
        db.upsert_linked_account(&account(
            "u",
            Platform::Twitter,
            "stale",
            Some("rt-1"),
            Some(expired()),
        ))
        .await
        .unwrap();

        let mut tokens = TokenSet::new("refreshed");
        tokens.expires_at = Some(far_future());
        let provider = MockProvider::with_refresh(Platform::Twitter, tokens);
        let counters = provider.counters();
        let mut registry = ProviderRegistry::new();
        registry.insert(Box::new(provider));

        let mut broker = TokenBroker::new(&db, &registry);
        let token = broker.valid_token("u", Platform::Twitter).await.unwrap();

        assert_eq!(token.as_deref(), Some("refreshed"));
        assert_eq!(counters.refresh_count(), 1);

        // New material persisted; absent refresh token preserved the old one
        let row = db
            .get_linked_account("u", Platform::Twitter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.access_token, "refreshed");
        assert_eq!(row.refresh_token.as_deref(), Some("rt-1"));
    }

    #[tokio::test]
    async fn test_expiry_margin_treats_soon_as_expired() {
        let db = test_db().await;
        // Expires in 30 seconds, inside the 60-second margin
        db.upsert_linked_account(&account(
            "u",
            Platform::Twitter,
            "dying",
            Some("rt"),
            Some(Utc::now().timestamp() + 30),
        ))
        .await
        .unwrap();

        let provider = MockProvider::with_refresh(Platform::Twitter, TokenSet::new("refreshed"));
        let counters = provider.counters();
        let mut registry = ProviderRegistry::new();
        registry.insert(Box::new(provider));

        let mut broker = TokenBroker::new(&db, &registry);
        let token = broker.valid_token("u", Platform::Twitter).await.unwrap();

        assert_eq!(token.as_deref(), Some("refreshed"));
        assert_eq!(counters.refresh_count(), 1);
    }

    #[tokio::test]
    async fn test_cache_prevents_second_refresh() {
        let db = test_db().await;
        db.upsert_linked_account(&account(
            "u",
            Platform::Twitter,
            "stale",
            Some("rt"),
            Some(expired()),
        ))
        .await
        .unwrap();

        let provider = MockProvider::with_refresh(Platform::Twitter, TokenSet::new("refreshed"));
        let counters = provider.counters();
        let mut registry = ProviderRegistry::new();
        registry.insert(Box::new(provider));

        let mut broker = TokenBroker::new(&db, &registry);
        let first = broker.valid_token("u", Platform::Twitter).await.unwrap();
        let second = broker.valid_token("u", Platform::Twitter).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(counters.refresh_count(), 1);
    }

    #[tokio::test]
    async fn test_no_account_is_none_and_cached() {
        let db = test_db().await;
        let registry = ProviderRegistry::new();

        let mut broker = TokenBroker::new(&db, &registry);
        assert!(broker
            .valid_token("nobody", Platform::Twitter)
            .await
            .unwrap()
            .is_none());
        // Second lookup answers from cache
        assert!(broker
            .valid_token("nobody", Platform::Twitter)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_inactive_account_is_none() {
        let db = test_db().await;
        db.upsert_linked_account(&account("u", Platform::Twitter, "at", None, None))
            .await
            .unwrap();
        db.deactivate_linked_account("u", Platform::Twitter)
            .await
            .unwrap();

        let registry = ProviderRegistry::new();
        let mut broker = TokenBroker::new(&db, &registry);
        assert!(broker
            .valid_token("u", Platform::Twitter)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_expired_without_refresh_token_is_none() {
        let db = test_db().await;
        db.upsert_linked_account(&account(
            "u",
            Platform::Twitter,
            "stale",
            None,
            Some(expired()),
        ))
        .await
        .unwrap();

        let provider = MockProvider::with_refresh(Platform::Twitter, TokenSet::new("unused"));
        let counters = provider.counters();
        let mut registry = ProviderRegistry::new();
        registry.insert(Box::new(provider));

        let mut broker = TokenBroker::new(&db, &registry);
        let token = broker.valid_token("u", Platform::Twitter).await.unwrap();

        assert!(token.is_none());
        // Never reached the provider
        assert_eq!(counters.refresh_count(), 0);
    }

    #[tokio::test]
    async fn test_expired_on_non_refreshing_platform_is_none() {
        let db = test_db().await;
        db.upsert_linked_account(&account(
            "u",
            Platform::Instagram,
            "stale",
            Some("rt-never-used"),
            Some(expired()),
        ))
        .await
        .unwrap();

        let provider = MockProvider::success(Platform::Instagram);
        let counters = provider.counters();
        let mut registry = ProviderRegistry::new();
        registry.insert(Box::new(provider));

        let mut broker = TokenBroker::new(&db, &registry);
        let token = broker.valid_token("u", Platform::Instagram).await.unwrap();

        assert!(token.is_none());
        assert_eq!(counters.refresh_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_refresh_is_none_and_keeps_account_linked() {
        let db = test_db().await;
        db.upsert_linked_account(&account(
            "u",
            Platform::Twitter,
            "stale",
            Some("rt"),
            Some(expired()),
        ))
        .await
        .unwrap();

        let provider = MockProvider::refresh_failure(
            Platform::Twitter,
            ProviderError::Authentication("grant revoked".to_string()),
        );
        let counters = provider.counters();
        let mut registry = ProviderRegistry::new();
        registry.insert(Box::new(provider));

        let mut broker = TokenBroker::new(&db, &registry);
        let token = broker.valid_token("u", Platform::Twitter).await.unwrap();
        assert!(token.is_none());

        // Negative outcome cached: no second refresh attempt
        let token = broker.valid_token("u", Platform::Twitter).await.unwrap();
        assert!(token.is_none());
        assert_eq!(counters.refresh_count(), 1);

        // Failed refresh does not deactivate the row
        let row = db
            .get_linked_account("u", Platform::Twitter)
            .await
            .unwrap()
            .unwrap();
        assert!(row.is_active);
        assert_eq!(row.access_token, "stale");
    }

    #[tokio::test]
    async fn test_token_without_expiry_used_as_is() {
        let db = test_db().await;
        db.upsert_linked_account(&account("u", Platform::Twitter, "eternal", None, None))
            .await
            .unwrap();

        let registry = ProviderRegistry::new();
        let mut broker = TokenBroker::new(&db, &registry);
        let token = broker.valid_token("u", Platform::Twitter).await.unwrap();
        assert_eq!(token.as_deref(), Some("eternal"));
    }
}
