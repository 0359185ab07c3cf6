//! Scheduled post dispatch
//!
//! One `run_once` call turns due unposted rows into posted rows. Failures
//! are isolated per post: a bad credential or rejected payload is recorded
//! in the report and the batch keeps going.

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::db::Database;
use crate::error::{ProviderError, Result};
use crate::providers::ProviderRegistry;
use crate::tokens::TokenBroker;
use crate::types::ScheduledPost;

/// Aggregate outcome of one dispatch batch
#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatchReport {
    pub processed: usize,
    pub successful: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

impl DispatchReport {
    pub fn message(&self) -> String {
        format!(
            "processed {} post(s): {} successful, {} failed",
            self.processed, self.successful, self.failed
        )
    }
}

enum PostOutcome {
    Published(String),
    /// A concurrent invocation published this row first
    AlreadyPosted,
}

pub struct Dispatcher {
    db: Database,
    registry: ProviderRegistry,
}

impl Dispatcher {
    pub fn new(db: Database, registry: ProviderRegistry) -> Self {
        Self { db, registry }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Run one dispatch batch over everything currently due.
    ///
    /// Only a batch-level database failure returns Err; per-post failures
    /// land in the report.
    pub async fn run_once(&self) -> Result<DispatchReport> {
        let now = Utc::now().timestamp();
        let due = self.db.due_posts(now).await?;

        let mut report = DispatchReport::default();
        if due.is_empty() {
            debug!("no posts due");
            return Ok(report);
        }

        info!("found {} due post(s)", due.len());
        let mut broker = TokenBroker::new(&self.db, &self.registry);

        for post in due {
            report.processed += 1;
            match self.process_post(&mut broker, &post).await {
                Ok(PostOutcome::Published(provider_post_id)) => {
                    info!(
                        "published post {} to {} as {}",
                        post.id, post.platform, provider_post_id
                    );
                    report.successful += 1;
                }
                Ok(PostOutcome::AlreadyPosted) => {
                    debug!("post {} already published by another run", post.id);
                    report.successful += 1;
                }
                Err(e) => {
                    warn!("post {} to {} failed: {}", post.id, post.platform, e);
                    report.failed += 1;
                    report.errors.push(format!(
                        "post {} ({} for user {}): {}",
                        post.id, post.platform, post.user_id, e
                    ));
                }
            }
        }

        info!("{}", report.message());
        Ok(report)
    }

    async fn process_post(
        &self,
        broker: &mut TokenBroker<'_>,
        post: &ScheduledPost,
    ) -> Result<PostOutcome> {
        let provider = self.registry.get(post.platform).ok_or_else(|| {
            ProviderError::NotSupported(format!(
                "no provider configured for {}",
                post.platform
            ))
        })?;

        let token = broker
            .valid_token(&post.user_id, post.platform)
            .await?
            .ok_or_else(|| {
                ProviderError::Authentication(format!(
                    "no usable {} credential; the account needs to be reconnected",
                    post.platform
                ))
            })?;

        // An overlapping invocation may have won the race since the due
        // query ran
        if self.db.is_posted(&post.id).await? {
            return Ok(PostOutcome::AlreadyPosted);
        }

        provider.validate_content(post)?;
        let provider_post_id = provider.publish(&token, post).await?;

        if !self.db.mark_posted(&post.id, &provider_post_id).await? {
            warn!(
                "post {} was published to {} twice; lost the mark race after publishing as {}",
                post.id, post.platform, provider_post_id
            );
        }

        Ok(PostOutcome::Published(provider_post_id))
    }
}
