//! Database operations for Crosscast

use chrono::Utc;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::path::Path;

use crate::error::{DbError, Result};
use crate::types::{LinkedAccount, Platform, ScheduledPost};

/// A pending OAuth authorization, keyed by the anti-forgery state value.
#[derive(Debug, Clone)]
pub struct AuthState {
    pub user_id: String,
    pub platform: Platform,
    pub code_verifier: Option<String>,
}

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection
    pub async fn new(db_path: &str) -> Result<Self> {
        let pool = if db_path == ":memory:" {
            // Every pooled connection to :memory: is its own database, so
            // the pool must hold exactly one connection and never recycle it
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect("sqlite::memory:")
                .await
                .map_err(DbError::SqlxError)?
        } else {
            // Expand path and create parent directories
            let expanded_path = shellexpand::tilde(db_path).to_string();
            let path = Path::new(&expanded_path);

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(DbError::IoError)?;
            }

            // mode=rwc creates the database file if it doesn't exist
            let db_url = format!("sqlite://{}?mode=rwc", expanded_path.replace('\\', "/"));
            SqlitePool::connect(&db_url)
                .await
                .map_err(DbError::SqlxError)?
        };

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(DbError::MigrationError)?;

        Ok(Self { pool })
    }

    // ------------------------------------------------------------------
    // Linked accounts
    // ------------------------------------------------------------------

    /// Insert or overwrite the credential set for one (user, platform).
    ///
    /// Reconnecting a previously disconnected account re-activates the row.
    pub async fn upsert_linked_account(&self, account: &LinkedAccount) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO linked_accounts
                (user_id, platform, account_id, account_username, access_token,
                 refresh_token, token_expires_at, is_active, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, 1, ?, ?)
            ON CONFLICT(user_id, platform) DO UPDATE SET
                account_id = excluded.account_id,
                account_username = excluded.account_username,
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                token_expires_at = excluded.token_expires_at,
                is_active = 1,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&account.user_id)
        .bind(account.platform.as_str())
        .bind(&account.account_id)
        .bind(&account.account_username)
        .bind(&account.access_token)
        .bind(&account.refresh_token)
        .bind(account.token_expires_at)
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Fetch the account row for one (user, platform), active or not
    pub async fn get_linked_account(
        &self,
        user_id: &str,
        platform: Platform,
    ) -> Result<Option<LinkedAccount>> {
        let row = sqlx::query(
            r#"
            SELECT user_id, platform, account_id, account_username, access_token,
                   refresh_token, token_expires_at, is_active, created_at, updated_at
            FROM linked_accounts
            WHERE user_id = ? AND platform = ?
            "#,
        )
        .bind(user_id)
        .bind(platform.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        row.map(|r| account_from_row(&r)).transpose()
    }

    /// Store refreshed token material.
    ///
    /// A refresh response without a new refresh token keeps the stored one.
    pub async fn update_account_tokens(
        &self,
        user_id: &str,
        platform: Platform,
        access_token: &str,
        refresh_token: Option<&str>,
        token_expires_at: Option<i64>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE linked_accounts
            SET access_token = ?,
                refresh_token = COALESCE(?, refresh_token),
                token_expires_at = ?,
                updated_at = ?
            WHERE user_id = ? AND platform = ?
            "#,
        )
        .bind(access_token)
        .bind(refresh_token)
        .bind(token_expires_at)
        .bind(Utc::now().timestamp())
        .bind(user_id)
        .bind(platform.as_str())
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Soft-delete: flip is_active off, keep the row.
    ///
    /// Returns false when there is no active row to disconnect.
    pub async fn deactivate_linked_account(
        &self,
        user_id: &str,
        platform: Platform,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE linked_accounts
            SET is_active = 0, updated_at = ?
            WHERE user_id = ? AND platform = ? AND is_active = 1
            "#,
        )
        .bind(Utc::now().timestamp())
        .bind(user_id)
        .bind(platform.as_str())
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() > 0)
    }

    /// List account rows, optionally filtered to one user
    pub async fn list_linked_accounts(&self, user_id: Option<&str>) -> Result<Vec<LinkedAccount>> {
        let rows = match user_id {
            Some(user) => {
                sqlx::query(
                    r#"
                    SELECT user_id, platform, account_id, account_username, access_token,
                           refresh_token, token_expires_at, is_active, created_at, updated_at
                    FROM linked_accounts
                    WHERE user_id = ?
                    ORDER BY user_id, platform
                    "#,
                )
                .bind(user)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT user_id, platform, account_id, account_username, access_token,
                           refresh_token, token_expires_at, is_active, created_at, updated_at
                    FROM linked_accounts
                    ORDER BY user_id, platform
                    "#,
                )
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(DbError::SqlxError)?;

        rows.iter().map(account_from_row).collect()
    }

    // ------------------------------------------------------------------
    // Scheduled posts
    // ------------------------------------------------------------------

    pub async fn create_scheduled_post(&self, post: &ScheduledPost) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO scheduled_posts
                (id, user_id, client_id, platform, content, media_url,
                 scheduled_for, posted, provider_post_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&post.id)
        .bind(&post.user_id)
        .bind(&post.client_id)
        .bind(post.platform.as_str())
        .bind(&post.content)
        .bind(&post.media_url)
        .bind(post.scheduled_for)
        .bind(post.posted)
        .bind(&post.provider_post_id)
        .bind(post.created_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn get_scheduled_post(&self, post_id: &str) -> Result<Option<ScheduledPost>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, client_id, platform, content, media_url,
                   scheduled_for, posted, provider_post_id, created_at
            FROM scheduled_posts WHERE id = ?
            "#,
        )
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        row.map(|r| post_from_row(&r)).transpose()
    }

    /// All unposted rows whose scheduled time has passed, oldest first
    pub async fn due_posts(&self, now: i64) -> Result<Vec<ScheduledPost>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, client_id, platform, content, media_url,
                   scheduled_for, posted, provider_post_id, created_at
            FROM scheduled_posts
            WHERE posted = 0 AND scheduled_for <= ?
            ORDER BY scheduled_for ASC
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter().map(post_from_row).collect()
    }

    /// Flip posted on, conditionally.
    ///
    /// The WHERE posted = 0 guard makes the transition happen exactly once
    /// even when two dispatch invocations race on the same row. Returns true
    /// when this caller performed the transition.
    pub async fn mark_posted(&self, post_id: &str, provider_post_id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE scheduled_posts
            SET posted = 1, provider_post_id = ?
            WHERE id = ? AND posted = 0
            "#,
        )
        .bind(provider_post_id)
        .bind(post_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    /// Fresh read of the posted flag. A missing row reads as posted so the
    /// dispatch path never publishes for a row it cannot see.
    pub async fn is_posted(&self, post_id: &str) -> Result<bool> {
        let row = sqlx::query("SELECT posted FROM scheduled_posts WHERE id = ?")
            .bind(post_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(match row {
            Some(r) => r.get::<bool, _>("posted"),
            None => true,
        })
    }

    /// Delete an unposted row. Returns false when the post is already
    /// published or does not exist.
    pub async fn cancel_scheduled_post(&self, post_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM scheduled_posts WHERE id = ? AND posted = 0")
            .bind(post_id)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() > 0)
    }

    /// List scheduled posts, newest-due last
    pub async fn list_scheduled_posts(
        &self,
        user_id: Option<&str>,
        include_posted: bool,
        limit: usize,
    ) -> Result<Vec<ScheduledPost>> {
        let posted_clause = if include_posted { "" } else { "AND posted = 0" };
        let user_clause = if user_id.is_some() {
            "AND user_id = ?"
        } else {
            ""
        };

        let sql = format!(
            r#"
            SELECT id, user_id, client_id, platform, content, media_url,
                   scheduled_for, posted, provider_post_id, created_at
            FROM scheduled_posts
            WHERE 1 = 1 {} {}
            ORDER BY scheduled_for ASC
            LIMIT ?
            "#,
            posted_clause, user_clause
        );

        let mut query = sqlx::query(&sql);
        if let Some(user) = user_id {
            query = query.bind(user);
        }
        let rows = query
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        rows.iter().map(post_from_row).collect()
    }

    // ------------------------------------------------------------------
    // OAuth states
    // ------------------------------------------------------------------

    pub async fn save_auth_state(
        &self,
        state: &str,
        user_id: &str,
        platform: Platform,
        code_verifier: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO oauth_states (state, user_id, platform, code_verifier, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(state)
        .bind(user_id)
        .bind(platform.as_str())
        .bind(code_verifier)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Consume a pending authorization. Single-use: the row is deleted on
    /// read, so a replayed state finds nothing.
    pub async fn take_auth_state(&self, state: &str) -> Result<Option<AuthState>> {
        let row = sqlx::query(
            "SELECT user_id, platform, code_verifier FROM oauth_states WHERE state = ?",
        )
        .bind(state)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        let Some(row) = row else {
            return Ok(None);
        };

        sqlx::query("DELETE FROM oauth_states WHERE state = ?")
            .bind(state)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        let platform: Platform = row.get::<String, _>("platform").parse()?;
        Ok(Some(AuthState {
            user_id: row.get("user_id"),
            platform,
            code_verifier: row.get("code_verifier"),
        }))
    }
}

fn account_from_row(row: &SqliteRow) -> Result<LinkedAccount> {
    let platform: Platform = row.get::<String, _>("platform").parse()?;
    Ok(LinkedAccount {
        user_id: row.get("user_id"),
        platform,
        account_id: row.get("account_id"),
        account_username: row.get("account_username"),
        access_token: row.get("access_token"),
        refresh_token: row.get("refresh_token"),
        token_expires_at: row.get("token_expires_at"),
        is_active: row.get("is_active"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn post_from_row(row: &SqliteRow) -> Result<ScheduledPost> {
    let platform: Platform = row.get::<String, _>("platform").parse()?;
    Ok(ScheduledPost {
        id: row.get("id"),
        user_id: row.get("user_id"),
        client_id: row.get("client_id"),
        platform,
        content: row.get("content"),
        media_url: row.get("media_url"),
        scheduled_for: row.get("scheduled_for"),
        posted: row.get("posted"),
        provider_post_id: row.get("provider_post_id"),
        created_at: row.get("created_at"),
    })
}
