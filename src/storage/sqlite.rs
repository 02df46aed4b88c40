//! SQLite storage implementation
//!
//! Provides persistent storage for users, identity links and handshake
//! state using SQLite.

use crate::error::StorageError;
use crate::model::{IdentityLink, User};
use crate::storage::{
    EphemeralStore, StorageResult, UserStore, UserTransaction, sql_common::*,
};
use crate::{GatehouseError, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{Sqlite, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

/// SQLite storage backend
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Create a new SQLite storage
    ///
    /// # Arguments
    /// * `dsn` - Database path (e.g., ".gatehouse/gatehouse.db" or ":memory:" for in-memory)
    pub async fn new(dsn: &str) -> Result<Self> {
        let connection_string = if dsn.starts_with("sqlite:") {
            dsn.to_string()
        } else {
            format!("sqlite:{}", dsn)
        };

        let file_path = dsn.strip_prefix("sqlite:").unwrap_or(dsn);
        let file_path = file_path.split('?').next().unwrap_or(file_path);

        if file_path.contains("..") {
            return Err(GatehouseError::config(
                "Database path cannot contain '..' (path traversal not allowed)",
            ));
        }

        if file_path != ":memory:"
            && let Some(parent) = Path::new(file_path).parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Pragmas are applied on every pooled connection, not just the first
        let options = SqliteConnectOptions::from_str(&connection_string)
            .map_err(|e| GatehouseError::config(format!("Invalid SQLite DSN {}: {}", dsn, e)))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5))
            .foreign_keys(true);

        // Every connection to ":memory:" opens its own empty database, so an
        // in-memory store is pinned to a single connection that never expires
        let pool_options = if file_path == ":memory:" {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new()
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| GatehouseError::storage(format!("Failed to connect to SQLite: {}", e)))?;

        sqlx::migrate!("./migrations/sqlite")
            .run(&pool)
            .await
            .map_err(|e| GatehouseError::storage(format!("Failed to run migrations: {}", e)))?;

        Ok(Self { pool })
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

async fn insert_user<'e, E>(executor: E, user: &User) -> StorageResult<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        "INSERT INTO users (id, name, primary_email, verified, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(user.id.to_string())
    .bind(&user.name)
    .bind(&user.primary_email)
    .bind(user.verified as i64)
    .bind(datetime_to_unix(user.created_at))
    .bind(datetime_to_unix(user.updated_at))
    .execute(executor)
    .await?;
    Ok(())
}

async fn insert_link<'e, E>(executor: E, link: &IdentityLink) -> StorageResult<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        "INSERT INTO identity_links
            (provider, provider_id, user_id, display_name, primary_email, verified, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&link.provider)
    .bind(&link.provider_id)
    .bind(link.user_id.to_string())
    .bind(&link.display_name)
    .bind(&link.primary_email)
    .bind(link.verified as i64)
    .bind(datetime_to_unix(link.created_at))
    .execute(executor)
    .await?;
    Ok(())
}

#[async_trait]
impl UserStore for SqliteStorage {
    async fn find_identity_link(
        &self,
        provider: &str,
        provider_id: &str,
    ) -> StorageResult<Option<IdentityLink>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM identity_links WHERE provider = ? AND provider_id = ?",
            LINK_COLUMNS
        ))
        .bind(provider)
        .bind(provider_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(parse_link).transpose()
    }

    async fn find_user(&self, id: Uuid) -> StorageResult<Option<User>> {
        let row = sqlx::query(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(parse_user).transpose()
    }

    async fn find_user_by_email(&self, email: &str) -> StorageResult<Option<User>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM users WHERE primary_email = ?",
            USER_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(parse_user).transpose()
    }

    async fn create_user(&self, user: &User) -> StorageResult<()> {
        insert_user(&self.pool, user).await
    }

    async fn create_identity_link(&self, link: &IdentityLink) -> StorageResult<()> {
        insert_link(&self.pool, link).await
    }

    async fn list_identity_links(&self, user_id: Uuid) -> StorageResult<Vec<IdentityLink>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM identity_links WHERE user_id = ? ORDER BY created_at ASC",
            LINK_COLUMNS
        ))
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(parse_link).collect()
    }

    async fn begin(&self) -> StorageResult<Box<dyn UserTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(SqliteTransaction { tx }))
    }
}

/// A database transaction; rolled back by sqlx when dropped uncommitted
struct SqliteTransaction {
    tx: sqlx::Transaction<'static, Sqlite>,
}

#[async_trait]
impl UserTransaction for SqliteTransaction {
    async fn create_user(&mut self, user: &User) -> StorageResult<()> {
        insert_user(&mut *self.tx, user).await
    }

    async fn create_identity_link(&mut self, link: &IdentityLink) -> StorageResult<()> {
        insert_link(&mut *self.tx, link).await
    }

    async fn mark_user_verified(&mut self, user_id: Uuid) -> StorageResult<()> {
        let result = sqlx::query("UPDATE users SET verified = 1, updated_at = ? WHERE id = ?")
            .bind(datetime_to_unix(Utc::now()))
            .bind(user_id.to_string())
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::Database(format!(
                "no user {}",
                user_id
            )));
        }
        Ok(())
    }

    async fn mark_identity_verified(
        &mut self,
        provider: &str,
        provider_id: &str,
    ) -> StorageResult<()> {
        let result = sqlx::query(
            "UPDATE identity_links SET verified = 1 WHERE provider = ? AND provider_id = ?",
        )
        .bind(provider)
        .bind(provider_id)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::Database(format!(
                "no identity link ({}, {})",
                provider, provider_id
            )));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StorageResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StorageResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

#[async_trait]
impl EphemeralStore for SqliteStorage {
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> StorageResult<()> {
        let expires_at = now_millis().saturating_add(ttl.as_millis() as i64);
        sqlx::query(
            "INSERT INTO ephemeral_entries (key, value, expires_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                expires_at = excluded.expires_at",
        )
        .bind(key)
        .bind(value)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn take(&self, key: &str) -> StorageResult<Option<String>> {
        // Delete unconditionally so an expired entry is also cleared, then
        // only hand back the value if it was still live
        let row: Option<(String, i64)> = sqlx::query_as(
            "DELETE FROM ephemeral_entries WHERE key = ? RETURNING value, expires_at",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row
            .filter(|(_, expires_at)| *expires_at > now_millis())
            .map(|(value, _)| value))
    }

    async fn purge_expired(&self) -> StorageResult<usize> {
        let result = sqlx::query("DELETE FROM ephemeral_entries WHERE expires_at <= ?")
            .bind(now_millis())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as usize)
    }
}
