//! Storage backends for Gatehouse
//!
//! Provides the user store consumed by the account resolver and the
//! short-lived key-value store used during OAuth handshakes, each with
//! in-memory and SQLite implementations.

pub mod memory;
pub mod sql_common;
pub mod sqlite;

use crate::error::StorageError;
use crate::model::{IdentityLink, User};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Persistent users and their identity links
///
/// Implementations must enforce uniqueness of `(provider, provider_id)` on
/// identity links and of `primary_email` on users, reporting violations as
/// [`StorageError::Duplicate`].
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Find the identity link for a provider subject
    async fn find_identity_link(
        &self,
        provider: &str,
        provider_id: &str,
    ) -> StorageResult<Option<IdentityLink>>;

    /// Get a user by ID
    async fn find_user(&self, id: Uuid) -> StorageResult<Option<User>>;

    /// Get a user by primary email (exact match)
    async fn find_user_by_email(&self, email: &str) -> StorageResult<Option<User>>;

    /// Insert a user outside of any transaction
    async fn create_user(&self, user: &User) -> StorageResult<()>;

    /// Insert an identity link outside of any transaction
    async fn create_identity_link(&self, link: &IdentityLink) -> StorageResult<()>;

    /// List the identity links owned by a user
    async fn list_identity_links(&self, user_id: Uuid) -> StorageResult<Vec<IdentityLink>>;

    /// Start a transaction for multi-statement writes
    async fn begin(&self) -> StorageResult<Box<dyn UserTransaction>>;
}

/// Writes that either all apply on [`commit`](UserTransaction::commit) or not at all
///
/// Dropping a transaction without committing discards its writes.
#[async_trait]
pub trait UserTransaction: Send {
    async fn create_user(&mut self, user: &User) -> StorageResult<()>;

    async fn create_identity_link(&mut self, link: &IdentityLink) -> StorageResult<()>;

    /// Set a user's verified flag. Never clears it.
    async fn mark_user_verified(&mut self, user_id: Uuid) -> StorageResult<()>;

    /// Set an identity link's verified flag. Never clears it.
    async fn mark_identity_verified(
        &mut self,
        provider: &str,
        provider_id: &str,
    ) -> StorageResult<()>;

    async fn commit(self: Box<Self>) -> StorageResult<()>;

    async fn rollback(self: Box<Self>) -> StorageResult<()>;
}

/// Key-value store with per-key expiry for transient handshake state
///
/// Values are consumed at most once: [`take`](EphemeralStore::take) removes
/// the entry atomically, and expired entries are never returned.
#[async_trait]
pub trait EphemeralStore: Send + Sync {
    /// Store a value under `key` for `ttl`, replacing any previous value
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> StorageResult<()>;

    /// Remove and return the value under `key` if present and unexpired
    async fn take(&self, key: &str) -> StorageResult<Option<String>>;

    /// Drop all expired entries, returning how many were removed
    async fn purge_expired(&self) -> StorageResult<usize>;
}

/// The stores backing one Gatehouse instance
#[derive(Clone)]
pub struct StorageBackend {
    pub users: Arc<dyn UserStore>,
    pub ephemeral: Arc<dyn EphemeralStore>,
}

impl StorageBackend {
    /// Use one value for both stores
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: UserStore + EphemeralStore + 'static,
    {
        Self {
            users: store.clone(),
            ephemeral: store,
        }
    }
}

pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;

/// Create a storage backend from configuration
pub async fn create_storage_from_config(
    config: &crate::config::StorageConfig,
) -> crate::Result<StorageBackend> {
    match config.driver.as_str() {
        "memory" => Ok(StorageBackend::shared(Arc::new(MemoryStorage::new()))),
        "sqlite" => Ok(StorageBackend::shared(Arc::new(
            SqliteStorage::new(&config.dsn).await?,
        ))),
        _ => Err(crate::GatehouseError::config(format!(
            "Unknown storage driver: {}. Supported: memory, sqlite",
            config.driver
        ))),
    }
}

#[cfg(test)]
mod memory_test;
#[cfg(test)]
mod storage_test;
