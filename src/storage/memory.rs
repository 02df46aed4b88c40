//! In-memory storage implementation
//!
//! Fast, non-persistent storage for development and testing.
//!
//! Users and identity links share one `RwLock` so a transaction commit
//! validates and applies all of its writes under a single write guard.
//! Handshake entries live in a separate `DashMap`.
//!
//! **WARNING:** MemoryStorage is NOT recommended for production use:
//! - Data is lost on process restart
//! - Does not coordinate state across multiple process instances
//!
//! For production deployments, use SqliteStorage.

use super::*;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Instant;

#[derive(Default, Clone)]
struct Tables {
    users: HashMap<Uuid, User>,
    // primary_email -> user id
    emails: HashMap<String, Uuid>,
    links: HashMap<(String, String), IdentityLink>,
}

impl Tables {
    fn insert_user(&mut self, user: &User) -> StorageResult<()> {
        if self.users.contains_key(&user.id) {
            return Err(StorageError::Duplicate(format!("users.id {}", user.id)));
        }
        if self.emails.contains_key(&user.primary_email) {
            return Err(StorageError::Duplicate(format!(
                "users.primary_email {}",
                user.primary_email
            )));
        }
        self.emails.insert(user.primary_email.clone(), user.id);
        self.users.insert(user.id, user.clone());
        Ok(())
    }

    fn insert_link(&mut self, link: &IdentityLink) -> StorageResult<()> {
        if !self.users.contains_key(&link.user_id) {
            return Err(StorageError::Database(format!(
                "foreign key violation: no user {}",
                link.user_id
            )));
        }
        let key = link.key();
        if self.links.contains_key(&key) {
            return Err(StorageError::Duplicate(format!(
                "identity_links ({}, {})",
                key.0, key.1
            )));
        }
        self.links.insert(key, link.clone());
        Ok(())
    }

    fn apply(&mut self, op: &PendingWrite) -> StorageResult<()> {
        match op {
            PendingWrite::User(user) => self.insert_user(user),
            PendingWrite::Link(link) => self.insert_link(link),
            PendingWrite::VerifyUser(id) => {
                let user = self
                    .users
                    .get_mut(id)
                    .ok_or_else(|| StorageError::Database(format!("no user {}", id)))?;
                user.verified = true;
                user.updated_at = chrono::Utc::now();
                Ok(())
            }
            PendingWrite::VerifyLink(key) => {
                let link = self.links.get_mut(key).ok_or_else(|| {
                    StorageError::Database(format!("no identity link ({}, {})", key.0, key.1))
                })?;
                link.verified = true;
                Ok(())
            }
        }
    }
}

enum PendingWrite {
    User(User),
    Link(IdentityLink),
    VerifyUser(Uuid),
    VerifyLink((String, String)),
}

/// In-memory storage implementation
#[derive(Clone)]
pub struct MemoryStorage {
    tables: Arc<RwLock<Tables>>,
    ephemeral: Arc<DashMap<String, (String, Instant)>>,
}

impl MemoryStorage {
    /// Create a new in-memory storage
    pub fn new() -> Self {
        Self {
            tables: Arc::new(RwLock::new(Tables::default())),
            ephemeral: Arc::new(DashMap::new()),
        }
    }

    /// Number of stored users and identity links
    pub fn counts(&self) -> (usize, usize) {
        let tables = self.tables.read();
        (tables.users.len(), tables.links.len())
    }

    /// Remove a user row without touching its identity links
    #[cfg(test)]
    pub(crate) fn remove_user_row(&self, id: Uuid) {
        let mut tables = self.tables.write();
        if let Some(user) = tables.users.remove(&id) {
            tables.emails.remove(&user.primary_email);
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserStore for MemoryStorage {
    async fn find_identity_link(
        &self,
        provider: &str,
        provider_id: &str,
    ) -> StorageResult<Option<IdentityLink>> {
        let key = (provider.to_string(), provider_id.to_string());
        Ok(self.tables.read().links.get(&key).cloned())
    }

    async fn find_user(&self, id: Uuid) -> StorageResult<Option<User>> {
        Ok(self.tables.read().users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StorageResult<Option<User>> {
        let tables = self.tables.read();
        Ok(tables
            .emails
            .get(email)
            .and_then(|id| tables.users.get(id))
            .cloned())
    }

    async fn create_user(&self, user: &User) -> StorageResult<()> {
        self.tables.write().insert_user(user)
    }

    async fn create_identity_link(&self, link: &IdentityLink) -> StorageResult<()> {
        self.tables.write().insert_link(link)
    }

    async fn list_identity_links(&self, user_id: Uuid) -> StorageResult<Vec<IdentityLink>> {
        let mut links: Vec<IdentityLink> = self
            .tables
            .read()
            .links
            .values()
            .filter(|l| l.user_id == user_id)
            .cloned()
            .collect();
        links.sort_unstable_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(links)
    }

    async fn begin(&self) -> StorageResult<Box<dyn UserTransaction>> {
        Ok(Box::new(MemoryTransaction {
            tables: self.tables.clone(),
            pending: Vec::new(),
        }))
    }
}

/// Buffers writes until commit, then applies them all or none
struct MemoryTransaction {
    tables: Arc<RwLock<Tables>>,
    pending: Vec<PendingWrite>,
}

#[async_trait]
impl UserTransaction for MemoryTransaction {
    async fn create_user(&mut self, user: &User) -> StorageResult<()> {
        self.pending.push(PendingWrite::User(user.clone()));
        Ok(())
    }

    async fn create_identity_link(&mut self, link: &IdentityLink) -> StorageResult<()> {
        self.pending.push(PendingWrite::Link(link.clone()));
        Ok(())
    }

    async fn mark_user_verified(&mut self, user_id: Uuid) -> StorageResult<()> {
        self.pending.push(PendingWrite::VerifyUser(user_id));
        Ok(())
    }

    async fn mark_identity_verified(
        &mut self,
        provider: &str,
        provider_id: &str,
    ) -> StorageResult<()> {
        self.pending.push(PendingWrite::VerifyLink((
            provider.to_string(),
            provider_id.to_string(),
        )));
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StorageResult<()> {
        let mut tables = self.tables.write();

        // Apply to a scratch copy first so a failing write leaves nothing behind
        let mut staged = tables.clone();
        for op in &self.pending {
            staged.apply(op)?;
        }
        *tables = staged;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StorageResult<()> {
        Ok(())
    }
}

#[async_trait]
impl EphemeralStore for MemoryStorage {
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> StorageResult<()> {
        self.ephemeral
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn take(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self
            .ephemeral
            .remove(key)
            .filter(|(_, (_, expires_at))| Instant::now() < *expires_at)
            .map(|(_, (value, _))| value))
    }

    async fn purge_expired(&self) -> StorageResult<usize> {
        let now = Instant::now();
        let before = self.ephemeral.len();
        self.ephemeral.retain(|_, (_, expires_at)| now < *expires_at);
        Ok(before.saturating_sub(self.ephemeral.len()))
    }
}
