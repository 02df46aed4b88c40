//! Account resolution
//!
//! Maps a provider [`Identity`] onto exactly one local [`User`]:
//!
//! - **known link**: the identity was seen before; the owning user is
//!   returned if both the account and the link are verified.
//! - **email match**: no link yet, but a user owns the email; the identity is
//!   linked to that user.
//! - **new user**: neither exists; the user and its first link are created in
//!   one transaction.
//!
//! The resolver performs no logging and no retries. Every store call is
//! awaited in place, so dropping the returned future (e.g. on a request
//! timeout) abandons the store work with it.

use crate::error::{LoginError, StorageError};
use crate::model::{Identity, User};
use crate::storage::{UserStore, UserTransaction};
use std::sync::Arc;

/// Resolves provider identities to local users
#[derive(Clone)]
pub struct AccountResolver {
    store: Arc<dyn UserStore>,
}

impl AccountResolver {
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self { store }
    }

    /// Find, link or create the user for `identity`
    pub async fn resolve(&self, identity: &Identity) -> Result<User, LoginError> {
        if identity.primary_email.is_empty() {
            return Err(LoginError::NoEmail);
        }
        if identity.provider.is_empty() {
            return Err(LoginError::NoProvider);
        }
        if identity.provider_id.is_empty() {
            return Err(LoginError::NoProviderId);
        }

        let link = self
            .store
            .find_identity_link(&identity.provider, &identity.provider_id)
            .await
            .map_err(|e| LoginError::database(find_identity_action(identity), e))?;

        if let Some(link) = link {
            let action = format!(
                "find user (id={}) for identity (provider={}, provider_id={})",
                link.user_id, identity.provider, identity.provider_id
            );
            let user = self
                .store
                .find_user(link.user_id)
                .await
                .map_err(|e| LoginError::database(action.clone(), e))?
                .ok_or(LoginError::UserNotFound { action })?;

            let action = format!(
                "login user (id = {}) for identity (provider = {}, provider_id = {})",
                user.id, identity.provider, identity.provider_id
            );
            if !user.verified {
                return Err(LoginError::UserEmailNotVerified {
                    user: Box::new(user),
                    action,
                });
            }
            if !link.verified {
                return Err(LoginError::UserIdentityNotVerified {
                    user: Box::new(user),
                    action,
                });
            }
            return Ok(user);
        }

        let existing = self
            .store
            .find_user_by_email(&identity.primary_email)
            .await
            .map_err(|e| {
                LoginError::database(
                    format!("find user by email (email={})", identity.primary_email),
                    e,
                )
            })?;

        match existing {
            Some(user) => self.link_existing(user, identity).await,
            None => self.create_new(identity).await,
        }
    }

    /// Link a new provider identity to an account that owns the same email
    async fn link_existing(&self, mut user: User, identity: &Identity) -> Result<User, LoginError> {
        let action = link_action(identity);
        let promote = identity.verified && !user.verified;

        let mut tx = self.begin(&action).await?;
        let outcome = async {
            tx.create_identity_link(&identity.link_to(user.id)).await?;
            if promote {
                tx.mark_user_verified(user.id).await?;
            }
            Ok::<(), StorageError>(())
        }
        .await;
        finish(tx, outcome, &action).await?;

        if promote {
            user.verified = true;
        }

        if !identity.verified {
            return Err(LoginError::UserIdentityNotVerified {
                user: Box::new(user),
                action,
            });
        }
        Ok(user)
    }

    async fn begin(&self, action: &str) -> Result<Box<dyn UserTransaction>, LoginError> {
        self.store
            .begin()
            .await
            .map_err(|e| LoginError::database(action, e))
    }

    /// Create a brand-new account together with its first identity link
    async fn create_new(&self, identity: &Identity) -> Result<User, LoginError> {
        let user = User::from_identity(identity);
        let link = identity.link_to(user.id);

        let mut tx = self.begin("begin transaction").await?;

        if let Err(e) = tx.create_user(&user).await {
            return Err(abort(tx, "create user", e).await);
        }
        if let Err(e) = tx.create_identity_link(&link).await {
            return Err(abort(tx, link_action(identity), e).await);
        }
        tx.commit()
            .await
            .map_err(|e| LoginError::database("commit", e))?;

        Ok(user)
    }

    /// Mark an identity link, and the account that owns it, as verified
    ///
    /// Backs an out-of-band confirmation step such as an emailed link.
    /// Both flags only ever move from false to true.
    pub async fn confirm_identity(
        &self,
        provider: &str,
        provider_id: &str,
    ) -> Result<User, LoginError> {
        if provider.is_empty() {
            return Err(LoginError::NoProvider);
        }
        if provider_id.is_empty() {
            return Err(LoginError::NoProviderId);
        }

        let lookup = format!(
            "find identity (provider={}, provider_id={})",
            provider, provider_id
        );
        let link = self
            .store
            .find_identity_link(provider, provider_id)
            .await
            .map_err(|e| LoginError::database(lookup.clone(), e))?
            .ok_or(LoginError::UserNotFound { action: lookup })?;

        let action = format!(
            "find user (id={}) for identity (provider={}, provider_id={})",
            link.user_id, provider, provider_id
        );
        let mut user = self
            .store
            .find_user(link.user_id)
            .await
            .map_err(|e| LoginError::database(action.clone(), e))?
            .ok_or(LoginError::UserNotFound { action })?;

        if link.verified && user.verified {
            return Ok(user);
        }

        let action = format!("verify user (id={})", user.id);
        let mut tx = self.begin(&action).await?;
        let outcome = async {
            if !link.verified {
                tx.mark_identity_verified(provider, provider_id).await?;
            }
            if !user.verified {
                tx.mark_user_verified(user.id).await?;
            }
            Ok::<(), StorageError>(())
        }
        .await;
        finish(tx, outcome, &action).await?;

        user.verified = true;
        Ok(user)
    }
}

fn find_identity_action(identity: &Identity) -> String {
    format!(
        "find identity (provider={}, provider_id={})",
        identity.provider, identity.provider_id
    )
}

fn link_action(identity: &Identity) -> String {
    format!(
        "create user-identity relation Provider={} ProviderID={}",
        identity.provider, identity.provider_id
    )
}

/// Commit on success, roll back on failure
async fn finish(
    tx: Box<dyn UserTransaction>,
    outcome: Result<(), StorageError>,
    action: &str,
) -> Result<(), LoginError> {
    match outcome {
        Ok(()) => tx
            .commit()
            .await
            .map_err(|e| LoginError::database(action, e)),
        Err(e) => Err(abort(tx, action, e).await),
    }
}

/// Roll back after `error`, noting a failed rollback in the action
async fn abort(
    tx: Box<dyn UserTransaction>,
    action: impl Into<String>,
    error: StorageError,
) -> LoginError {
    let mut action = action.into();
    if let Err(rollback) = tx.rollback().await {
        action = format!("{} (rollback failed: {})", action, rollback);
    }
    LoginError::database(action, error)
}
