//! Core data models for Gatehouse
//!
//! An [`Identity`] is what a provider claims about the person logging in.
//! A [`User`] is the durable local account, and an [`IdentityLink`] is the
//! persisted association between the two.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A provider-asserted claim about a user, produced fresh on every login
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Issuing provider id (e.g. "google")
    pub provider: String,

    /// The provider's stable subject identifier
    pub provider_id: String,

    /// Primary email; empty when the provider declines to share it
    pub primary_email: String,

    /// Informational only, never used for matching
    pub display_name: String,

    /// True only if the provider asserts the email is verified
    pub verified: bool,
}

impl Identity {
    pub fn new(provider: impl Into<String>, provider_id: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            provider_id: provider_id.into(),
            ..Default::default()
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.primary_email = email.into();
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    pub fn verified(mut self, verified: bool) -> Self {
        self.verified = verified;
        self
    }

    /// Persisted form of this identity, owned by `user_id`
    pub fn link_to(&self, user_id: Uuid) -> IdentityLink {
        IdentityLink {
            provider: self.provider.clone(),
            provider_id: self.provider_id.clone(),
            user_id,
            display_name: self.display_name.clone(),
            primary_email: self.primary_email.clone(),
            verified: self.verified,
            created_at: Utc::now(),
        }
    }
}

/// The durable local account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Generated at creation, immutable thereafter
    pub id: Uuid,

    pub name: String,

    /// Never silently overwritten once set
    pub primary_email: String,

    /// OR across all linked identities; never reverts to false
    pub verified: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// New account seeded from a first-login identity
    pub fn from_identity(identity: &Identity) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: identity.display_name.clone(),
            primary_email: identity.primary_email.clone(),
            verified: identity.verified,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Persisted association between an identity and its owning user
///
/// `(provider, provider_id)` is unique across all links.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityLink {
    pub provider: String,
    pub provider_id: String,
    pub user_id: Uuid,
    pub display_name: String,
    pub primary_email: String,

    /// May only transition false to true
    pub verified: bool,

    pub created_at: DateTime<Utc>,
}

impl IdentityLink {
    /// Storage key for the `(provider, provider_id)` pair
    #[inline]
    pub fn key(&self) -> (String, String) {
        (self.provider.clone(), self.provider_id.clone())
    }
}
