//! Identity providers
//!
//! Every supported provider is described by a [`ProviderDescriptor`]: where
//! its profile lives, which JSON fields carry the subject id, email and
//! name, and how far its email claim can be trusted. One generic
//! [`DescriptorNormalizer`] turns any descriptor plus an authenticated
//! [`ApiClient`] into a canonical [`Identity`].

pub mod client;
pub mod oauth1;

pub use client::{ApiClient, BearerClient, SignedClient};
pub use oauth1::{OAuth1Consumer, OAuth1Signer, TokenPair};

use crate::config::{EndpointOverrides, ProviderConfig};
use crate::constants::*;
use crate::error::NetworkError;
use crate::model::Identity;
use crate::{GatehouseError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Supported login providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Google,
    Facebook,
    Github,
    Twitter,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 4] = [
        ProviderKind::Google,
        ProviderKind::Facebook,
        ProviderKind::Github,
        ProviderKind::Twitter,
    ];

    /// Stable id used in routes, config and identity links
    pub fn id(self) -> &'static str {
        match self {
            ProviderKind::Google => "google",
            ProviderKind::Facebook => "facebook",
            ProviderKind::Github => "github",
            ProviderKind::Twitter => "twitter",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            ProviderKind::Google => "Google",
            ProviderKind::Facebook => "Facebook",
            ProviderKind::Github => "GitHub",
            ProviderKind::Twitter => "Twitter",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.id() == id)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// How the user is sent to the provider and back
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handshake {
    OAuth2 {
        auth_url: String,
        token_url: String,
        scopes: Vec<String>,
    },
    OAuth1 {
        request_token_url: String,
        authorize_url: String,
        access_token_url: String,
    },
}

/// How much the provider's email claim is worth
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationPolicy {
    /// A boolean field in the profile response
    Field(String),
    /// A separate email list; the primary entry carries its own flag
    EmailList { url: String },
    /// The provider makes no claim; identities are never verified
    Unverifiable,
}

/// Everything needed to log in with and normalize one provider
#[derive(Debug, Clone)]
pub struct ProviderDescriptor {
    pub kind: ProviderKind,
    pub handshake: Handshake,
    pub profile_url: String,
    pub id_field: String,
    pub email_field: String,
    pub name_field: String,
    pub verification: VerificationPolicy,
    /// Treat every email from this provider as verified
    pub trust_email: bool,
}

impl ProviderDescriptor {
    /// Built-in descriptor for a provider
    pub fn builtin(kind: ProviderKind) -> Self {
        match kind {
            ProviderKind::Google => Self {
                kind,
                handshake: Handshake::OAuth2 {
                    auth_url: GOOGLE_AUTH_URL.to_string(),
                    token_url: GOOGLE_TOKEN_URL.to_string(),
                    scopes: vec![
                        "https://www.googleapis.com/auth/userinfo.email".to_string(),
                        "https://www.googleapis.com/auth/userinfo.profile".to_string(),
                    ],
                },
                profile_url: GOOGLE_USERINFO_URL.to_string(),
                id_field: "id".to_string(),
                email_field: "email".to_string(),
                name_field: "name".to_string(),
                verification: VerificationPolicy::Field("verified_email".to_string()),
                trust_email: false,
            },
            ProviderKind::Facebook => Self {
                kind,
                handshake: Handshake::OAuth2 {
                    auth_url: FACEBOOK_AUTH_URL.to_string(),
                    token_url: FACEBOOK_TOKEN_URL.to_string(),
                    scopes: vec!["email".to_string()],
                },
                profile_url: FACEBOOK_PROFILE_URL.to_string(),
                id_field: "id".to_string(),
                email_field: "email".to_string(),
                name_field: "name".to_string(),
                verification: VerificationPolicy::Unverifiable,
                trust_email: false,
            },
            ProviderKind::Github => Self {
                kind,
                handshake: Handshake::OAuth2 {
                    auth_url: GITHUB_AUTH_URL.to_string(),
                    token_url: GITHUB_TOKEN_URL.to_string(),
                    scopes: vec!["user:email".to_string()],
                },
                profile_url: GITHUB_USER_URL.to_string(),
                id_field: "id".to_string(),
                email_field: "email".to_string(),
                name_field: "name".to_string(),
                verification: VerificationPolicy::EmailList {
                    url: GITHUB_EMAILS_URL.to_string(),
                },
                trust_email: false,
            },
            ProviderKind::Twitter => Self {
                kind,
                handshake: Handshake::OAuth1 {
                    request_token_url: TWITTER_REQUEST_TOKEN_URL.to_string(),
                    authorize_url: TWITTER_AUTHORIZE_URL.to_string(),
                    access_token_url: TWITTER_ACCESS_TOKEN_URL.to_string(),
                },
                profile_url: TWITTER_VERIFY_CREDENTIALS_URL.to_string(),
                id_field: "id_str".to_string(),
                email_field: "email".to_string(),
                name_field: "name".to_string(),
                verification: VerificationPolicy::Unverifiable,
                trust_email: false,
            },
        }
    }

    /// Built-in descriptor adjusted by a configured provider entry
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        let kind = ProviderKind::from_id(&config.id).ok_or_else(|| {
            GatehouseError::config(format!("Unknown provider: {}", config.id))
        })?;
        let mut descriptor = Self::builtin(kind);
        descriptor.trust_email = config.trust_email;
        descriptor.apply_overrides(&config.endpoints);
        if let (Some(scopes), Handshake::OAuth2 { scopes: current, .. }) =
            (&config.scopes, &mut descriptor.handshake)
        {
            *current = scopes.clone();
        }
        Ok(descriptor)
    }

    fn apply_overrides(&mut self, overrides: &EndpointOverrides) {
        fn set(target: &mut String, value: &Option<String>) {
            if let Some(value) = value {
                *target = value.clone();
            }
        }

        set(&mut self.profile_url, &overrides.userinfo_url);
        if let VerificationPolicy::EmailList { url } = &mut self.verification {
            set(url, &overrides.emails_url);
        }
        match &mut self.handshake {
            Handshake::OAuth2 {
                auth_url,
                token_url,
                ..
            } => {
                set(auth_url, &overrides.auth_url);
                set(token_url, &overrides.token_url);
            }
            Handshake::OAuth1 {
                request_token_url,
                authorize_url,
                access_token_url,
            } => {
                set(request_token_url, &overrides.request_token_url);
                set(authorize_url, &overrides.authorize_url);
                set(access_token_url, &overrides.access_token_url);
            }
        }
    }
}

/// Turns an authenticated provider session into a canonical [`Identity`]
#[async_trait]
pub trait Normalizer: Send + Sync {
    fn provider(&self) -> ProviderKind;

    /// Fetch the profile through `client` and map it onto an identity
    ///
    /// Fails on network or decoding errors; never returns a partial identity.
    async fn normalize(&self, client: &dyn ApiClient) -> Result<Identity>;
}

/// The one normalizer implementation, driven entirely by its descriptor
#[derive(Debug, Clone)]
pub struct DescriptorNormalizer {
    descriptor: Arc<ProviderDescriptor>,
}

impl DescriptorNormalizer {
    pub fn new(descriptor: Arc<ProviderDescriptor>) -> Self {
        Self { descriptor }
    }
}

#[async_trait]
impl Normalizer for DescriptorNormalizer {
    fn provider(&self) -> ProviderKind {
        self.descriptor.kind
    }

    async fn normalize(&self, client: &dyn ApiClient) -> Result<Identity> {
        let d = &*self.descriptor;
        let profile = client.get_json(&d.profile_url).await?;
        if !profile.is_object() {
            return Err(malformed(d.kind, "profile is not a JSON object"));
        }

        let provider_id = lookup(&profile, &d.id_field)
            .and_then(scalar_to_string)
            .ok_or_else(|| malformed(d.kind, &format!("missing field '{}'", d.id_field)))?;
        let display_name = lookup(&profile, &d.name_field)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let (primary_email, verified) = match &d.verification {
            VerificationPolicy::Field(field) => (
                string_field(&profile, &d.email_field),
                lookup(&profile, field)
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
            ),
            VerificationPolicy::EmailList { url } => {
                let emails = client.get_json(url).await?;
                let entries: Vec<EmailEntry> = serde_json::from_value(emails)
                    .map_err(|e| malformed(d.kind, &format!("email list: {}", e)))?;
                match pick_primary_email(&entries) {
                    Some(entry) => (entry.email.clone(), entry.verified),
                    None => (String::new(), false),
                }
            }
            VerificationPolicy::Unverifiable => (string_field(&profile, &d.email_field), false),
        };

        Ok(Identity {
            provider: d.kind.id().to_string(),
            provider_id,
            verified: (verified || d.trust_email) && !primary_email.is_empty(),
            primary_email,
            display_name,
        })
    }
}

/// One entry of a provider's email list
#[derive(Debug, Clone, Deserialize)]
pub struct EmailEntry {
    pub email: String,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub primary: bool,
}

/// The entry marked primary, else the first verified one
///
/// Unverified secondary addresses are never picked.
pub fn pick_primary_email(entries: &[EmailEntry]) -> Option<&EmailEntry> {
    entries
        .iter()
        .find(|e| e.primary)
        .or_else(|| entries.iter().find(|e| e.verified))
}

/// Resolve a dotted path such as `data.user.id`
fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(value, |current, key| current.get(key))
        .filter(|v| !v.is_null())
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn string_field(profile: &Value, path: &str) -> String {
    lookup(profile, path)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn malformed(kind: ProviderKind, detail: &str) -> GatehouseError {
    NetworkError::Malformed(format!("{}: {}", kind, detail)).into()
}
