//! Error types for Gatehouse
//!
//! This module provides the error hierarchy using thiserror. Infrastructure
//! failures convert into [`GatehouseError`]; the account resolver reports
//! its outcomes through the narrower [`LoginError`] taxonomy.

use crate::model::User;
use thiserror::Error;

/// Main error type for Gatehouse operations
#[derive(Error, Debug)]
pub enum GatehouseError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("OAuth error: {0}")]
    OAuth(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error(transparent)]
    Login(#[from] LoginError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Storage-specific errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Duplicate key: {0}")]
    Duplicate(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("UUID parse error: {0}")]
    UuidParse(#[from] uuid::Error),
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StorageError::Duplicate(db.message().to_string())
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StorageError::Connection(err.to_string())
            }
            _ => StorageError::Database(err.to_string()),
        }
    }
}

impl From<sqlx::Error> for GatehouseError {
    fn from(err: sqlx::Error) -> Self {
        GatehouseError::Storage(StorageError::from(err))
    }
}

/// Network-specific errors
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Malformed provider response: {0}")]
    Malformed(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),
}

/// Convenient result type for Gatehouse operations
pub type Result<T> = std::result::Result<T, GatehouseError>;

impl GatehouseError {
    /// Create a config error
    #[inline]
    pub fn config<S: Into<String>>(msg: S) -> Self {
        GatehouseError::Config(msg.into())
    }

    /// Create a storage error
    #[inline]
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        GatehouseError::Storage(StorageError::Database(msg.into()))
    }

    /// Create an auth error
    #[inline]
    pub fn auth<S: Into<String>>(msg: S) -> Self {
        GatehouseError::OAuth(msg.into())
    }

    /// Create a session error
    #[inline]
    pub fn session<S: Into<String>>(msg: S) -> Self {
        GatehouseError::Session(msg.into())
    }
}

/// Kind of a [`LoginError`], without its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoginErrorKind {
    NoEmail,
    NoProvider,
    NoProviderId,
    UserNotFound,
    UserEmailNotVerified,
    UserIdentityNotVerified,
    Database,
}

impl LoginErrorKind {
    /// Stable snake_case label, used for metrics and error redirects
    pub fn as_str(self) -> &'static str {
        match self {
            LoginErrorKind::NoEmail => "no_email",
            LoginErrorKind::NoProvider => "no_provider",
            LoginErrorKind::NoProviderId => "no_provider_id",
            LoginErrorKind::UserNotFound => "user_not_found",
            LoginErrorKind::UserEmailNotVerified => "user_email_not_verified",
            LoginErrorKind::UserIdentityNotVerified => "user_identity_not_verified",
            LoginErrorKind::Database => "database",
        }
    }
}

impl std::fmt::Display for LoginErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a failed identity resolution
///
/// The two verification variants carry the matched [`User`] so the caller
/// can offer a verification prompt instead of a generic failure.
#[derive(Error, Debug)]
pub enum LoginError {
    #[error("login error: no email")]
    NoEmail,

    #[error("login error: no provider")]
    NoProvider,

    #[error("login error: no provider id")]
    NoProviderId,

    #[error("login error: user not found")]
    UserNotFound { action: String },

    #[error("login error: user email not verified")]
    UserEmailNotVerified { user: Box<User>, action: String },

    #[error("login error: user identity not verified")]
    UserIdentityNotVerified { user: Box<User>, action: String },

    #[error("login error: action=\"{action}\" error=\"{source}\"")]
    Database {
        action: String,
        #[source]
        source: StorageError,
    },
}

impl LoginError {
    pub(crate) fn database(action: impl Into<String>, source: StorageError) -> Self {
        LoginError::Database {
            action: action.into(),
            source,
        }
    }

    pub fn kind(&self) -> LoginErrorKind {
        match self {
            LoginError::NoEmail => LoginErrorKind::NoEmail,
            LoginError::NoProvider => LoginErrorKind::NoProvider,
            LoginError::NoProviderId => LoginErrorKind::NoProviderId,
            LoginError::UserNotFound { .. } => LoginErrorKind::UserNotFound,
            LoginError::UserEmailNotVerified { .. } => LoginErrorKind::UserEmailNotVerified,
            LoginError::UserIdentityNotVerified { .. } => LoginErrorKind::UserIdentityNotVerified,
            LoginError::Database { .. } => LoginErrorKind::Database,
        }
    }

    /// The user this error refers to, for the verification rejections
    pub fn user(&self) -> Option<&User> {
        match self {
            LoginError::UserEmailNotVerified { user, .. }
            | LoginError::UserIdentityNotVerified { user, .. } => Some(&**user),
            _ => None,
        }
    }

    /// Description of the store action that was attempted, if any
    pub fn action(&self) -> Option<&str> {
        match self {
            LoginError::UserNotFound { action }
            | LoginError::UserEmailNotVerified { action, .. }
            | LoginError::UserIdentityNotVerified { action, .. }
            | LoginError::Database { action, .. } => Some(action.as_str()),
            _ => None,
        }
    }

    /// Only storage failures are worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(self, LoginError::Database { .. })
    }
}
