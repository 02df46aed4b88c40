//! Session tokens and cookies
//!
//! A logged-in browser carries a signed JWT in a cookie. The token names the
//! user and is scoped to the deployment's cookie domain through its `aud`
//! claim; nothing is stored server-side.

use crate::model::User;
use crate::{GatehouseError, Result};
use axum::http::{HeaderMap, header};
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Claims carried by a session token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// User id
    pub sub: String,
    /// Display name at issue time
    pub name: String,
    pub aud: String,
    pub exp: i64,
    pub iat: i64,
}

impl SessionClaims {
    /// The user id in `sub`
    pub fn user_id(&self) -> Result<Uuid> {
        Uuid::parse_str(&self.sub)
            .map_err(|e| GatehouseError::session(format!("Invalid session subject: {}", e)))
    }
}

/// A freshly signed session token
#[derive(Debug, Clone)]
pub struct SessionToken {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

/// Signs and verifies session tokens (HS256)
#[derive(Clone)]
pub struct SessionIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    audience: String,
    ttl: Duration,
}

impl std::fmt::Debug for SessionIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionIssuer")
            .field("audience", &self.audience)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl SessionIssuer {
    pub fn new(key: &str, audience: impl Into<String>) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(key.as_bytes()),
            decoding_key: DecodingKey::from_secret(key.as_bytes()),
            audience: audience.into(),
            ttl: Duration::from_secs(crate::constants::DEFAULT_SESSION_TTL_SECS),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn audience(&self) -> &str {
        &self.audience
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Sign a token for `user`, valid for the configured TTL
    pub fn issue(&self, user: &User) -> Result<SessionToken> {
        let now = Utc::now();
        let expires_at = i64::try_from(self.ttl.as_secs())
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .and_then(|ttl| now.checked_add_signed(ttl))
            .ok_or_else(|| {
                GatehouseError::session(format!(
                    "Session TTL of {}s is out of range",
                    self.ttl.as_secs()
                ))
            })?;

        let claims = SessionClaims {
            sub: user.id.to_string(),
            name: user.name.clone(),
            aud: self.audience.clone(),
            exp: expires_at.timestamp(),
            iat: now.timestamp(),
        };

        let value = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| GatehouseError::session(format!("Failed to sign session: {}", e)))?;

        Ok(SessionToken { value, expires_at })
    }

    /// Verify signature, expiry and audience, returning the claims
    pub fn decode(&self, token: &str) -> Result<SessionClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[self.audience.as_str()]);
        validation.set_required_spec_claims(&["exp", "aud", "sub"]);

        let data = jsonwebtoken::decode::<SessionClaims>(token, &self.decoding_key, &validation)
            .map_err(|e| GatehouseError::session(format!("Invalid session: {}", e)))?;

        Ok(data.claims)
    }
}

/// `Set-Cookie` value carrying a session token
///
/// `secure` adds the Secure flag and should be on whenever the public URL
/// is served over HTTPS, including behind a TLS-terminating proxy.
pub fn session_cookie(name: &str, value: &str, expires_at: DateTime<Utc>, secure: bool) -> String {
    let secure_flag = if secure { " Secure;" } else { "" };
    format!(
        "{}={}; Path=/; Expires={}; HttpOnly;{} SameSite=Lax",
        name,
        value,
        expires_at.format("%a, %d %b %Y %H:%M:%S GMT"),
        secure_flag
    )
}

/// `Set-Cookie` value that removes the session cookie
pub fn clear_session_cookie(name: &str, secure: bool) -> String {
    let secure_flag = if secure { " Secure;" } else { "" };
    format!(
        "{}=; Path=/; Max-Age=0; HttpOnly;{} SameSite=Lax",
        name, secure_flag
    )
}

/// Value of cookie `name` from the request's `Cookie` headers
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|s| s.split(';'))
        .map(|c| c.trim())
        .find_map(|c| {
            let (key, value) = c.split_once('=')?;
            (key == name).then(|| value.to_string())
        })
}
