//! Configuration management for Gatehouse
//!
//! Loads `gatehouse.config.json` (or `.yaml`), then overlays the
//! environment: provider credentials from `OAUTH2_<ID>_CLIENT_ID` /
//! `OAUTH2_<ID>_CLIENT_SECRET`, plus `PORT`, `PUBLIC_URL`,
//! `GATEHOUSE_JWT_KEY` and `GATEHOUSE_DB`.

use crate::constants::*;
use crate::login::{LoginContext, context::join_paths};
use crate::providers::ProviderKind;
use crate::{GatehouseError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

/// Complete Gatehouse configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub routes: RoutesConfig,

    #[serde(default)]
    pub session: SessionConfig,

    /// Enabled login providers
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub log: Option<LogConfig>,

    /// Lifetime of a started login handshake
    #[serde(default = "default_handshake_ttl_secs")]
    pub handshake_ttl_secs: u64,

    /// Upper bound on account resolution during a callback
    #[serde(default = "default_resolve_timeout_secs")]
    pub resolve_timeout_secs: u64,
}

/// Storage backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Driver name (sqlite, memory)
    pub driver: String,

    /// Data source name / database path
    #[serde(default)]
    pub dsn: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            driver: DEFAULT_STORAGE_DRIVER.to_string(),
            dsn: default_sqlite_dsn().to_string(),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind to
    #[serde(default = "default_port")]
    pub port: u16,

    /// URL the browser reaches this server at; callback URLs derive from it
    #[serde(default = "default_public_url")]
    pub public_url: String,

    /// Mark session cookies `Secure` (requires HTTPS)
    #[serde(default)]
    pub secure: bool,

    /// Allowed CORS origins; defaults to the public URL's origin
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_origins: Option<Vec<String>>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_url: default_public_url(),
            secure: false,
            allowed_origins: None,
        }
    }
}

/// Paths of the login routes, relative to the public URL
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutesConfig {
    #[serde(default = "default_auth_path")]
    pub auth_path: String,

    #[serde(default = "default_login_path")]
    pub login_path: String,

    #[serde(default = "default_logout_path")]
    pub logout_path: String,

    #[serde(default = "default_success_path")]
    pub success_path: String,

    #[serde(default = "default_error_path")]
    pub error_path: String,
}

impl Default for RoutesConfig {
    fn default() -> Self {
        Self {
            auth_path: default_auth_path(),
            login_path: default_login_path(),
            logout_path: default_logout_path(),
            success_path: default_success_path(),
            error_path: default_error_path(),
        }
    }
}

/// Session cookie configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,

    /// HMAC key for signing session tokens
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub jwt_key: String,

    #[serde(default = "default_session_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: default_cookie_name(),
            jwt_key: String::new(),
            ttl_secs: default_session_ttl_secs(),
        }
    }
}

/// One enabled login provider
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    /// Provider id (google, facebook, github, twitter)
    pub id: String,

    #[serde(default)]
    pub client_id: String,

    #[serde(default, skip_serializing)]
    pub client_secret: String,

    /// Treat every email from this provider as verified
    #[serde(default)]
    pub trust_email: bool,

    /// Replaces the built-in OAuth2 scopes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scopes: Option<Vec<String>>,

    #[serde(flatten)]
    pub endpoints: EndpointOverrides,
}

/// Replacement provider endpoints, e.g. for GitHub Enterprise
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub userinfo_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub emails_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_token_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorize_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token_url: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log filter (e.g. "info", "gatehouse=debug")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_public_url() -> String {
    DEFAULT_PUBLIC_URL.to_string()
}

fn default_auth_path() -> String {
    DEFAULT_AUTH_PATH.to_string()
}

fn default_login_path() -> String {
    DEFAULT_LOGIN_PATH.to_string()
}

fn default_logout_path() -> String {
    DEFAULT_LOGOUT_PATH.to_string()
}

fn default_success_path() -> String {
    DEFAULT_SUCCESS_PATH.to_string()
}

fn default_error_path() -> String {
    DEFAULT_ERROR_PATH.to_string()
}

fn default_cookie_name() -> String {
    DEFAULT_COOKIE_NAME.to_string()
}

fn default_session_ttl_secs() -> u64 {
    DEFAULT_SESSION_TTL_SECS
}

fn check_range(name: &str, value: u64, max: u64) -> Result<()> {
    if value == 0 || value > max {
        return Err(GatehouseError::config(format!(
            "{} must be between 1 and {}",
            name, max
        )));
    }
    Ok(())
}

fn default_handshake_ttl_secs() -> u64 {
    DEFAULT_HANDSHAKE_TTL_SECS
}

fn default_resolve_timeout_secs() -> u64 {
    DEFAULT_RESOLVE_TIMEOUT_SECS
}

impl Config {
    /// Load configuration from the first config file found in the working
    /// directory, overlay the process environment and validate
    pub fn load() -> Result<Self> {
        let path = CONFIG_FILE_NAMES
            .iter()
            .map(Path::new)
            .find(|p| p.exists())
            .unwrap_or_else(|| Path::new(CONFIG_FILE_NAMES[0]));
        Self::load_with_env(path)
    }

    /// Load `path`, overlay the process environment and validate
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load_from_path(path)?;
        config.overlay_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a specific path
    ///
    /// Supports both JSON and YAML formats based on file extension:
    /// - `.json` files are parsed as JSON
    /// - `.yaml` or `.yml` files are parsed as YAML
    /// - Files without extension default to JSON parsing
    ///
    /// A missing file yields the defaults. No validation happens here since
    /// secrets usually arrive later through the environment.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;

        let config: Config = match path.extension().and_then(|s| s.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content).map_err(|e| {
                GatehouseError::config(format!("Failed to parse YAML config: {}", e))
            })?,
            _ => serde_json::from_str(&content).map_err(|e| {
                GatehouseError::config(format!("Failed to parse JSON config: {}", e))
            })?,
        };

        Ok(config)
    }

    /// Overlay values from the process environment
    pub fn overlay_env(&mut self) -> Result<()> {
        self.overlay_env_with(|key| std::env::var(key).ok())
    }

    /// Overlay values from an arbitrary variable lookup
    pub fn overlay_env_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        for kind in ProviderKind::ALL {
            let upper = kind.id().to_uppercase();
            let client_id = get(&format!("{}{}{}", ENV_PROVIDER_PREFIX, upper, ENV_CLIENT_ID_SUFFIX));
            let client_secret = get(&format!(
                "{}{}{}",
                ENV_PROVIDER_PREFIX, upper, ENV_CLIENT_SECRET_SUFFIX
            ));
            let (Some(client_id), Some(client_secret)) = (client_id, client_secret) else {
                continue;
            };

            match self.providers.iter_mut().find(|p| p.id == kind.id()) {
                Some(provider) => {
                    provider.client_id = client_id;
                    provider.client_secret = client_secret;
                }
                None => self.providers.push(ProviderConfig {
                    id: kind.id().to_string(),
                    client_id,
                    client_secret,
                    ..Default::default()
                }),
            }
        }

        if let Some(port) = get(ENV_PORT) {
            self.http.port = port.parse().map_err(|_| {
                GatehouseError::config(format!("{} must be a port number, got '{}'", ENV_PORT, port))
            })?;
        }
        if let Some(public_url) = get(ENV_PUBLIC_URL) {
            self.http.public_url = public_url;
        }
        if let Some(jwt_key) = get(ENV_JWT_KEY) {
            self.session.jwt_key = jwt_key;
        }
        if let Some(dsn) = get(ENV_DATABASE) {
            if dsn == "memory" {
                self.storage.driver = "memory".to_string();
                self.storage.dsn = String::new();
            } else {
                self.storage.driver = "sqlite".to_string();
                self.storage.dsn = dsn;
            }
        }

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        match self.storage.driver.as_str() {
            "memory" => {}
            "sqlite" => {
                if self.storage.dsn.is_empty() {
                    return Err(GatehouseError::config("storage.dsn is required for sqlite"));
                }
            }
            "" => return Err(GatehouseError::config("storage.driver is required")),
            other => {
                return Err(GatehouseError::config(format!(
                    "Unsupported storage driver: '{}'. Supported: sqlite, memory",
                    other
                )));
            }
        }

        if self.http.port == 0 {
            return Err(GatehouseError::config("http.port must be nonzero (1-65535)"));
        }
        if self.http.host.is_empty() {
            return Err(GatehouseError::config("http.host cannot be empty"));
        }
        let public_url = url::Url::parse(&self.http.public_url).map_err(|e| {
            GatehouseError::config(format!(
                "http.publicUrl '{}' is not a valid URL: {}",
                self.http.public_url, e
            ))
        })?;
        if !matches!(public_url.scheme(), "http" | "https") {
            return Err(GatehouseError::config(
                "http.publicUrl must start with http:// or https://",
            ));
        }
        if let Some(ref origins) = self.http.allowed_origins {
            for origin in origins {
                if !origin.starts_with("http://") && !origin.starts_with("https://") {
                    return Err(GatehouseError::config(format!(
                        "Invalid CORS origin '{}': must start with http:// or https://",
                        origin
                    )));
                }
            }
        }

        if self.session.jwt_key.is_empty() {
            return Err(GatehouseError::config(format!(
                "session.jwtKey is required (or set {})",
                ENV_JWT_KEY
            )));
        }
        if self.session.cookie_name.is_empty() {
            return Err(GatehouseError::config("session.cookieName cannot be empty"));
        }
        check_range("session.ttlSecs", self.session.ttl_secs, MAX_SESSION_TTL_SECS)?;
        check_range(
            "handshakeTtlSecs",
            self.handshake_ttl_secs,
            MAX_HANDSHAKE_TTL_SECS,
        )?;
        check_range(
            "resolveTimeoutSecs",
            self.resolve_timeout_secs,
            MAX_RESOLVE_TIMEOUT_SECS,
        )?;

        self.validate_routes(public_url.path())?;

        let mut seen = HashSet::new();
        for provider in &self.providers {
            if ProviderKind::from_id(&provider.id).is_none() {
                return Err(GatehouseError::config(format!(
                    "Unknown provider '{}'. Supported: google, facebook, github, twitter",
                    provider.id
                )));
            }
            if provider.client_id.is_empty() || provider.client_secret.is_empty() {
                return Err(GatehouseError::config(format!(
                    "Provider '{}' needs clientId and clientSecret",
                    provider.id
                )));
            }
            if !seen.insert(provider.id.as_str()) {
                return Err(GatehouseError::config(format!(
                    "Provider '{}' is configured twice",
                    provider.id
                )));
            }
        }

        Ok(())
    }

    /// Every mounted route must resolve to a distinct path
    ///
    /// Configured routes live under the public URL's path, the system routes
    /// at the root.
    fn validate_routes(&self, base: &str) -> Result<()> {
        let under_base = |route: &str| join_paths([base, route].into_iter());
        let routes = [
            ("routes.logoutPath", under_base(self.routes.logout_path.as_str())),
            ("routes.successPath", under_base(self.routes.success_path.as_str())),
            ("routes.errorPath", under_base(self.routes.error_path.as_str())),
            (
                "routes.authPath",
                join_paths([base, self.routes.auth_path.as_str(), "providers"].into_iter()),
            ),
            ("/me", ME_PATH.to_string()),
            ("/healthz", HEALTH_PATH.to_string()),
            ("/metrics", METRICS_PATH.to_string()),
        ];

        let mut seen: HashMap<String, &str> = HashMap::new();
        for (name, path) in &routes {
            if let Some(other) = seen.insert(path.clone(), *name) {
                return Err(GatehouseError::config(format!(
                    "{} and {} both map to '{}'",
                    other, name, path
                )));
            }
        }
        Ok(())
    }

    /// Find a configured provider by id
    pub fn find_provider(&self, id: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.id == id)
    }

    /// URL layout of the login routes
    pub fn login_context(&self) -> Result<LoginContext> {
        let mut ctx = LoginContext::new(&self.http.public_url)?;
        ctx.cookie_name = self.session.cookie_name.clone();
        ctx.auth_path = self.routes.auth_path.clone();
        ctx.login_path = self.routes.login_path.clone();
        ctx.logout_path = self.routes.logout_path.clone();
        ctx.success_path = self.routes.success_path.clone();
        ctx.error_path = self.routes.error_path.clone();
        Ok(ctx)
    }

    pub fn handshake_ttl(&self) -> Duration {
        Duration::from_secs(self.handshake_ttl_secs)
    }

    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_secs(self.resolve_timeout_secs)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session.ttl_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            http: HttpConfig::default(),
            routes: RoutesConfig::default(),
            session: SessionConfig::default(),
            providers: Vec::new(),
            log: Some(LogConfig {
                level: Some("info".to_string()),
            }),
            handshake_ttl_secs: default_handshake_ttl_secs(),
            resolve_timeout_secs: default_resolve_timeout_secs(),
        }
    }
}
