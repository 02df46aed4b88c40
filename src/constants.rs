//! Constants used throughout Gatehouse
//!
//! Default paths, route layout, provider endpoints and the environment
//! variables read at startup.

use once_cell::sync::Lazy;
use std::time::Duration;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Get the home directory with fallback to current directory
pub fn get_home_dir() -> &'static str {
    static HOME_DIR: Lazy<String> = Lazy::new(|| {
        dirs::home_dir()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|| ".".to_string())
    });
    &HOME_DIR
}

/// Default config directory (~/.gatehouse)
pub fn default_config_dir() -> &'static str {
    static CONFIG_DIR: Lazy<String> = Lazy::new(|| format!("{}/.gatehouse", get_home_dir()));
    &CONFIG_DIR
}

/// Default SQLite DSN (~/.gatehouse/gatehouse.db)
pub fn default_sqlite_dsn() -> &'static str {
    static SQLITE_DSN: Lazy<String> =
        Lazy::new(|| format!("{}/gatehouse.db", default_config_dir()));
    &SQLITE_DSN
}

/// Configuration file names, tried in order
pub const CONFIG_FILE_NAMES: &[&str] = &[
    "gatehouse.config.json",
    "gatehouse.config.yaml",
    "gatehouse.config.yml",
];

/// Default storage driver
pub const DEFAULT_STORAGE_DRIVER: &str = "sqlite";

/// Default log filter
pub const DEFAULT_LOG_FILTER: &str = "gatehouse=info";

// ============================================================================
// HTTP SERVER
// ============================================================================

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_PUBLIC_URL: &str = "http://localhost:8080";

/// Health check path
pub const HEALTH_PATH: &str = "/healthz";

/// Prometheus scrape path
pub const METRICS_PATH: &str = "/metrics";

/// Current user path
pub const ME_PATH: &str = "/me";

// ============================================================================
// LOGIN ROUTES
// ============================================================================

pub const DEFAULT_AUTH_PATH: &str = "/login";
pub const DEFAULT_LOGIN_PATH: &str = "/login/oauth2";
pub const DEFAULT_LOGOUT_PATH: &str = "/logout";
pub const DEFAULT_SUCCESS_PATH: &str = "/";
pub const DEFAULT_ERROR_PATH: &str = "/login/error";

/// Query parameters appended to the error URL: a fixed description of the
/// failed step, the error text, and a stable snake_case reason
pub const ERROR_PARAM_MESSAGE: &str = "message";
pub const ERROR_PARAM_ERROR: &str = "error";
pub const ERROR_PARAM_REASON: &str = "reason";

// ============================================================================
// SESSIONS & HANDSHAKES
// ============================================================================

pub const DEFAULT_COOKIE_NAME: &str = "gatehouse";

/// Default session lifetime (1 hour)
pub const DEFAULT_SESSION_TTL_SECS: u64 = 3600;

/// How long a started login may take before its state expires (10 minutes)
pub const DEFAULT_HANDSHAKE_TTL_SECS: u64 = 600;

/// Upper bound on account resolution per request
pub const DEFAULT_RESOLVE_TIMEOUT_SECS: u64 = 10;

/// Upper bounds accepted by config validation
pub const MAX_SESSION_TTL_SECS: u64 = 366 * 24 * 3600;
pub const MAX_HANDSHAKE_TTL_SECS: u64 = 24 * 3600;
pub const MAX_RESOLVE_TIMEOUT_SECS: u64 = 300;

/// Interval between sweeps of expired handshake state
pub const HANDSHAKE_PURGE_INTERVAL: Duration = Duration::from_secs(60);

/// Ephemeral key prefixes
pub const OAUTH2_STATE_PREFIX: &str = "oauth2:";
pub const OAUTH1_TOKEN_PREFIX: &str = "oauth1:";

// ============================================================================
// ENVIRONMENT
// ============================================================================

pub const ENV_PORT: &str = "PORT";
pub const ENV_PUBLIC_URL: &str = "PUBLIC_URL";
pub const ENV_JWT_KEY: &str = "GATEHOUSE_JWT_KEY";
pub const ENV_DATABASE: &str = "GATEHOUSE_DB";

/// Provider credential variables: `OAUTH2_<ID>_CLIENT_ID` / `_CLIENT_SECRET`
pub const ENV_PROVIDER_PREFIX: &str = "OAUTH2_";
pub const ENV_CLIENT_ID_SUFFIX: &str = "_CLIENT_ID";
pub const ENV_CLIENT_SECRET_SUFFIX: &str = "_CLIENT_SECRET";

// ============================================================================
// PROVIDER ENDPOINTS
// ============================================================================

pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v1/userinfo";

pub const FACEBOOK_AUTH_URL: &str = "https://www.facebook.com/v2.9/dialog/oauth";
pub const FACEBOOK_TOKEN_URL: &str = "https://graph.facebook.com/v2.9/oauth/access_token";
pub const FACEBOOK_PROFILE_URL: &str = "https://graph.facebook.com/v2.9/me?fields=id,name,email";

pub const GITHUB_AUTH_URL: &str = "https://github.com/login/oauth/authorize";
pub const GITHUB_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
pub const GITHUB_USER_URL: &str = "https://api.github.com/user";
pub const GITHUB_EMAILS_URL: &str = "https://api.github.com/user/emails";

pub const TWITTER_REQUEST_TOKEN_URL: &str = "https://api.twitter.com/oauth/request_token";
pub const TWITTER_AUTHORIZE_URL: &str = "https://api.twitter.com/oauth/authorize";
pub const TWITTER_ACCESS_TOKEN_URL: &str = "https://api.twitter.com/oauth/access_token";
pub const TWITTER_VERIFY_CREDENTIALS_URL: &str =
    "https://api.twitter.com/1.1/account/verify_credentials.json?include_email=true&skip_status=true";
