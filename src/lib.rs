//! Gatehouse - pluggable OAuth login with account linking
//!
//! Gatehouse logs users in through Google, Facebook, GitHub or Twitter and
//! resolves every provider identity to a single local account:
//! - OAuth 2.0 (PKCE) and OAuth 1.0a handshakes behind one provider registry
//! - Identity normalization from each provider's profile API
//! - Account linking by verified email, with transactional user creation
//! - Signed, expiring session cookies and an axum session middleware
//! - In-memory and SQLite storage backends
//!
//! # Example
//!
//! ```rust,no_run
//! use gatehouse::config::Config;
//! use gatehouse::http::{AppState, build_router};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load()?;
//!     let storage = gatehouse::storage::create_storage_from_config(&config.storage).await?;
//!     let state = AppState::from_config(&config, storage)?;
//!     let app = build_router(state, &config.http)?;
//!
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

// Core modules
pub mod constants;
pub mod error;
pub mod model;

// Identity resolution
pub mod login;
pub mod storage;

// Providers and handshakes
pub mod auth;
pub mod providers;
pub mod session;

// Interface layers
pub mod cli;
pub mod config;
pub mod http;
pub mod telemetry;

// Re-exports for convenience
pub use error::{GatehouseError, LoginError, LoginErrorKind, Result};
pub use login::{AccountResolver, LoginContext};
pub use model::{Identity, IdentityLink, User};

/// Initialize logging for the application
///
/// `RUST_LOG` wins over `level`, which wins over the default filter.
pub fn init_logging(level: Option<&str>) {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match level {
        Some(level) => EnvFilter::new(format!("gatehouse={}", level)),
        None => EnvFilter::new(constants::DEFAULT_LOG_FILTER),
    });

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
