//! HTTP server for Gatehouse
//!
//! Mounts the login routes under the public URL's path, plus the session
//! protected `/me`, health and metrics endpoints.

pub mod login;
pub mod session;

use crate::auth::ProviderRegistry;
use crate::config::{Config, HttpConfig};
use crate::constants::{HANDSHAKE_PURGE_INTERVAL, HEALTH_PATH, ME_PATH, METRICS_PATH};
use crate::error::LoginErrorKind;
use crate::login::{AccountResolver, LoginContext, context::join_paths};
use crate::model::{IdentityLink, User};
use crate::session::SessionIssuer;
use crate::storage::{EphemeralStore, StorageBackend};
use crate::{GatehouseError, Result};
use axum::{
    Router,
    extract::{Json, State},
    http::{HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Serialize;
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    LatencyUnit,
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};

pub use session::{CurrentUser, MaybeUser, session_middleware};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub ctx: Arc<LoginContext>,
    pub providers: Arc<ProviderRegistry>,
    pub resolver: AccountResolver,
    pub sessions: Arc<SessionIssuer>,
    pub storage: StorageBackend,
    pub secure_cookies: bool,
    pub resolve_timeout: Duration,
}

impl AppState {
    /// Wire up providers, resolver and session issuer over `storage`
    pub fn from_config(config: &Config, storage: StorageBackend) -> Result<Self> {
        let ctx = config.login_context()?;
        let providers = ProviderRegistry::from_config(config, &ctx, storage.ephemeral.clone())?;
        let sessions = SessionIssuer::new(&config.session.jwt_key, ctx.cookie_domain())
            .with_ttl(config.session_ttl());

        Ok(Self {
            resolver: AccountResolver::new(storage.users.clone()),
            ctx: Arc::new(ctx),
            providers: Arc::new(providers),
            sessions: Arc::new(sessions),
            storage,
            secure_cookies: config.http.secure,
            resolve_timeout: config.resolve_timeout(),
        })
    }
}

/// Error type for HTTP handlers
#[derive(Debug)]
pub struct AppError(GatehouseError);

/// JSON error body: `{"error": {"type", "message", "status"}}`
pub(crate) fn error_response(status: StatusCode, error_type: &str, message: &str) -> Response {
    let body = json!({
        "error": {
            "type": error_type,
            "message": message,
            "status": status.as_u16(),
        }
    });

    (status, Json(body)).into_response()
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self.0 {
            GatehouseError::Session(msg) => (StatusCode::BAD_REQUEST, "session_error", msg.clone()),
            GatehouseError::OAuth(msg) => (StatusCode::UNAUTHORIZED, "auth_error", msg.clone()),
            GatehouseError::Login(e) => {
                let status = match e.kind() {
                    LoginErrorKind::NoEmail
                    | LoginErrorKind::NoProvider
                    | LoginErrorKind::NoProviderId => StatusCode::BAD_REQUEST,
                    LoginErrorKind::UserNotFound => StatusCode::NOT_FOUND,
                    LoginErrorKind::UserEmailNotVerified
                    | LoginErrorKind::UserIdentityNotVerified => StatusCode::FORBIDDEN,
                    LoginErrorKind::Database => StatusCode::INTERNAL_SERVER_ERROR,
                };
                if status.is_server_error() {
                    tracing::error!("Login error: {:?}", e);
                    (status, "login_error", "An internal error occurred".to_string())
                } else {
                    (status, "login_error", e.to_string())
                }
            }
            GatehouseError::Storage(e) => {
                // Log full error details internally
                tracing::error!("Storage error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "storage_error",
                    "An internal storage error occurred".to_string(),
                )
            }
            GatehouseError::Network(e) => {
                tracing::error!("Network error: {:?}", e);
                (
                    StatusCode::BAD_GATEWAY,
                    "network_error",
                    "A network error occurred".to_string(),
                )
            }
            _ => {
                tracing::error!("Internal error: {:?}", self.0);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
        };

        tracing::debug!(
            error_type = error_type,
            status = %status,
            message = %message,
            "HTTP request error response"
        );

        error_response(status, error_type, &message)
    }
}

impl<E> From<E> for AppError
where
    E: Into<GatehouseError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

/// Start the HTTP server
pub async fn start_server(config: Config) -> Result<()> {
    config.validate()?;

    let storage = crate::storage::create_storage_from_config(&config.storage).await?;
    let state = AppState::from_config(&config, storage)?;

    if state.providers.is_empty() {
        tracing::warn!("No login providers configured");
    }
    for provider in state.providers.iter() {
        tracing::info!(
            provider = provider.kind().id(),
            callback = %state.ctx.callback_url(provider.kind().id()),
            "Login provider enabled"
        );
    }

    spawn_handshake_purge(state.storage.ephemeral.clone(), HANDSHAKE_PURGE_INTERVAL);

    let app = build_router(state, &config.http)?;

    let addr = format!("{}:{}", config.http.host, config.http.port);
    let socket_addr: SocketAddr = addr
        .parse()
        .map_err(|e| GatehouseError::config(format!("Invalid address {}: {}", addr, e)))?;

    tracing::info!("Starting HTTP server on {}", socket_addr);

    let listener = tokio::net::TcpListener::bind(socket_addr).await?;
    axum::serve(listener, app)
        .await
        .map_err(|e| GatehouseError::config(format!("Server error: {}", e)))?;

    Ok(())
}

/// Periodically drop expired handshake state
pub fn spawn_handshake_purge(
    ephemeral: Arc<dyn EphemeralStore>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match ephemeral.purge_expired().await {
                Ok(0) => {}
                Ok(removed) => tracing::debug!(removed, "Purged expired handshake state"),
                Err(e) => tracing::warn!("Failed to purge handshake state: {}", e),
            }
        }
    })
}

/// Build the router with all endpoints
pub fn build_router(state: AppState, http_config: &HttpConfig) -> Result<Router> {
    let ctx = state.ctx.clone();
    let login_base = ctx.login_url(&[]).path().to_string();

    // Public login routes never look at the session cookie
    let login_routes = Router::new()
        .route(
            &join_paths([login_base.as_str(), "{provider}"].into_iter()),
            get(login::login_handler),
        )
        .route(
            &join_paths([login_base.as_str(), "{provider}", "callback"].into_iter()),
            get(login::callback_handler),
        )
        .route(ctx.logout_url(&[]).path(), get(login::logout_handler))
        .route(
            ctx.auth_url(&["providers"]).path(),
            get(login::providers_handler),
        )
        .route(ctx.error_url(&[]).path(), get(login::error_handler));

    let session_routes = Router::new()
        .route(ME_PATH, get(me_handler))
        .route(ctx.success_url(&[]).path(), get(login::success_handler))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            session::session_middleware,
        ));

    let system_routes = Router::new()
        .route(HEALTH_PATH, get(health_handler))
        .route(METRICS_PATH, get(metrics_handler));

    Ok(Router::new()
        .merge(login_routes)
        .merge(session_routes)
        .with_state(state)
        .merge(system_routes)
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().include_headers(false))
                        .on_response(
                            DefaultOnResponse::new()
                                .level(tracing::Level::INFO)
                                .latency_unit(LatencyUnit::Micros),
                        ),
                )
                .layer(cors_layer(&ctx, http_config)?),
        ))
}

/// CORS for the configured origins, or the public URL's origin
fn cors_layer(ctx: &LoginContext, http_config: &HttpConfig) -> Result<CorsLayer> {
    let origins = match &http_config.allowed_origins {
        Some(origins) => origins.clone(),
        None => vec![ctx.public_url.origin().ascii_serialization()],
    };

    let origins = origins
        .iter()
        .map(|o| {
            o.parse::<HeaderValue>()
                .map_err(|e| GatehouseError::config(format!("Invalid CORS origin {}: {}", o, e)))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true))
}

// ============================================================================
// SYSTEM HANDLERS
// ============================================================================

/// The session user and the identities linked to it
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    #[serde(flatten)]
    pub user: User,
    pub identities: Vec<IdentityLink>,
}

async fn me_handler(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> std::result::Result<Json<MeResponse>, AppError> {
    let identities = state.storage.users.list_identity_links(user.id).await?;
    Ok(Json(MeResponse { user, identities }))
}

async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn metrics_handler() -> std::result::Result<(StatusCode, String), AppError> {
    let metrics = crate::telemetry::get_metrics()?;
    Ok((StatusCode::OK, metrics))
}

#[cfg(test)]
mod session_test;
