//! Login routes
//!
//! `GET {login}/{provider}` starts a handshake, `GET {login}/{provider}/callback`
//! finishes it and issues the session cookie. Every failure ends in a
//! temporary redirect to the error URL carrying `message`, `error` and
//! `reason` query parameters.

use super::AppState;
use super::session::MaybeUser;
use crate::GatehouseError;
use crate::auth::CallbackParams;
use crate::constants::{ERROR_PARAM_ERROR, ERROR_PARAM_MESSAGE, ERROR_PARAM_REASON};
use crate::error::LoginError;
use crate::session::{clear_session_cookie, session_cookie};
use crate::telemetry::{self, OUTCOME_SUCCESS};
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Redirect, Response};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Instant;

/// Why a login did not produce a session
#[derive(Debug)]
enum LoginFailure {
    UnknownProvider,
    Start(GatehouseError),
    Handshake(GatehouseError),
    Profile(GatehouseError),
    Resolve(LoginError),
    Timeout,
    Session(GatehouseError),
}

impl LoginFailure {
    /// Fixed description of the step that failed
    fn message(&self) -> &'static str {
        match self {
            LoginFailure::UnknownProvider => "unknown login provider",
            LoginFailure::Start(_) => "failed to start login",
            LoginFailure::Handshake(_) => "failed to create API client",
            LoginFailure::Profile(_) => "failed to retrieve authenticating user info from provider",
            LoginFailure::Resolve(_) | LoginFailure::Timeout => {
                "failed to find or create authenticating user"
            }
            LoginFailure::Session(_) => "failed to generate session cookie",
        }
    }

    /// Stable label for metrics and the `reason` parameter
    fn reason(&self) -> &'static str {
        match self {
            LoginFailure::UnknownProvider => "unknown_provider",
            LoginFailure::Start(_) => "start",
            LoginFailure::Handshake(_) => "handshake",
            LoginFailure::Profile(_) => "profile",
            LoginFailure::Resolve(e) => e.kind().as_str(),
            LoginFailure::Timeout => "timeout",
            LoginFailure::Session(_) => "session",
        }
    }

    fn detail(&self) -> String {
        match self {
            LoginFailure::UnknownProvider => "provider is not configured".to_string(),
            LoginFailure::Start(e)
            | LoginFailure::Handshake(e)
            | LoginFailure::Profile(e)
            | LoginFailure::Session(e) => e.to_string(),
            LoginFailure::Resolve(e) => e.to_string(),
            LoginFailure::Timeout => "account resolution timed out".to_string(),
        }
    }

    /// Failures caused by the user or the provider's answer rather than by
    /// our own infrastructure
    fn is_rejection(&self) -> bool {
        match self {
            LoginFailure::UnknownProvider => true,
            LoginFailure::Handshake(GatehouseError::OAuth(_)) => true,
            LoginFailure::Resolve(e) => !e.is_retryable(),
            _ => false,
        }
    }
}

fn error_redirect(state: &AppState, failure: &LoginFailure) -> Response {
    let mut url = state.ctx.error_url(&[]);
    url.query_pairs_mut()
        .append_pair(ERROR_PARAM_MESSAGE, failure.message())
        .append_pair(ERROR_PARAM_ERROR, &failure.detail())
        .append_pair(ERROR_PARAM_REASON, failure.reason());
    Redirect::temporary(url.as_str()).into_response()
}

fn report(provider: &str, failure: &LoginFailure) {
    if failure.is_rejection() {
        tracing::warn!(
            provider = provider,
            reason = failure.reason(),
            error = %failure.detail(),
            "{}",
            failure.message()
        );
    } else {
        tracing::error!(
            provider = provider,
            reason = failure.reason(),
            error = %failure.detail(),
            "{}",
            failure.message()
        );
    }

    let label = match failure {
        LoginFailure::UnknownProvider => "unknown",
        _ => provider,
    };
    telemetry::record_login(label, failure.reason());
}

/// Redirect the browser to the provider's consent page
pub async fn login_handler(
    State(state): State<AppState>,
    Path(provider_id): Path<String>,
) -> Response {
    let Some(provider) = state.providers.get(&provider_id) else {
        let failure = LoginFailure::UnknownProvider;
        report(&provider_id, &failure);
        return error_redirect(&state, &failure);
    };

    match provider.flow.start().await {
        Ok(url) => {
            telemetry::record_login_redirect(provider.kind().id());
            Redirect::temporary(url.as_str()).into_response()
        }
        Err(e) => {
            let failure = LoginFailure::Start(e);
            report(&provider_id, &failure);
            error_redirect(&state, &failure)
        }
    }
}

/// Finish the handshake, resolve the account and set the session cookie
pub async fn callback_handler(
    State(state): State<AppState>,
    Path(provider_id): Path<String>,
    Query(params): Query<CallbackParams>,
) -> Response {
    match complete_login(&state, &provider_id, &params).await {
        Ok(cookie) => (
            [(header::SET_COOKIE, cookie)],
            Redirect::temporary(state.ctx.success_url(&[]).as_str()),
        )
            .into_response(),
        Err(failure) => {
            report(&provider_id, &failure);
            error_redirect(&state, &failure)
        }
    }
}

async fn complete_login(
    state: &AppState,
    provider_id: &str,
    params: &CallbackParams,
) -> std::result::Result<String, LoginFailure> {
    let provider = state
        .providers
        .get(provider_id)
        .ok_or(LoginFailure::UnknownProvider)?;

    let client = provider
        .flow
        .finish(params)
        .await
        .map_err(LoginFailure::Handshake)?;
    let identity = provider
        .normalizer
        .normalize(client.as_ref())
        .await
        .map_err(LoginFailure::Profile)?;

    // Dropping the resolve future on expiry abandons its store work
    let started = Instant::now();
    let resolved =
        tokio::time::timeout(state.resolve_timeout, state.resolver.resolve(&identity)).await;
    telemetry::record_resolve_duration(provider_id, started.elapsed().as_secs_f64());
    let user = resolved
        .map_err(|_| LoginFailure::Timeout)?
        .map_err(LoginFailure::Resolve)?;

    let token = state.sessions.issue(&user).map_err(LoginFailure::Session)?;

    tracing::info!(
        user.id = %user.id,
        user.name = %user.name,
        provider = provider_id,
        "user found or created"
    );
    telemetry::record_login(provider_id, OUTCOME_SUCCESS);

    Ok(session_cookie(
        &state.ctx.cookie_name,
        &token.value,
        token.expires_at,
        state.secure_cookies,
    ))
}

/// Expire the session cookie and go back to the success URL
pub async fn logout_handler(State(state): State<AppState>) -> Response {
    (
        [(
            header::SET_COOKIE,
            clear_session_cookie(&state.ctx.cookie_name, state.secure_cookies),
        )],
        Redirect::temporary(state.ctx.success_url(&[]).as_str()),
    )
        .into_response()
}

/// One entry of the provider list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderLink {
    pub id: String,
    pub name: String,
    pub login_url: String,
}

/// Enabled providers and where to start logging in with each
pub async fn providers_handler(State(state): State<AppState>) -> Json<Vec<ProviderLink>> {
    let links = state
        .providers
        .iter()
        .map(|p| ProviderLink {
            id: p.kind().id().to_string(),
            name: p.kind().display_name().to_string(),
            login_url: state.ctx.login_url(&[p.kind().id()]).to_string(),
        })
        .collect();
    Json(links)
}

/// Landing page after login or logout
pub async fn success_handler(MaybeUser(user): MaybeUser) -> Json<Value> {
    Json(json!({
        "authenticated": user.is_some(),
        "user": user,
    }))
}

/// Query parameters the error redirect carries
#[derive(Debug, Default, Deserialize)]
pub struct LoginErrorParams {
    pub message: Option<String>,
    pub error: Option<String>,
    pub reason: Option<String>,
}

/// Landing page for failed logins
pub async fn error_handler(Query(params): Query<LoginErrorParams>) -> Response {
    let status = StatusCode::UNAUTHORIZED;
    let body = json!({
        "error": {
            "type": params.reason.as_deref().unwrap_or("login_error"),
            "message": params.message.as_deref().unwrap_or("login failed"),
            "detail": params.error,
            "status": status.as_u16(),
        }
    });
    (status, Json(body)).into_response()
}
