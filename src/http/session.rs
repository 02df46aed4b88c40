//! Session middleware and extractors
//!
//! Reads the session cookie, verifies the token and attaches the session's
//! [`User`] to the request. Requests without a cookie pass through untouched.

use super::{AppError, AppState, error_response};
use crate::model::User;
use crate::session::cookie_value;
use crate::{GatehouseError, Result};
use axum::extract::{FromRequestParts, Request, State};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::convert::Infallible;

/// The logged-in user, inserted into request extensions by [`session_middleware`]
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

/// The logged-in user, if any
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<User>);

/// Attach the session user to the request
///
/// - no cookie: the request continues anonymously
/// - undecodable, expired or foreign token: 400
/// - token for a user that no longer exists: 400
pub async fn session_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let Some(token) = cookie_value(req.headers(), &state.ctx.cookie_name) else {
        return next.run(req).await;
    };

    match load_user(&state, &token).await {
        Ok(user) => {
            req.extensions_mut().insert(CurrentUser(user));
            next.run(req).await
        }
        Err(e) => AppError::from(e).into_response(),
    }
}

async fn load_user(state: &AppState, token: &str) -> Result<User> {
    let user_id = state.sessions.decode(token)?.user_id()?;

    state
        .storage
        .users
        .find_user(user_id)
        .await?
        .ok_or_else(|| GatehouseError::session(format!("Session user {} not found", user_id)))
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = Response;

    fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> impl std::future::Future<Output = std::result::Result<Self, Self::Rejection>> + Send {
        let user = parts.extensions.get::<CurrentUser>().cloned();

        async move {
            user.ok_or_else(|| {
                error_response(StatusCode::UNAUTHORIZED, "unauthorized", "Not logged in")
            })
        }
    }
}

impl<S> FromRequestParts<S> for MaybeUser
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> impl std::future::Future<Output = std::result::Result<Self, Self::Rejection>> + Send {
        let user = parts.extensions.get::<CurrentUser>().map(|u| u.0.clone());

        async move { Ok(MaybeUser(user)) }
    }
}
