//! Tests for the session middleware and extractors

use super::*;
use crate::model::Identity;
use crate::storage::{MemoryStorage, UserStore};
use axum::body::Body;
use axum::http::Request;
use tower::ServiceExt;

struct Harness {
    app: Router,
    state: AppState,
    store: Arc<MemoryStorage>,
}

fn harness() -> Harness {
    let mut config = Config::default();
    config.session.jwt_key = "session-test-key".to_string();

    let store = Arc::new(MemoryStorage::new());
    let state = AppState::from_config(&config, StorageBackend::shared(store.clone())).unwrap();
    let app = build_router(state.clone(), &config.http).unwrap();
    Harness { app, state, store }
}

async fn stored_user(store: &MemoryStorage) -> User {
    let identity = Identity::new("github", "42")
        .with_email("dev@example.com")
        .with_name("Dev")
        .verified(true);
    let user = User::from_identity(&identity);
    store.create_user(&user).await.unwrap();
    store
        .create_identity_link(&identity.link_to(user.id))
        .await
        .unwrap();
    user
}

async fn get(app: &Router, uri: &str, cookie: Option<String>) -> Response {
    let mut request = Request::builder().uri(uri);
    if let Some(cookie) = cookie {
        request = request.header(header::COOKIE, cookie);
    }
    app.clone()
        .oneshot(request.body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_me_without_cookie_is_unauthorized() {
    let h = harness();
    let response = get(&h.app, "/me", None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let body = body_json(response).await;
    assert_eq!(body["error"]["type"], "unauthorized");
    assert_eq!(body["error"]["status"], 401);
}

#[tokio::test]
async fn test_valid_session_attaches_user() {
    let h = harness();
    let user = stored_user(&h.store).await;
    let token = h.state.sessions.issue(&user).unwrap();

    let response = get(
        &h.app,
        "/me",
        Some(format!("theme=dark; gatehouse={}", token.value)),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["id"], user.id.to_string());
    assert_eq!(body["primaryEmail"], "dev@example.com");
    assert_eq!(body["identities"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_garbage_cookie_is_bad_request() {
    let h = harness();
    let response = get(&h.app, "/me", Some("gatehouse=not-a-token".to_string())).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert_eq!(body["error"]["type"], "session_error");
}

#[tokio::test]
async fn test_token_signed_elsewhere_is_bad_request() {
    let h = harness();
    let user = stored_user(&h.store).await;
    let foreign = SessionIssuer::new("other-key", "localhost")
        .issue(&user)
        .unwrap();

    let response = get(&h.app, "/me", Some(format!("gatehouse={}", foreign.value))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_session_for_missing_user_is_bad_request() {
    let h = harness();
    let ghost = User::from_identity(&Identity::new("google", "gone").with_email("gone@x.com"));
    let token = h.state.sessions.issue(&ghost).unwrap();

    let response = get(&h.app, "/me", Some(format!("gatehouse={}", token.value))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert!(
        body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("not found")
    );
}

#[tokio::test]
async fn test_success_page_reports_session() {
    let h = harness();

    let anonymous = body_json(get(&h.app, "/", None).await).await;
    assert_eq!(anonymous["authenticated"], false);
    assert!(anonymous["user"].is_null());

    let user = stored_user(&h.store).await;
    let token = h.state.sessions.issue(&user).unwrap();
    let response = get(&h.app, "/", Some(format!("gatehouse={}", token.value))).await;
    let body = body_json(response).await;
    assert_eq!(body["authenticated"], true);
    assert_eq!(body["user"]["name"], "Dev");
}

#[tokio::test]
async fn test_login_routes_ignore_bad_cookies() {
    let h = harness();
    let cookie = Some("gatehouse=not-a-token".to_string());

    let response = get(&h.app, "/logout", cookie.clone()).await;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);

    let response = get(&h.app, "/login/providers", cookie.clone()).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = get(&h.app, "/healthz", cookie).await;
    assert_eq!(response.status(), StatusCode::OK);
}
