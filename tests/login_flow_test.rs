//! End-to-end login tests
//!
//! Drives the full router against mocked provider APIs and a SQLite store:
//! handshake, profile normalization, account linking and the session cookie.

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use axum::response::Response;
use gatehouse::config::{Config, EndpointOverrides, ProviderConfig, StorageConfig};
use gatehouse::http::{AppState, build_router};
use gatehouse::storage::create_storage_from_config;
use serde_json::{Value, json};
use std::collections::HashMap;
use tempfile::TempDir;
use tower::ServiceExt;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(server: &MockServer, dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.session.jwt_key = "integration-key".to_string();
    config.storage = StorageConfig {
        driver: "sqlite".to_string(),
        dsn: dir.path().join("gatehouse.db").to_string_lossy().to_string(),
    };
    config.providers = vec![
        ProviderConfig {
            id: "google".to_string(),
            client_id: "google-id".to_string(),
            client_secret: "google-secret".to_string(),
            endpoints: EndpointOverrides {
                auth_url: Some(format!("{}/google/authorize", server.uri())),
                token_url: Some(format!("{}/google/token", server.uri())),
                userinfo_url: Some(format!("{}/google/userinfo", server.uri())),
                ..Default::default()
            },
            ..Default::default()
        },
        ProviderConfig {
            id: "github".to_string(),
            client_id: "github-id".to_string(),
            client_secret: "github-secret".to_string(),
            endpoints: EndpointOverrides {
                auth_url: Some(format!("{}/github/authorize", server.uri())),
                token_url: Some(format!("{}/github/token", server.uri())),
                userinfo_url: Some(format!("{}/github/user", server.uri())),
                emails_url: Some(format!("{}/github/emails", server.uri())),
                ..Default::default()
            },
            ..Default::default()
        },
    ];
    config
}

async fn start_app(config: &Config) -> (Router, AppState) {
    let storage = create_storage_from_config(&config.storage).await.unwrap();
    let state = AppState::from_config(config, storage).unwrap();
    let router = build_router(state.clone(), &config.http).unwrap();
    (router, state)
}

async fn mount_token(server: &MockServer, provider: &str) {
    Mock::given(method("POST"))
        .and(path(format!("/{}/token", provider)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": format!("{}-token", provider),
            "token_type": "bearer"
        })))
        .mount(server)
        .await;
}

async fn mount_google(server: &MockServer) {
    mount_token(server, "google").await;
    Mock::given(method("GET"))
        .and(path("/google/userinfo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "g-100",
            "email": "alice@example.com",
            "verified_email": true,
            "name": "Alice"
        })))
        .mount(server)
        .await;
}

async fn mount_github(server: &MockServer, verified: bool) {
    mount_token(server, "github").await;
    Mock::given(method("GET"))
        .and(path("/github/user"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 7,
            "login": "alice",
            "name": "Alice A."
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/github/emails"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"email": "alice@old.example.com", "verified": true, "primary": false},
            {"email": "alice@example.com", "verified": verified, "primary": true}
        ])))
        .mount(server)
        .await;
}

async fn get(app: &Router, uri: &str, cookie: Option<&str>) -> Response {
    let mut request = Request::builder().uri(uri);
    if let Some(cookie) = cookie {
        request = request.header(header::COOKIE, cookie);
    }
    app.clone()
        .oneshot(request.body(Body::empty()).unwrap())
        .await
        .unwrap()
}

fn location(response: &Response) -> Url {
    Url::parse(response.headers()[header::LOCATION].to_str().unwrap()).unwrap()
}

async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Run a whole login with `provider` and return the callback response
async fn login(app: &Router, provider: &str) -> Response {
    let start = get(app, &format!("/login/oauth2/{}", provider), None).await;
    assert_eq!(start.status(), StatusCode::TEMPORARY_REDIRECT);

    let params: HashMap<String, String> = location(&start).query_pairs().into_owned().collect();
    let callback = format!(
        "/login/oauth2/{}/callback?state={}&code=code-{}",
        provider, params["state"], provider
    );
    get(app, &callback, None).await
}

fn session_cookie(response: &Response) -> String {
    let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
    set_cookie.split(';').next().unwrap().to_string()
}

fn error_reason(response: &Response) -> Option<String> {
    location(response)
        .query_pairs()
        .find(|(k, _)| k == "reason")
        .map(|(_, v)| v.into_owned())
}

#[tokio::test]
async fn test_verified_email_links_second_provider() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_google(&server).await;
    mount_github(&server, true).await;

    let config = config(&server, &dir);
    let (app, _) = start_app(&config).await;

    let first = login(&app, "google").await;
    assert_eq!(first.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&first).as_str(), "http://localhost:8080/");
    let google_user = body_json(get(&app, "/me", Some(&session_cookie(&first))).await).await;

    let second = login(&app, "github").await;
    assert_eq!(location(&second).as_str(), "http://localhost:8080/");
    let github_user = body_json(get(&app, "/me", Some(&session_cookie(&second))).await).await;

    assert_eq!(google_user["id"], github_user["id"]);
    assert_eq!(github_user["name"], "Alice");
    assert_eq!(github_user["verified"], true);

    let providers: Vec<&str> = github_user["identities"]
        .as_array()
        .unwrap()
        .iter()
        .map(|link| link["provider"].as_str().unwrap())
        .collect();
    assert_eq!(providers.len(), 2);
    assert!(providers.contains(&"google"));
    assert!(providers.contains(&"github"));
}

#[tokio::test]
async fn test_accounts_survive_restart() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_google(&server).await;

    let config = config(&server, &dir);
    let (app, _) = start_app(&config).await;
    let cookie = session_cookie(&login(&app, "google").await);
    let before = body_json(get(&app, "/me", Some(&cookie)).await).await;
    drop(app);

    // A new server over the same database honours the old cookie
    let (restarted, _) = start_app(&config).await;
    let response = get(&restarted, "/me", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let after = body_json(response).await;
    assert_eq!(before["id"], after["id"]);

    // and logging in again finds the same account
    let again = session_cookie(&login(&restarted, "google").await);
    let relogged = body_json(get(&restarted, "/me", Some(&again)).await).await;
    assert_eq!(relogged["id"], before["id"]);
}

#[tokio::test]
async fn test_unverified_account_needs_confirmation() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_github(&server, false).await;

    let config = config(&server, &dir);
    let (app, state) = start_app(&config).await;

    // First login creates an unverified account
    let first = login(&app, "github").await;
    assert_eq!(location(&first).as_str(), "http://localhost:8080/");
    let me = body_json(get(&app, "/me", Some(&session_cookie(&first))).await).await;
    assert_eq!(me["verified"], false);

    // Returning with the same unverified identity is refused
    let second = login(&app, "github").await;
    assert_eq!(location(&second).path(), "/login/error");
    assert_eq!(
        error_reason(&second).as_deref(),
        Some("user_email_not_verified")
    );

    let confirmed = state.resolver.confirm_identity("github", "7").await.unwrap();
    assert!(confirmed.verified);

    let third = login(&app, "github").await;
    assert_eq!(location(&third).as_str(), "http://localhost:8080/");
    let me = body_json(get(&app, "/me", Some(&session_cookie(&third))).await).await;
    assert_eq!(me["id"], confirmed.id.to_string());
    assert_eq!(me["verified"], true);
}

#[tokio::test]
async fn test_unverified_identity_cannot_claim_verified_account() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_google(&server).await;
    mount_github(&server, false).await;

    let config = config(&server, &dir);
    let (app, _) = start_app(&config).await;

    let first = login(&app, "google").await;
    let owner = body_json(get(&app, "/me", Some(&session_cookie(&first))).await).await;

    // Same email but unverified at github: linked, not logged in
    let second = login(&app, "github").await;
    assert_eq!(location(&second).path(), "/login/error");
    assert_eq!(
        error_reason(&second).as_deref(),
        Some("user_identity_not_verified")
    );

    // The verified account is untouched
    let again = login(&app, "google").await;
    let me = body_json(get(&app, "/me", Some(&session_cookie(&again))).await).await;
    assert_eq!(me["id"], owner["id"]);
    assert_eq!(me["verified"], true);
}
