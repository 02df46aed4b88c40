use super::*;
use crate::providers::ApiClient;
use crate::storage::MemoryStorage;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

fn authorization_contains(needle: &'static str) -> impl Fn(&Request) -> bool + Send + Sync {
    move |request: &Request| {
        request
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.contains(needle))
    }
}

fn twitter_flow(server: &MockServer, store: Arc<MemoryStorage>, ttl: Duration) -> OAuth1Flow {
    let consumer = OAuth1Consumer::new(
        reqwest::Client::new(),
        OAuth1Signer::new("consumer-key", "consumer-secret"),
        &format!("{}/oauth/request_token", server.uri()),
        &format!("{}/oauth/authorize", server.uri()),
        &format!("{}/oauth/access_token", server.uri()),
    )
    .unwrap();

    OAuth1Flow::new(
        ProviderKind::Twitter,
        consumer,
        Url::parse("http://localhost:8080/login/oauth2/twitter/callback").unwrap(),
        store,
        ttl,
    )
}

async fn mount_request_token(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/oauth/request_token"))
        .and(authorization_contains("oauth_callback=\"http%3A%2F%2Flocalhost%3A8080%2Flogin%2Foauth2%2Ftwitter%2Fcallback\""))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "oauth_token=req-token&oauth_token_secret=req-secret&oauth_callback_confirmed=true",
        ))
        .mount(server)
        .await;
}

async fn mount_access_token(server: &MockServer, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/oauth/access_token"))
        .and(authorization_contains("oauth_token=\"req-token\""))
        .and(authorization_contains("oauth_verifier=\"verifier-1\""))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "oauth_token=acc-token&oauth_token_secret=acc-secret&user_id=1",
        ))
        .expect(expected_calls)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_start_redirects_to_authorize() {
    let server = MockServer::start().await;
    mount_request_token(&server).await;
    let store = Arc::new(MemoryStorage::new());

    let url = twitter_flow(&server, store.clone(), Duration::from_secs(600))
        .start()
        .await
        .unwrap();

    assert_eq!(
        url.as_str(),
        format!("{}/oauth/authorize?oauth_token=req-token", server.uri())
    );
    assert_eq!(
        store.take("oauth1:req-token").await.unwrap().as_deref(),
        Some("req-secret")
    );
}

#[tokio::test]
async fn test_finish_yields_signed_client() {
    let server = MockServer::start().await;
    mount_request_token(&server).await;
    mount_access_token(&server, 1).await;
    Mock::given(method("GET"))
        .and(path("/1.1/account/verify_credentials.json"))
        .and(authorization_contains("oauth_token=\"acc-token\""))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"id_str": "7"})),
        )
        .mount(&server)
        .await;

    let flow = twitter_flow(&server, Arc::new(MemoryStorage::new()), Duration::from_secs(600));
    flow.start().await.unwrap();

    let client = flow.finish("req-token", "verifier-1").await.unwrap();
    let profile = client
        .get_json(&format!("{}/1.1/account/verify_credentials.json", server.uri()))
        .await
        .unwrap();
    assert_eq!(profile["id_str"], "7");
}

#[tokio::test]
async fn test_request_token_is_single_use() {
    let server = MockServer::start().await;
    mount_request_token(&server).await;
    mount_access_token(&server, 1).await;

    let flow = twitter_flow(&server, Arc::new(MemoryStorage::new()), Duration::from_secs(600));
    flow.start().await.unwrap();

    assert!(flow.finish("req-token", "verifier-1").await.is_ok());
    let replay = flow.finish("req-token", "verifier-1").await;
    assert!(matches!(replay, Err(GatehouseError::OAuth(_))));
}

#[tokio::test]
async fn test_unknown_or_expired_token_is_rejected() {
    let server = MockServer::start().await;
    mount_request_token(&server).await;
    mount_access_token(&server, 0).await;

    let flow = twitter_flow(&server, Arc::new(MemoryStorage::new()), Duration::ZERO);
    flow.start().await.unwrap();

    assert!(flow.finish("req-token", "verifier-1").await.is_err());
    assert!(flow.finish("never-issued", "verifier-1").await.is_err());
}

#[tokio::test]
async fn test_request_token_failure_propagates() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/request_token"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let flow = twitter_flow(&server, Arc::new(MemoryStorage::new()), Duration::from_secs(600));
    assert!(matches!(
        flow.start().await,
        Err(GatehouseError::Network(_))
    ));
}
