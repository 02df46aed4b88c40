//! Authenticated HTTP clients for provider APIs

use super::oauth1::{OAuth1Signer, TokenPair};
use crate::Result;
use crate::error::NetworkError;
use async_trait::async_trait;
use reqwest::{Client, Method, header};
use serde_json::Value;
use std::sync::Arc;

/// An HTTP client already carrying a provider's credentials
#[async_trait]
pub trait ApiClient: Send + Sync {
    /// GET `url` and decode the body as JSON
    async fn get_json(&self, url: &str) -> Result<Value>;
}

/// OAuth2 client sending `Authorization: Bearer <token>`
#[derive(Clone)]
pub struct BearerClient {
    http: Client,
    access_token: String,
}

impl BearerClient {
    pub fn new(http: Client, access_token: impl Into<String>) -> Self {
        Self {
            http,
            access_token: access_token.into(),
        }
    }
}

impl std::fmt::Debug for BearerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerClient")
            .field("access_token", &"<redacted>")
            .finish()
    }
}

#[async_trait]
impl ApiClient for BearerClient {
    async fn get_json(&self, url: &str) -> Result<Value> {
        let request = self
            .http
            .get(url)
            .bearer_auth(&self.access_token)
            .header(header::ACCEPT, "application/json");
        read_json(url, request).await
    }
}

/// OAuth1.0a client signing every request with the consumer and access token
#[derive(Clone)]
pub struct SignedClient {
    http: Client,
    signer: Arc<OAuth1Signer>,
    token: TokenPair,
}

impl SignedClient {
    pub fn new(http: Client, signer: Arc<OAuth1Signer>, token: TokenPair) -> Self {
        Self {
            http,
            signer,
            token,
        }
    }
}

#[async_trait]
impl ApiClient for SignedClient {
    async fn get_json(&self, url: &str) -> Result<Value> {
        let parsed =
            url::Url::parse(url).map_err(|e| NetworkError::InvalidUrl(format!("{}: {}", url, e)))?;
        let authorization =
            self.signer
                .authorization_header(&Method::GET, &parsed, &[], Some(&self.token), &[])?;
        let request = self
            .http
            .get(parsed)
            .header(header::AUTHORIZATION, authorization)
            .header(header::ACCEPT, "application/json");
        read_json(url, request).await
    }
}

async fn read_json(url: &str, request: reqwest::RequestBuilder) -> Result<Value> {
    let response = request
        .send()
        .await
        .map_err(|e| NetworkError::Http(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(NetworkError::Status {
            status: status.as_u16(),
            url: url.to_string(),
        }
        .into());
    }

    let body = response
        .text()
        .await
        .map_err(|e| NetworkError::Http(e.to_string()))?;
    serde_json::from_str(&body)
        .map_err(|e| NetworkError::Malformed(format!("{}: {}", url, e)).into())
}
