//! OAuth 2.0 authorization code flow with PKCE

use crate::constants::OAUTH2_STATE_PREFIX;
use crate::error::NetworkError;
use crate::providers::{BearerClient, ProviderKind};
use crate::storage::EphemeralStore;
use crate::{GatehouseError, Result};
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointNotSet, EndpointSet,
    PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, RequestTokenError, Scope, TokenResponse,
    TokenUrl, basic::BasicClient,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Client with auth and token endpoints set
type CodeClient =
    BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// What a started login leaves behind until its callback arrives
#[derive(Debug, Serialize, Deserialize)]
struct PendingAuthorization {
    provider: String,
    verifier: String,
}

/// Authorization code login against one OAuth2 provider
#[derive(Clone)]
pub struct OAuth2Flow {
    provider: ProviderKind,
    client: CodeClient,
    scopes: Vec<String>,
    http: reqwest::Client,
    ephemeral: Arc<dyn EphemeralStore>,
    ttl: Duration,
}

/// Endpoints and credentials for an [`OAuth2Flow`]
#[derive(Debug, Clone)]
pub struct OAuth2Settings {
    pub client_id: String,
    pub client_secret: String,
    pub auth_url: String,
    pub token_url: String,
    pub redirect_url: String,
    pub scopes: Vec<String>,
}

impl OAuth2Flow {
    pub fn new(
        provider: ProviderKind,
        settings: OAuth2Settings,
        http: reqwest::Client,
        ephemeral: Arc<dyn EphemeralStore>,
        ttl: Duration,
    ) -> Result<Self> {
        let client = BasicClient::new(ClientId::new(settings.client_id))
            .set_client_secret(ClientSecret::new(settings.client_secret))
            .set_auth_uri(
                AuthUrl::new(settings.auth_url)
                    .map_err(|e| GatehouseError::auth(format!("Invalid auth URL: {}", e)))?,
            )
            .set_token_uri(
                TokenUrl::new(settings.token_url)
                    .map_err(|e| GatehouseError::auth(format!("Invalid token URL: {}", e)))?,
            )
            .set_redirect_uri(
                RedirectUrl::new(settings.redirect_url)
                    .map_err(|e| GatehouseError::auth(format!("Invalid redirect URI: {}", e)))?,
            );

        Ok(Self {
            provider,
            client,
            scopes: settings.scopes,
            http,
            ephemeral,
            ttl,
        })
    }

    /// Build the consent URL and remember its state and PKCE verifier
    pub async fn start(&self) -> Result<Url> {
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let (auth_url, csrf_token) = self
            .client
            .authorize_url(CsrfToken::new_random)
            .add_scopes(self.scopes.iter().map(|s| Scope::new(s.clone())))
            .add_extra_param("access_type", "offline")
            .set_pkce_challenge(pkce_challenge)
            .url();

        let pending = PendingAuthorization {
            provider: self.provider.id().to_string(),
            verifier: pkce_verifier.secret().clone(),
        };
        self.ephemeral
            .put(
                &state_key(csrf_token.secret()),
                &serde_json::to_string(&pending)?,
                self.ttl,
            )
            .await?;

        Ok(auth_url)
    }

    /// Consume `state` and exchange `code` for an access token
    ///
    /// A state is accepted once: unknown, expired and replayed states all
    /// fail before the token endpoint is contacted.
    pub async fn finish(&self, state: &str, code: &str) -> Result<BearerClient> {
        let pending = self
            .ephemeral
            .take(&state_key(state))
            .await?
            .ok_or_else(|| GatehouseError::auth("Unknown or expired OAuth state"))?;
        let pending: PendingAuthorization = serde_json::from_str(&pending)?;

        if pending.provider != self.provider.id() {
            return Err(GatehouseError::auth(format!(
                "OAuth state was issued for {}, not {}",
                pending.provider, self.provider
            )));
        }

        let token = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .set_pkce_verifier(PkceCodeVerifier::new(pending.verifier))
            .request_async(&self.http)
            .await
            .map_err(|e| match e {
                RequestTokenError::Request(e) => GatehouseError::Network(NetworkError::Http(
                    format!("Token request failed: {}", e),
                )),
                other => GatehouseError::auth(format!("Token exchange failed: {}", other)),
            })?;

        Ok(BearerClient::new(
            self.http.clone(),
            token.access_token().secret().clone(),
        ))
    }
}

fn state_key(state: &str) -> String {
    format!("{}{}", OAUTH2_STATE_PREFIX, state)
}
