//! Provider handshakes
//!
//! Sends the browser to a provider and turns the callback into an
//! authenticated API client:
//! - **OAuth2**: authorization code with CSRF state and PKCE (Google, Facebook, GitHub)
//! - **OAuth1.0a**: request token / access token (Twitter)
//!
//! Handshake state lives in an [`EphemeralStore`] and is consumed exactly once.

pub mod oauth1_flow;
pub mod oauth2_flow;

pub use oauth1_flow::OAuth1Flow;
pub use oauth2_flow::{OAuth2Flow, OAuth2Settings};

use crate::config::Config;
use crate::login::LoginContext;
use crate::providers::{
    ApiClient, DescriptorNormalizer, Handshake, Normalizer, OAuth1Consumer, OAuth1Signer,
    ProviderDescriptor, ProviderKind,
};
use crate::storage::EphemeralStore;
use crate::{GatehouseError, Result};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Query parameters a provider may send back to the callback
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
    pub oauth_token: Option<String>,
    pub oauth_verifier: Option<String>,
    /// Set by OAuth1 providers when the user cancels
    pub denied: Option<String>,
}

impl CallbackParams {
    fn require<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str> {
        value
            .as_deref()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| GatehouseError::auth(format!("Missing {} in callback", name)))
    }
}

/// The handshake a provider speaks
#[derive(Clone)]
pub enum LoginFlow {
    OAuth2(OAuth2Flow),
    OAuth1(OAuth1Flow),
}

impl LoginFlow {
    /// URL to send the browser to
    pub async fn start(&self) -> Result<Url> {
        match self {
            LoginFlow::OAuth2(flow) => flow.start().await,
            LoginFlow::OAuth1(flow) => flow.start().await,
        }
    }

    /// Complete the handshake from the callback parameters
    pub async fn finish(&self, params: &CallbackParams) -> Result<Box<dyn ApiClient>> {
        match self {
            LoginFlow::OAuth2(flow) => {
                if let Some(error) = &params.error {
                    let detail = params.error_description.as_deref().unwrap_or(error);
                    return Err(GatehouseError::auth(format!(
                        "Authorization denied: {}",
                        detail
                    )));
                }
                let state = CallbackParams::require(&params.state, "state")?;
                let code = CallbackParams::require(&params.code, "code")?;
                Ok(Box::new(flow.finish(state, code).await?))
            }
            LoginFlow::OAuth1(flow) => {
                if params.denied.is_some() {
                    return Err(GatehouseError::auth("Authorization denied"));
                }
                let token = CallbackParams::require(&params.oauth_token, "oauth_token")?;
                let verifier = CallbackParams::require(&params.oauth_verifier, "oauth_verifier")?;
                Ok(Box::new(flow.finish(token, verifier).await?))
            }
        }
    }
}

/// A configured provider: how to log in and how to read the profile
pub struct Provider {
    pub descriptor: Arc<ProviderDescriptor>,
    pub normalizer: Arc<dyn Normalizer>,
    pub flow: LoginFlow,
}

impl Provider {
    pub fn kind(&self) -> ProviderKind {
        self.descriptor.kind
    }
}

/// Enabled providers, in configuration order
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: Vec<Arc<Provider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every configured provider
    pub fn from_config(
        config: &Config,
        ctx: &LoginContext,
        ephemeral: Arc<dyn EphemeralStore>,
    ) -> Result<Self> {
        let http = build_http_client()?;
        let ttl = config.handshake_ttl();
        let mut registry = Self::new();

        for provider in &config.providers {
            let descriptor = Arc::new(ProviderDescriptor::from_config(provider)?);
            let callback_url = ctx.callback_url(descriptor.kind.id());

            let flow = match &descriptor.handshake {
                Handshake::OAuth2 {
                    auth_url,
                    token_url,
                    scopes,
                } => LoginFlow::OAuth2(OAuth2Flow::new(
                    descriptor.kind,
                    OAuth2Settings {
                        client_id: provider.client_id.clone(),
                        client_secret: provider.client_secret.clone(),
                        auth_url: auth_url.clone(),
                        token_url: token_url.clone(),
                        redirect_url: callback_url.to_string(),
                        scopes: scopes.clone(),
                    },
                    http.clone(),
                    ephemeral.clone(),
                    ttl,
                )?),
                Handshake::OAuth1 {
                    request_token_url,
                    authorize_url,
                    access_token_url,
                } => LoginFlow::OAuth1(OAuth1Flow::new(
                    descriptor.kind,
                    OAuth1Consumer::new(
                        http.clone(),
                        OAuth1Signer::new(&provider.client_id, &provider.client_secret),
                        request_token_url,
                        authorize_url,
                        access_token_url,
                    )?,
                    callback_url,
                    ephemeral.clone(),
                    ttl,
                )),
            };

            registry.register(Provider {
                normalizer: Arc::new(DescriptorNormalizer::new(descriptor.clone())),
                descriptor,
                flow,
            })?;
        }

        Ok(registry)
    }

    /// Add a provider; each kind may be registered once
    pub fn register(&mut self, provider: Provider) -> Result<()> {
        if self.get(provider.kind().id()).is_some() {
            return Err(GatehouseError::config(format!(
                "Provider {} is already registered",
                provider.kind()
            )));
        }
        self.providers.push(Arc::new(provider));
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<Arc<Provider>> {
        self.providers
            .iter()
            .find(|p| p.kind().id() == id)
            .cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Provider>> {
        self.providers.iter()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

/// HTTP client for provider calls
///
/// Redirects are not followed so an authorization code can never be
/// forwarded to another host.
pub fn build_http_client() -> Result<reqwest::Client> {
    reqwest::ClientBuilder::new()
        .redirect(reqwest::redirect::Policy::none())
        .timeout(Duration::from_secs(30))
        .user_agent(concat!("gatehouse/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| GatehouseError::config(format!("Failed to build HTTP client: {}", e)))
}

#[cfg(test)]
mod oauth1_flow_test;
