//! OAuth 1.0a three-legged login

use crate::constants::OAUTH1_TOKEN_PREFIX;
use crate::providers::{OAuth1Consumer, ProviderKind, SignedClient, TokenPair};
use crate::storage::EphemeralStore;
use crate::{GatehouseError, Result};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Request-token login against one OAuth1.0a provider
#[derive(Clone)]
pub struct OAuth1Flow {
    provider: ProviderKind,
    consumer: Arc<OAuth1Consumer>,
    callback_url: Url,
    ephemeral: Arc<dyn EphemeralStore>,
    ttl: Duration,
}

impl OAuth1Flow {
    pub fn new(
        provider: ProviderKind,
        consumer: OAuth1Consumer,
        callback_url: Url,
        ephemeral: Arc<dyn EphemeralStore>,
        ttl: Duration,
    ) -> Self {
        Self {
            provider,
            consumer: Arc::new(consumer),
            callback_url,
            ephemeral,
            ttl,
        }
    }

    /// Obtain a request token, keep its secret, and return the approval URL
    pub async fn start(&self) -> Result<Url> {
        let request_token = self.consumer.request_token(self.callback_url.as_str()).await?;

        self.ephemeral
            .put(
                &token_key(&request_token.token),
                &request_token.secret,
                self.ttl,
            )
            .await?;

        Ok(self.consumer.authorize_url(&request_token))
    }

    /// Consume the request token and trade it for an access token
    pub async fn finish(&self, oauth_token: &str, verifier: &str) -> Result<SignedClient> {
        let secret = self
            .ephemeral
            .take(&token_key(oauth_token))
            .await?
            .ok_or_else(|| GatehouseError::auth("Unknown or expired request token"))?;

        let request_token = TokenPair::new(oauth_token, secret);
        let access_token = self.consumer.access_token(&request_token, verifier).await?;

        Ok(self.consumer.client(access_token))
    }
}

fn token_key(token: &str) -> String {
    format!("{}{}", OAUTH1_TOKEN_PREFIX, token)
}
