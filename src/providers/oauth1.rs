//! OAuth 1.0a consumer (RFC 5849, HMAC-SHA1)
//!
//! Only what a "sign in with" flow needs: obtaining a request token,
//! sending the user to the authorize page, trading the verifier for an
//! access token and signing API calls with it.

use super::client::SignedClient;
use crate::error::NetworkError;
use crate::{GatehouseError, Result};
use base64::{Engine, engine::general_purpose::STANDARD};
use hmac::{Hmac, Mac};
use rand::Rng;
use reqwest::{Client, Method, header};
use sha1::Sha1;
use std::sync::Arc;
use url::Url;

type HmacSha1 = Hmac<Sha1>;

const NONCE_LEN: usize = 32;

/// A token and its secret, either a request token or an access token
#[derive(Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub token: String,
    pub secret: String,
}

impl TokenPair {
    pub fn new(token: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            secret: secret.into(),
        }
    }
}

impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair")
            .field("token", &self.token)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Signs requests on behalf of one consumer
pub struct OAuth1Signer {
    consumer_key: String,
    consumer_secret: String,
}

impl OAuth1Signer {
    pub fn new(consumer_key: impl Into<String>, consumer_secret: impl Into<String>) -> Self {
        Self {
            consumer_key: consumer_key.into(),
            consumer_secret: consumer_secret.into(),
        }
    }

    /// `Authorization` header value for a request
    ///
    /// `form` holds urlencoded body parameters, which take part in the
    /// signature. `extra_oauth` carries protocol parameters such as
    /// `oauth_callback` or `oauth_verifier`.
    pub fn authorization_header(
        &self,
        method: &Method,
        url: &Url,
        form: &[(&str, &str)],
        token: Option<&TokenPair>,
        extra_oauth: &[(&str, &str)],
    ) -> Result<String> {
        let nonce = generate_nonce();
        let timestamp = chrono::Utc::now().timestamp().to_string();

        let mut oauth: Vec<(String, String)> = vec![
            ("oauth_consumer_key".into(), self.consumer_key.clone()),
            ("oauth_nonce".into(), nonce),
            ("oauth_signature_method".into(), "HMAC-SHA1".into()),
            ("oauth_timestamp".into(), timestamp),
            ("oauth_version".into(), "1.0".into()),
        ];
        if let Some(token) = token {
            oauth.push(("oauth_token".into(), token.token.clone()));
        }
        oauth.extend(
            extra_oauth
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string())),
        );

        let mut params = oauth.clone();
        params.extend(form.iter().map(|(k, v)| (k.to_string(), v.to_string())));

        let signature = self.signature(
            method,
            url,
            &params,
            token.map(|t| t.secret.as_str()).unwrap_or_default(),
        )?;
        oauth.push(("oauth_signature".into(), signature));

        let fields: Vec<String> = oauth
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", encode(k), encode(v)))
            .collect();
        Ok(format!("OAuth {}", fields.join(", ")))
    }

    /// Base64 HMAC-SHA1 signature over the signature base string
    ///
    /// `params` are the oauth and body parameters; query parameters are
    /// taken from `url`.
    pub fn signature(
        &self,
        method: &Method,
        url: &Url,
        params: &[(String, String)],
        token_secret: &str,
    ) -> Result<String> {
        let base = signature_base(method, url, params);
        let key = format!("{}&{}", encode(&self.consumer_secret), encode(token_secret));

        let mut mac = HmacSha1::new_from_slice(key.as_bytes())
            .map_err(|e| GatehouseError::auth(format!("Invalid signing key: {}", e)))?;
        mac.update(base.as_bytes());
        Ok(STANDARD.encode(mac.finalize().into_bytes()))
    }
}

/// `METHOD&base_url&normalized_params`, each part percent-encoded
pub fn signature_base(method: &Method, url: &Url, params: &[(String, String)]) -> String {
    let mut encoded: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (encode(&k), encode(&v)))
        .chain(params.iter().map(|(k, v)| (encode(k), encode(v))))
        .collect();
    encoded.sort();

    let normalized = encoded
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    let mut base_url = url.clone();
    base_url.set_query(None);
    base_url.set_fragment(None);

    format!(
        "{}&{}&{}",
        method.as_str().to_uppercase(),
        encode(base_url.as_str()),
        encode(&normalized)
    )
}

/// RFC 3986 percent-encoding: everything but `A-Z a-z 0-9 - . _ ~`
fn encode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

fn generate_nonce() -> String {
    rand::rng()
        .sample_iter(rand::distr::Alphanumeric)
        .take(NONCE_LEN)
        .map(char::from)
        .collect()
}

/// The three-legged OAuth 1.0a dance against one provider
pub struct OAuth1Consumer {
    http: Client,
    signer: Arc<OAuth1Signer>,
    request_token_url: Url,
    authorize_url: Url,
    access_token_url: Url,
}

impl OAuth1Consumer {
    pub fn new(
        http: Client,
        signer: OAuth1Signer,
        request_token_url: &str,
        authorize_url: &str,
        access_token_url: &str,
    ) -> Result<Self> {
        Ok(Self {
            http,
            signer: Arc::new(signer),
            request_token_url: parse_url(request_token_url)?,
            authorize_url: parse_url(authorize_url)?,
            access_token_url: parse_url(access_token_url)?,
        })
    }

    /// Obtain a temporary request token bound to `callback`
    pub async fn request_token(&self, callback: &str) -> Result<TokenPair> {
        let authorization = self.signer.authorization_header(
            &Method::POST,
            &self.request_token_url,
            &[],
            None,
            &[("oauth_callback", callback)],
        )?;
        let fields = self.post_for_token(&self.request_token_url, authorization).await?;

        if let Some(confirmed) = fields.iter().find(|(k, _)| k == "oauth_callback_confirmed")
            && confirmed.1 != "true"
        {
            return Err(GatehouseError::auth("Provider did not confirm the callback URL"));
        }
        token_from_fields(&fields)
    }

    /// Where to send the user to approve `request_token`
    pub fn authorize_url(&self, request_token: &TokenPair) -> Url {
        let mut url = self.authorize_url.clone();
        url.query_pairs_mut()
            .append_pair("oauth_token", &request_token.token);
        url
    }

    /// Trade an approved request token and its verifier for an access token
    pub async fn access_token(&self, request_token: &TokenPair, verifier: &str) -> Result<TokenPair> {
        let authorization = self.signer.authorization_header(
            &Method::POST,
            &self.access_token_url,
            &[],
            Some(request_token),
            &[("oauth_verifier", verifier)],
        )?;
        let fields = self.post_for_token(&self.access_token_url, authorization).await?;
        token_from_fields(&fields)
    }

    /// API client signing with `access_token`
    pub fn client(&self, access_token: TokenPair) -> SignedClient {
        SignedClient::new(self.http.clone(), self.signer.clone(), access_token)
    }

    async fn post_for_token(&self, url: &Url, authorization: String) -> Result<Vec<(String, String)>> {
        let response = self
            .http
            .post(url.clone())
            .header(header::AUTHORIZATION, authorization)
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
        Ok(url::form_urlencoded::parse(body.as_bytes())
            .into_owned()
            .collect())
    }
}

fn token_from_fields(fields: &[(String, String)]) -> Result<TokenPair> {
    let get = |name: &str| {
        fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
            .filter(|v| !v.is_empty())
    };
    match (get("oauth_token"), get("oauth_token_secret")) {
        (Some(token), Some(secret)) => Ok(TokenPair { token, secret }),
        _ => Err(NetworkError::Malformed("token response missing oauth_token".to_string()).into()),
    }
}

fn parse_url(value: &str) -> Result<Url> {
    Url::parse(value).map_err(|e| NetworkError::InvalidUrl(format!("{}: {}", value, e)).into())
}
