//! Public URLs of the login endpoints
//!
//! Every helper joins the public URL's own path, the route path and any
//! extra segments, collapsing duplicate slashes, without touching the
//! stored public URL.

use crate::{GatehouseError, Result};
use url::Url;

/// Where the login endpoints live, as seen from the browser
#[derive(Debug, Clone)]
pub struct LoginContext {
    pub public_url: Url,
    pub cookie_name: String,
    pub auth_path: String,
    pub login_path: String,
    pub logout_path: String,
    pub success_path: String,
    pub error_path: String,
}

impl LoginContext {
    /// Context with the default route layout under `public_url`
    pub fn new(public_url: &str) -> Result<Self> {
        let public_url = Url::parse(public_url).map_err(|e| {
            GatehouseError::config(format!("Invalid public URL {}: {}", public_url, e))
        })?;
        Ok(Self {
            public_url,
            cookie_name: crate::constants::DEFAULT_COOKIE_NAME.to_string(),
            auth_path: crate::constants::DEFAULT_AUTH_PATH.to_string(),
            login_path: crate::constants::DEFAULT_LOGIN_PATH.to_string(),
            logout_path: crate::constants::DEFAULT_LOGOUT_PATH.to_string(),
            success_path: crate::constants::DEFAULT_SUCCESS_PATH.to_string(),
            error_path: crate::constants::DEFAULT_ERROR_PATH.to_string(),
        })
    }

    pub fn auth_url(&self, parts: &[&str]) -> Url {
        self.join(&self.auth_path, parts)
    }

    pub fn login_url(&self, parts: &[&str]) -> Url {
        self.join(&self.login_path, parts)
    }

    pub fn logout_url(&self, parts: &[&str]) -> Url {
        self.join(&self.logout_path, parts)
    }

    pub fn success_url(&self, parts: &[&str]) -> Url {
        self.join(&self.success_path, parts)
    }

    pub fn error_url(&self, parts: &[&str]) -> Url {
        self.join(&self.error_path, parts)
    }

    /// Provider callback URL registered with the provider
    pub fn callback_url(&self, provider: &str) -> Url {
        self.login_url(&[provider, "callback"])
    }

    /// Domain the session cookie is scoped to
    pub fn cookie_domain(&self) -> String {
        self.public_url.host_str().unwrap_or_default().to_string()
    }

    fn join(&self, route: &str, parts: &[&str]) -> Url {
        let mut url = self.public_url.clone();
        let base = url.path().to_string();
        let joined = join_paths(
            std::iter::once(base.as_str())
                .chain(std::iter::once(route))
                .chain(parts.iter().copied()),
        );
        url.set_path(&joined);
        url
    }
}

/// Join path fragments the way a URL path is cleaned: no empty or `.`
/// segments, `..` pops, always rooted
pub fn join_paths<'a>(fragments: impl Iterator<Item = &'a str>) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in fragments.flat_map(|f| f.split('/')) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    format!("/{}", segments.join("/"))
}
