//! Identity providers for the session gate.
//!
//! QueryBox never authenticates anyone itself. It either trusts a fixed
//! address from configuration ([`StaticIdentity`]) or an email header set by
//! an identity-aware proxy in front of the server ([`HeaderIdentity`]).
//! Sign-in, sign-up and profile pages belong to that provider; their URLs
//! come from `[identity]` in the config.

use anyhow::{bail, Result};
use async_trait::async_trait;
use axum::http::HeaderMap;
use std::sync::Arc;

use crate::config::IdentityConfig;
use crate::traits::{Identity, IdentityProvider};

#[derive(Debug, Clone, Default)]
struct ProviderUrls {
    sign_in: Option<String>,
    sign_up: Option<String>,
    profile: Option<String>,
}

impl ProviderUrls {
    fn from_config(config: &IdentityConfig) -> Self {
        Self {
            sign_in: config.sign_in_url.clone(),
            sign_up: config.sign_up_url.clone(),
            profile: config.profile_url.clone(),
        }
    }
}

/// Every request belongs to one configured address, or to nobody.
pub struct StaticIdentity {
    identity: Option<Identity>,
    urls: ProviderUrls,
}

impl StaticIdentity {
    pub fn new(email: Option<String>) -> Self {
        Self {
            identity: email
                .map(|e| e.trim().to_string())
                .filter(|e| !e.is_empty())
                .map(Identity::new),
            urls: ProviderUrls::default(),
        }
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn authenticate(&self, _headers: &HeaderMap) -> Result<Option<Identity>> {
        Ok(self.identity.clone())
    }

    fn sign_in_url(&self) -> Option<&str> {
        self.urls.sign_in.as_deref()
    }

    fn sign_up_url(&self) -> Option<&str> {
        self.urls.sign_up.as_deref()
    }

    fn profile_url(&self) -> Option<&str> {
        self.urls.profile.as_deref()
    }
}

/// Trusts an email header injected by a fronting identity proxy.
///
/// Only safe when the server is reachable exclusively through that proxy.
pub struct HeaderIdentity {
    header: String,
    urls: ProviderUrls,
}

impl HeaderIdentity {
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into().to_ascii_lowercase(),
            urls: ProviderUrls::default(),
        }
    }
}

#[async_trait]
impl IdentityProvider for HeaderIdentity {
    async fn authenticate(&self, headers: &HeaderMap) -> Result<Option<Identity>> {
        let Some(value) = headers.get(self.header.as_str()) else {
            return Ok(None);
        };
        let Ok(email) = value.to_str() else {
            return Ok(None);
        };
        let email = email.trim();
        if email.is_empty() || !email.contains('@') {
            return Ok(None);
        }
        Ok(Some(Identity::new(email)))
    }

    fn sign_in_url(&self) -> Option<&str> {
        self.urls.sign_in.as_deref()
    }

    fn sign_up_url(&self) -> Option<&str> {
        self.urls.sign_up.as_deref()
    }

    fn profile_url(&self) -> Option<&str> {
        self.urls.profile.as_deref()
    }
}

/// Build the provider named by `identity.mode`.
///
/// `user_override` (the CLI `--user` flag) forces a static identity.
pub fn create_identity_provider(
    config: &IdentityConfig,
    user_override: Option<&str>,
) -> Result<Arc<dyn IdentityProvider>> {
    let urls = ProviderUrls::from_config(config);

    if let Some(email) = user_override {
        let mut provider = StaticIdentity::new(Some(email.to_string()));
        provider.urls = urls;
        return Ok(Arc::new(provider));
    }

    match config.mode.as_str() {
        "static" => {
            let mut provider = StaticIdentity::new(config.email.clone());
            provider.urls = urls;
            Ok(Arc::new(provider))
        }
        "header" => {
            let mut provider = HeaderIdentity::new(config.header.clone());
            provider.urls = urls;
            Ok(Arc::new(provider))
        }
        other => bail!("Unknown identity mode: {}", other),
    }
}

/// Resolve the terminal user or explain how to sign in.
pub async fn require_cli_identity(provider: &dyn IdentityProvider) -> Result<Identity> {
    match provider.authenticate(&HeaderMap::new()).await? {
        Some(identity) => Ok(identity),
        None => bail!("not signed in: pass --user <email> or set identity.email in the config"),
    }
}
