//! OAuth2 implementations and tokens
//!
//! The hub keeps a registry of OAuth2 implementations per integration
//! domain. A config entry names the implementation it was created with in
//! its `auth_implementation` data field and carries the token obtained
//! during the flow under `token`.

use std::path::{Path, PathBuf};

use dashmap::DashMap;
use ha_config_entries::ConfigEntry;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::OAuth2Error;

/// Config entry data key naming the OAuth2 implementation
pub const CONF_AUTH_IMPLEMENTATION: &str = "auth_implementation";

/// Config entry data key holding the OAuth2 token
pub const CONF_TOKEN: &str = "token";

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// An OAuth2 token as stored in config entry data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuth2Token {
    pub access_token: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    #[serde(default = "default_token_type")]
    pub token_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,

    /// Expiry as a unix timestamp in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// Provider specific fields, kept verbatim
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl OAuth2Token {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            token_type: default_token_type(),
            expires_in: None,
            expires_at: None,
            scope: None,
            extra: serde_json::Map::new(),
        }
    }

    /// Read the token stored in a config entry
    pub fn from_entry(entry: &ConfigEntry) -> Result<Self, OAuth2Error> {
        let value = entry.data.get(CONF_TOKEN).ok_or_else(|| {
            OAuth2Error::InvalidToken(format!("config entry {} has no token", entry.entry_id))
        })?;

        serde_json::from_value(value.clone()).map_err(|e| OAuth2Error::InvalidToken(e.to_string()))
    }
}

/// An OAuth2 implementation configured locally with client credentials
///
/// Besides the client descriptor it holds the token and token cache path
/// handed to a vendor client during entry setup.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalOAuth2Implementation {
    pub domain: String,
    pub client_id: String,
    pub client_secret: String,
    pub authorize_url: String,
    pub token_url: String,
    pub token: Option<OAuth2Token>,
    pub token_cache_file: Option<PathBuf>,
}

impl LocalOAuth2Implementation {
    pub fn new(
        domain: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        authorize_url: impl Into<String>,
        token_url: impl Into<String>,
    ) -> Self {
        Self {
            domain: domain.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            authorize_url: authorize_url.into(),
            token_url: token_url.into(),
            token: None,
            token_cache_file: None,
        }
    }

    pub fn with_token(mut self, token: OAuth2Token) -> Self {
        self.token = Some(token);
        self
    }

    pub fn with_token_cache_file(mut self, path: impl AsRef<Path>) -> Self {
        self.token_cache_file = Some(path.as_ref().to_path_buf());
        self
    }

}

/// Registry of OAuth2 implementations, keyed by integration domain and
/// implementation id
#[derive(Default)]
pub struct OAuth2Implementations {
    by_domain: DashMap<String, DashMap<String, LocalOAuth2Implementation>>,
}

impl OAuth2Implementations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an implementation for an integration domain
    ///
    /// The implementation id is the implementation's own domain.
    pub fn register(&self, domain: &str, implementation: LocalOAuth2Implementation) {
        info!(
            domain,
            implementation = %implementation.domain,
            "Registered OAuth2 implementation"
        );
        self.by_domain
            .entry(domain.to_string())
            .or_default()
            .insert(implementation.domain.clone(), implementation);
    }

    /// All implementations registered for a domain
    pub fn implementations(&self, domain: &str) -> Vec<LocalOAuth2Implementation> {
        self.by_domain
            .get(domain)
            .map(|m| m.iter().map(|r| r.value().clone()).collect())
            .unwrap_or_default()
    }

    pub fn get(&self, domain: &str, implementation: &str) -> Option<LocalOAuth2Implementation> {
        self.by_domain
            .get(domain)?
            .get(implementation)
            .map(|r| r.value().clone())
    }

    /// Resolve the implementation a config entry was created with
    pub fn config_entry_implementation(
        &self,
        entry: &ConfigEntry,
    ) -> Result<LocalOAuth2Implementation, OAuth2Error> {
        let implementation = entry
            .data_str(CONF_AUTH_IMPLEMENTATION)
            .ok_or_else(|| OAuth2Error::MissingImplementation(entry.entry_id.clone()))?;

        debug!(entry_id = %entry.entry_id, implementation, "Resolving OAuth2 implementation");

        self.get(&entry.domain, implementation)
            .ok_or_else(|| OAuth2Error::UnknownImplementation {
                domain: entry.domain.clone(),
                implementation: implementation.to_string(),
            })
    }
}
