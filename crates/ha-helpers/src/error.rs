//! Error types for the hub runtime

use ha_config_entries::ConfigEntriesError;
use ha_core::Platform;
use ha_service_registry::ServiceError;
use thiserror::Error;

/// Errors resolving OAuth2 implementations for a config entry
#[derive(Debug, Error)]
pub enum OAuth2Error {
    #[error("config entry {0} has no auth_implementation")]
    MissingImplementation(String),

    #[error("unknown OAuth2 implementation {implementation} for domain {domain}")]
    UnknownImplementation {
        domain: String,
        implementation: String,
    },

    #[error("invalid OAuth2 token: {0}")]
    InvalidToken(String),
}

/// Errors raised by entity update hooks
#[derive(Debug, Error)]
#[error("{0}")]
pub struct EntityError(pub String);

impl EntityError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Errors surfaced by integration setup and unload
#[derive(Debug, Error)]
pub enum IntegrationError {
    #[error(transparent)]
    OAuth2(#[from] OAuth2Error),

    #[error(transparent)]
    ConfigEntries(#[from] ConfigEntriesError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("invalid config for {domain}: {message}")]
    InvalidConfig { domain: String, message: String },

    #[error("platform {platform} failed: {message}")]
    Platform { platform: Platform, message: String },

    #[error("integration {0} is not loaded")]
    NotLoaded(String),

    #[error("setup failed: {0}")]
    Setup(String),
}

impl IntegrationError {
    pub fn platform(platform: Platform, message: impl Into<String>) -> Self {
        Self::Platform {
            platform,
            message: message.into(),
        }
    }
}

pub type IntegrationResult<T> = Result<T, IntegrationError>;
