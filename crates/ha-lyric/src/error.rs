//! Error types for the Lyric integration

use ha_helpers::{EntityError, IntegrationError, OAuth2Error};
use ha_service_registry::ServiceError;
use thiserror::Error;

use crate::consts::DOMAIN;

/// Errors from the Lyric cloud API client
#[derive(Debug, Error)]
pub enum LyricApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("authentication with the Lyric API failed")]
    Unauthorized,

    #[error("Lyric API returned {status}: {message}")]
    Status { status: u16, message: String },
}

/// Errors raised by the Lyric integration
#[derive(Debug, Error)]
pub enum LyricError {
    #[error("invalid lyric config: {0}")]
    Config(String),

    #[error(transparent)]
    Api(#[from] LyricApiError),

    #[error(transparent)]
    Token(#[from] OAuth2Error),

    #[error("thermostat {0} not found")]
    DeviceNotFound(String),

    #[error("invalid hold time '{0}', expected HH:MM:SS")]
    InvalidHoldTime(String),
}

pub type LyricResult<T> = Result<T, LyricError>;

impl From<LyricError> for IntegrationError {
    fn from(err: LyricError) -> Self {
        match err {
            LyricError::Config(message) => IntegrationError::InvalidConfig {
                domain: DOMAIN.to_string(),
                message,
            },
            LyricError::Token(e) => IntegrationError::OAuth2(e),
            other => IntegrationError::Setup(other.to_string()),
        }
    }
}

impl From<LyricError> for ServiceError {
    fn from(err: LyricError) -> Self {
        match err {
            LyricError::InvalidHoldTime(_) | LyricError::DeviceNotFound(_) => {
                ServiceError::InvalidData(err.to_string())
            }
            other => ServiceError::CallFailed(other.to_string()),
        }
    }
}

impl From<LyricError> for EntityError {
    fn from(err: LyricError) -> Self {
        EntityError::new(err.to_string())
    }
}
