//! Domain configuration
//!
//! ```yaml
//! lyric:
//!   client_id: !secret lyric_client_id
//!   client_secret: !secret lyric_client_secret
//! ```

use serde::Deserialize;
use serde_yaml::Value;

use crate::consts::DOMAIN;
use crate::error::{LyricError, LyricResult};

/// Client credentials from the `lyric:` section; unknown keys are ignored
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LyricConfig {
    pub client_id: String,
    pub client_secret: String,
}

impl LyricConfig {
    /// Extract the `lyric:` section from the root configuration
    ///
    /// Returns None when the section is absent.
    pub fn from_config(config: &Value) -> LyricResult<Option<Self>> {
        let Some(section) = config.get(DOMAIN) else {
            return Ok(None);
        };

        serde_yaml::from_value(section.clone())
            .map(Some)
            .map_err(|e| LyricError::Config(e.to_string()))
    }
}
