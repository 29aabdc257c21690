//! Entity platform names
//!
//! A platform is an entity category (climate, sensor, ...) that an
//! integration forwards its config entries to.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error returned when parsing an unknown platform name
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown platform: {0}")]
pub struct PlatformParseError(pub String);

/// Entity platforms an integration can forward setup to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    BinarySensor,
    Climate,
    Sensor,
    Switch,
}

impl Platform {
    /// The platform name as used in service and entity ids
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::BinarySensor => "binary_sensor",
            Platform::Climate => "climate",
            Platform::Sensor => "sensor",
            Platform::Switch => "switch",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = PlatformParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "binary_sensor" => Ok(Platform::BinarySensor),
            "climate" => Ok(Platform::Climate),
            "sensor" => Ok(Platform::Sensor),
            "switch" => Ok(Platform::Switch),
            other => Err(PlatformParseError(other.to_string())),
        }
    }
}
