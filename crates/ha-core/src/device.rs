//! Device information attached to entities
//!
//! Entities that belong to one physical device report a [`DeviceInfo`] so
//! the hub can group them under a single device entry.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A device identifier (domain, id) pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceIdentifier(pub String, pub String);

impl DeviceIdentifier {
    pub fn new(domain: impl Into<String>, id: impl Into<String>) -> Self {
        Self(domain.into(), id.into())
    }

    pub fn domain(&self) -> &str {
        &self.0
    }

    pub fn id(&self) -> &str {
        &self.1
    }

    /// Create a key for indexing
    pub fn key(&self) -> String {
        format!("{}:{}", self.0, self.1)
    }
}

/// Device description reported by an entity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Identifiers that uniquely identify the device across restarts
    pub identifiers: BTreeSet<DeviceIdentifier>,

    /// Device name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Model name or id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Manufacturer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,

    /// Firmware version
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sw_version: Option<String>,
}

impl DeviceInfo {
    /// Create device info with a single identifier
    pub fn new(identifier: DeviceIdentifier) -> Self {
        Self {
            identifiers: BTreeSet::from([identifier]),
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_manufacturer(mut self, manufacturer: impl Into<String>) -> Self {
        self.manufacturer = Some(manufacturer.into());
        self
    }

    pub fn with_sw_version(mut self, sw_version: impl Into<String>) -> Self {
        self.sw_version = Some(sw_version.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_key() {
        let id = DeviceIdentifier::new("lyric", "00D02D49B1C2");
        assert_eq!(id.domain(), "lyric");
        assert_eq!(id.id(), "00D02D49B1C2");
        assert_eq!(id.key(), "lyric:00D02D49B1C2");
    }

    #[test]
    fn test_identifier_serializes_as_pair() {
        let json = serde_json::to_value(DeviceIdentifier::new("lyric", "abc")).unwrap();
        assert_eq!(json, serde_json::json!(["lyric", "abc"]));
    }

    #[test]
    fn test_builder() {
        let info = DeviceInfo::new(DeviceIdentifier::new("lyric", "mac"))
            .with_name("Hallway")
            .with_model("LCC-123")
            .with_manufacturer("Honeywell");

        assert_eq!(info.identifiers.len(), 1);
        assert_eq!(info.name.as_deref(), Some("Hallway"));
        assert_eq!(info.model.as_deref(), Some("LCC-123"));
        assert_eq!(info.manufacturer.as_deref(), Some("Honeywell"));
        assert!(info.sw_version.is_none());
    }
}
