//! Service call type for invoking hub services

use crate::Context;
use serde::{Deserialize, Serialize};

/// A call to a registered service
///
/// Each service belongs to a domain and receives free-form JSON service
/// data, e.g. `lyric.set_hold_time` with an `entity_id` and a `time_period`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceCall {
    /// The domain the service belongs to (e.g., "lyric", "climate")
    pub domain: String,

    /// The service name (e.g., "set_hold_time")
    pub service: String,

    /// Data passed to the service
    pub service_data: serde_json::Value,

    /// Context tracking who initiated this call
    pub context: Context,
}

impl ServiceCall {
    /// Create a new service call
    pub fn new(
        domain: impl Into<String>,
        service: impl Into<String>,
        service_data: serde_json::Value,
        context: Context,
    ) -> Self {
        Self {
            domain: domain.into(),
            service: service.into(),
            service_data,
            context,
        }
    }

    /// Get the full service identifier (domain.service)
    pub fn service_id(&self) -> String {
        format!("{}.{}", self.domain, self.service)
    }

    /// Get a typed value from service_data
    pub fn get<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.service_data
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Get entity_id(s) from service data
    ///
    /// Accepts both a single string and a list of strings.
    pub fn entity_ids(&self) -> Vec<String> {
        match self.service_data.get("entity_id") {
            Some(serde_json::Value::String(s)) => vec![s.clone()],
            Some(serde_json::Value::Array(arr)) => arr
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect(),
            _ => vec![],
        }
    }
}

/// Whether a service supports returning a response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SupportsResponse {
    /// Service never returns a response
    #[default]
    None,
    /// Service may optionally return a response
    Optional,
    /// Service always returns a response
    Only,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_service_id() {
        let call = ServiceCall::new("lyric", "set_hold_time", json!({}), Context::new());
        assert_eq!(call.service_id(), "lyric.set_hold_time");
    }

    #[test]
    fn test_get_service_data() {
        let call = ServiceCall::new(
            "lyric",
            "set_hold_time",
            json!({"time_period": "01:30:00", "retries": 2}),
            Context::new(),
        );

        assert_eq!(call.get::<String>("time_period").as_deref(), Some("01:30:00"));
        assert_eq!(call.get::<u32>("retries"), Some(2));
        assert_eq!(call.get::<String>("missing"), None);
    }

    #[test]
    fn test_entity_ids_single_and_list() {
        let single = ServiceCall::new(
            "lyric",
            "set_hold_time",
            json!({"entity_id": "climate.hallway"}),
            Context::new(),
        );
        assert_eq!(single.entity_ids(), vec!["climate.hallway"]);

        let many = ServiceCall::new(
            "lyric",
            "set_hold_time",
            json!({"entity_id": ["climate.hallway", "climate.attic"]}),
            Context::new(),
        );
        assert_eq!(many.entity_ids(), vec!["climate.hallway", "climate.attic"]);

        let none = ServiceCall::new("lyric", "set_hold_time", json!({}), Context::new());
        assert!(none.entity_ids().is_empty());
    }
}
