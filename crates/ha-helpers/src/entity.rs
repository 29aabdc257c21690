//! Entity contract
//!
//! Everything a platform adds to the hub implements [`Entity`]. Identity
//! and presentation have defaults; `update` does not.

use async_trait::async_trait;
use ha_core::{DeviceInfo, STATE_UNAVAILABLE, STATE_UNKNOWN};
use serde_json::{Map, Value};

use crate::error::EntityError;

#[async_trait]
pub trait Entity: Send + Sync {
    /// Stable identifier across restarts
    fn unique_id(&self) -> Option<&str> {
        None
    }

    fn name(&self) -> Option<&str> {
        None
    }

    fn icon(&self) -> Option<&str> {
        None
    }

    fn device_class(&self) -> Option<&str> {
        None
    }

    fn available(&self) -> bool {
        true
    }

    /// Current state value, None when unknown
    fn state(&self) -> Option<String> {
        None
    }

    fn attributes(&self) -> Map<String, Value> {
        Map::new()
    }

    /// Device this entity belongs to
    fn device_info(&self) -> Option<DeviceInfo> {
        None
    }

    /// Refresh the entity from its data source
    async fn update(&mut self) -> Result<(), EntityError>;

    /// State as shown to users, folding in availability
    fn display_state(&self) -> String {
        if !self.available() {
            return STATE_UNAVAILABLE.to_string();
        }
        self.state().unwrap_or_else(|| STATE_UNKNOWN.to_string())
    }
}
