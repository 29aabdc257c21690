//! Integration contract
//!
//! The hub drives integrations through three hooks: domain setup with the
//! root configuration, then setup and unload per config entry.

use std::sync::Arc;

use async_trait::async_trait;
use ha_config_entries::ConfigEntry;

use crate::error::IntegrationResult;
use crate::hass::HomeAssistant;

/// Root configuration as loaded from `configuration.yaml`
pub type ConfigType = serde_yaml::Value;

#[async_trait]
pub trait Integration: Send + Sync {
    fn domain(&self) -> &'static str;

    /// Set up the integration domain from the root configuration
    async fn setup(&self, _hass: &Arc<HomeAssistant>, _config: &ConfigType) -> IntegrationResult<bool> {
        Ok(true)
    }

    /// Set up one config entry
    async fn setup_entry(
        &self,
        hass: &Arc<HomeAssistant>,
        entry: &ConfigEntry,
    ) -> IntegrationResult<bool>;

    /// Unload one config entry
    async fn unload_entry(
        &self,
        hass: &Arc<HomeAssistant>,
        entry: &ConfigEntry,
    ) -> IntegrationResult<bool>;
}
