//! Honeywell Lyric integration
//!
//! Connects Lyric thermostats to the hub. Credentials come from the
//! `lyric:` section of the configuration; each config entry carries the
//! OAuth2 token obtained for one account. Entry setup opens an API
//! session, stores a [`LyricClient`] in shared domain data and forwards
//! to the climate and sensor platforms.

pub mod api;
pub mod client;
pub mod climate;
pub mod config;
pub mod consts;
pub mod entity;
pub mod error;
pub mod sensor;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ha_config_entries::{ConfigEntry, ConfigEntryUpdate};
use ha_helpers::{
    ConfigType, HomeAssistant, Integration, IntegrationResult, LocalOAuth2Implementation,
    OAuth2Token, CONF_AUTH_IMPLEMENTATION,
};
use serde_json::json;
use tracing::{debug, info, instrument};

pub use api::{HttpConnector, Location, Lyric, LyricConnector, LyricCredentials, Thermostat};
pub use client::LyricClient;
pub use config::LyricConfig;
pub use consts::*;
pub use entity::{LyricDeviceEntity, LyricEntity, LyricUpdate};
pub use error::{LyricApiError, LyricError, LyricResult};

use crate::climate::LyricClimatePlatform;
use crate::sensor::LyricSensorPlatform;

/// The Lyric integration
pub struct LyricIntegration {
    connector: Arc<dyn LyricConnector>,
    scan_interval: Duration,
}

impl LyricIntegration {
    /// Integration talking to the Lyric cloud
    pub fn new() -> Self {
        Self::with_connector(Arc::new(HttpConnector::new()))
    }

    pub fn with_connector(connector: Arc<dyn LyricConnector>) -> Self {
        Self {
            connector,
            scan_interval: SCAN_INTERVAL,
        }
    }

    /// Poll entities every `scan_interval` instead of the default
    pub fn with_scan_interval(mut self, scan_interval: Duration) -> Self {
        self.scan_interval = scan_interval;
        self
    }
}

impl Default for LyricIntegration {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Integration for LyricIntegration {
    fn domain(&self) -> &'static str {
        DOMAIN
    }

    /// Register the platforms and, when configured, the OAuth2 implementation
    #[instrument(skip_all)]
    async fn setup(&self, hass: &Arc<HomeAssistant>, config: &ConfigType) -> IntegrationResult<bool> {
        hass.data.init_domain(DOMAIN);
        hass.platforms
            .register(DOMAIN, Arc::new(LyricClimatePlatform::new(self.scan_interval)));
        hass.platforms
            .register(DOMAIN, Arc::new(LyricSensorPlatform::new(self.scan_interval)));

        let Some(lyric_config) = LyricConfig::from_config(config)? else {
            debug!("No lyric configuration, skipping OAuth2 registration");
            return Ok(true);
        };

        hass.oauth2.register(
            DOMAIN,
            LocalOAuth2Implementation::new(
                DOMAIN,
                lyric_config.client_id,
                lyric_config.client_secret,
                OAUTH2_AUTHORIZE,
                OAUTH2_TOKEN,
            ),
        );
        Ok(true)
    }

    #[instrument(skip_all, fields(entry_id = %entry.entry_id))]
    async fn setup_entry(
        &self,
        hass: &Arc<HomeAssistant>,
        entry: &ConfigEntry,
    ) -> IntegrationResult<bool> {
        let entry = if entry.data_str(CONF_AUTH_IMPLEMENTATION).is_none() {
            let mut data = entry.data.clone();
            data.insert(CONF_AUTH_IMPLEMENTATION.to_string(), json!(DOMAIN));
            debug!("Backfilling auth_implementation");
            hass.config_entries
                .update(&entry.entry_id, ConfigEntryUpdate::new().data(data))
                .await?
        } else {
            entry.clone()
        };

        let token = OAuth2Token::from_entry(&entry)?;
        let implementation = hass
            .oauth2
            .config_entry_implementation(&entry)?
            .with_token(token)
            .with_token_cache_file(hass.config_path(CONF_LYRIC_CONFIG_FILE));

        let credentials = LyricCredentials::from_implementation(APP_NAME, &implementation)?;
        let lyric = self
            .connector
            .connect(credentials)
            .await
            .map_err(LyricError::from)?;

        let client = LyricClient::new(Arc::new(lyric));
        info!(locations = ?client.location_names(), "Connected to Lyric");
        hass.data.insert(DOMAIN, DATA_LYRIC_CLIENT, Arc::new(client));

        hass.forward_entry_setups(&entry, &PLATFORMS);
        Ok(true)
    }

    #[instrument(skip_all, fields(entry_id = %entry.entry_id))]
    async fn unload_entry(
        &self,
        hass: &Arc<HomeAssistant>,
        entry: &ConfigEntry,
    ) -> IntegrationResult<bool> {
        let unloaded = hass.forward_entry_unloads(entry, &PLATFORMS).await?;

        hass.services.unregister(DOMAIN, SERVICE_HOLD_TIME);
        hass.data.remove_domain(DOMAIN);
        Ok(unloaded)
    }
}
