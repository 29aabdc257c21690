//! Lyric cloud API client
//!
//! A small client for the parts of the Honeywell v2 API the integration
//! uses: listing locations with their thermostats and posting changeable
//! values. Locations are kept in memory and only change on
//! [`Lyric::update_locations`] or after a local change.

use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use ha_helpers::{LocalOAuth2Implementation, OAuth2Error, OAuth2Token};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::consts::API_BASE_URL;
use crate::error::{LyricApiError, LyricError};

const DEVICE_CLASS_THERMOSTAT: &str = "Thermostat";

/// A site with its thermostats
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    #[serde(rename = "locationID")]
    pub location_id: i64,
    pub name: String,
    #[serde(default)]
    pub devices: Vec<Thermostat>,
}

/// Values of a thermostat that can be changed through the API
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeableValues {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heat_setpoint: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cool_setpoint: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thermostat_setpoint_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_period_time: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A thermostat as reported by the API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thermostat {
    #[serde(rename = "deviceID")]
    pub device_id: String,
    #[serde(rename = "macID", default)]
    pub mac_id: String,
    #[serde(default)]
    pub device_class: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_defined_device_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_model: Option<String>,
    #[serde(default)]
    pub is_alive: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indoor_temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indoor_humidity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outdoor_temperature: Option<f64>,
    #[serde(default)]
    pub changeable_values: ChangeableValues,
}

impl Thermostat {
    /// Name shown to users, preferring the one set in the Lyric app
    pub fn display_name(&self) -> &str {
        self.user_defined_device_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.name)
    }
}

/// Everything needed to open an API session
#[derive(Debug, Clone)]
pub struct LyricCredentials {
    pub app_name: String,
    pub client_id: String,
    pub client_secret: String,
    pub token: OAuth2Token,
    pub token_cache_file: PathBuf,
}

impl LyricCredentials {
    /// Take credentials from a resolved OAuth2 implementation
    ///
    /// The implementation must carry a token and a token cache path.
    pub fn from_implementation(
        app_name: &str,
        implementation: &LocalOAuth2Implementation,
    ) -> Result<Self, LyricError> {
        let token = implementation.token.clone().ok_or_else(|| {
            OAuth2Error::InvalidToken("no token set on implementation".to_string())
        })?;
        let token_cache_file = implementation.token_cache_file.clone().ok_or_else(|| {
            LyricError::Config("no token cache file set on implementation".to_string())
        })?;

        Ok(Self {
            app_name: app_name.to_string(),
            client_id: implementation.client_id.clone(),
            client_secret: implementation.client_secret.clone(),
            token,
            token_cache_file,
        })
    }
}

struct Session {
    http: Client,
    base_url: String,
    client_id: String,
    access_token: String,
}

/// Lyric API client
pub struct Lyric {
    session: Option<Session>,
    locations: RwLock<Arc<Vec<Location>>>,
}

impl Lyric {
    /// Open a session against `base_url` without fetching anything yet
    ///
    /// The token is written to the token cache file first.
    pub async fn new(
        base_url: impl Into<String>,
        credentials: &LyricCredentials,
    ) -> Result<Self, LyricApiError> {
        write_token_cache(&credentials.token_cache_file, &credentials.token).await?;

        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(credentials.app_name.as_str())
            .build()?;

        Ok(Self {
            session: Some(Session {
                http,
                base_url: base_url.into(),
                client_id: credentials.client_id.clone(),
                access_token: credentials.token.access_token.clone(),
            }),
            locations: RwLock::new(Arc::new(Vec::new())),
        })
    }

    /// Client over fixed data; refreshes are no-ops and changes apply locally
    pub fn from_locations(locations: Vec<Location>) -> Self {
        Self {
            session: None,
            locations: RwLock::new(Arc::new(locations)),
        }
    }

    /// Snapshot of the current locations
    pub fn locations(&self) -> Arc<Vec<Location>> {
        self.locations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn replace_locations(&self, locations: Vec<Location>) {
        *self
            .locations
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Arc::new(locations);
    }

    /// Re-fetch locations and their thermostats
    pub async fn update_locations(&self) -> Result<(), LyricApiError> {
        let Some(session) = &self.session else {
            return Ok(());
        };

        let url = format!("{}/locations", session.base_url);
        debug!(%url, "Fetching Lyric locations");

        let response = session
            .http
            .get(&url)
            .query(&[("apikey", session.client_id.as_str())])
            .bearer_auth(&session.access_token)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {
                let mut locations: Vec<Location> = response.json().await?;
                for location in &mut locations {
                    location
                        .devices
                        .retain(|d| d.device_class == DEVICE_CLASS_THERMOSTAT);
                }

                info!(
                    locations = locations.len(),
                    thermostats = locations.iter().map(|l| l.devices.len()).sum::<usize>(),
                    "Updated Lyric locations"
                );
                self.replace_locations(locations);
                Ok(())
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                warn!("Lyric API rejected the access token");
                Err(LyricApiError::Unauthorized)
            }
            status => Err(LyricApiError::Status {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            }),
        }
    }

    /// Post changed values for a thermostat
    ///
    /// `changes` is merged over the thermostat's current changeable values.
    pub async fn update_thermostat(
        &self,
        location: &Location,
        device: &Thermostat,
        changes: Map<String, Value>,
    ) -> Result<(), LyricApiError> {
        let mut body = match serde_json::to_value(&device.changeable_values)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        body.extend(changes);

        let Some(session) = &self.session else {
            self.apply_local_change(location.location_id, &device.device_id, body)?;
            return Ok(());
        };

        let url = format!(
            "{}/devices/thermostats/{}",
            session.base_url, device.device_id
        );
        debug!(%url, device_id = %device.device_id, "Updating Lyric thermostat");

        let location_id = location.location_id.to_string();
        let response = session
            .http
            .post(&url)
            .query(&[
                ("apikey", session.client_id.as_str()),
                ("locationId", location_id.as_str()),
            ])
            .bearer_auth(&session.access_token)
            .json(&body)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(LyricApiError::Unauthorized),
            status => Err(LyricApiError::Status {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            }),
        }
    }

    fn apply_local_change(
        &self,
        location_id: i64,
        device_id: &str,
        values: Map<String, Value>,
    ) -> Result<(), LyricApiError> {
        let changeable: ChangeableValues = serde_json::from_value(Value::Object(values))?;

        let mut locations = (*self.locations()).clone();
        if let Some(device) = locations
            .iter_mut()
            .filter(|l| l.location_id == location_id)
            .flat_map(|l| l.devices.iter_mut())
            .find(|d| d.device_id == device_id)
        {
            device.changeable_values = changeable;
        }
        self.replace_locations(locations);
        Ok(())
    }
}

async fn write_token_cache(path: &Path, token: &OAuth2Token) -> Result<(), LyricApiError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, serde_json::to_vec_pretty(token)?).await?;
    debug!(path = %path.display(), "Wrote Lyric token cache");
    Ok(())
}

/// Opens Lyric API sessions during config entry setup
#[async_trait]
pub trait LyricConnector: Send + Sync {
    async fn connect(&self, credentials: LyricCredentials) -> Result<Lyric, LyricApiError>;
}

/// Connects to the Lyric cloud and loads the locations
#[derive(Debug, Clone)]
pub struct HttpConnector {
    base_url: String,
}

impl HttpConnector {
    pub fn new() -> Self {
        Self::with_base_url(API_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

impl Default for HttpConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LyricConnector for HttpConnector {
    async fn connect(&self, credentials: LyricCredentials) -> Result<Lyric, LyricApiError> {
        let lyric = Lyric::new(self.base_url.clone(), &credentials).await?;
        lyric.update_locations().await?;
        Ok(lyric)
    }
}
