//! Base entities for Lyric thermostats
//!
//! [`LyricEntity`] carries identity, availability and the thermostat it
//! reports on; what it reports is decided by its kind, a [`LyricUpdate`]
//! implementation. [`LyricDeviceEntity`] adds device grouping.

use std::sync::Arc;

use async_trait::async_trait;
use ha_core::{DeviceIdentifier, DeviceInfo};
use ha_helpers::{Entity, EntityError};
use serde_json::{Map, Value};

use crate::api::{Location, Thermostat};
use crate::client::LyricClient;
use crate::consts::{DOMAIN, MANUFACTURER, MIN_REFRESH_INTERVAL};
use crate::error::{LyricError, LyricResult};

/// Behavior of a concrete Lyric entity
///
/// `lyric_update` has no default, so every kind has to say how it refreshes:
///
/// ```compile_fail
/// use ha_lyric::entity::LyricUpdate;
///
/// struct Forgetful;
///
/// #[async_trait::async_trait]
/// impl LyricUpdate for Forgetful {}
/// ```
#[async_trait]
pub trait LyricUpdate: Send + Sync {
    /// Refresh `location` and `device` from the client
    async fn lyric_update(
        &mut self,
        client: &LyricClient,
        location: &mut Location,
        device: &mut Thermostat,
    ) -> LyricResult<()>;

    fn state(&self, _location: &Location, _device: &Thermostat) -> Option<String> {
        None
    }

    fn attributes(&self, _location: &Location, _device: &Thermostat) -> Map<String, Value> {
        Map::new()
    }
}

/// Re-fetch data unless it is recent and pick this thermostat out of it
pub async fn refresh_device(
    client: &LyricClient,
    location: &mut Location,
    device: &mut Thermostat,
) -> LyricResult<()> {
    client.refresh_if_older_than(MIN_REFRESH_INTERVAL).await?;

    let (fresh_location, fresh_device) = client
        .find_device(&device.device_id)
        .ok_or_else(|| LyricError::DeviceNotFound(device.device_id.clone()))?;

    *location = fresh_location;
    *device = fresh_device;
    Ok(())
}

/// Identity and availability shared by all Lyric entities
pub struct LyricEntity<K> {
    client: Arc<LyricClient>,
    location: Location,
    device: Thermostat,
    unique_id: String,
    name: String,
    icon: Option<String>,
    device_class: Option<String>,
    available: bool,
    kind: K,
}

impl<K: LyricUpdate> LyricEntity<K> {
    /// New entities start unavailable until their first successful update
    pub fn new(
        client: Arc<LyricClient>,
        location: Location,
        device: Thermostat,
        unique_id: impl Into<String>,
        name: impl Into<String>,
        kind: K,
    ) -> Self {
        Self {
            client,
            location,
            device,
            unique_id: unique_id.into(),
            name: name.into(),
            icon: None,
            device_class: None,
            available: false,
            kind,
        }
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    pub fn with_device_class(mut self, device_class: impl Into<String>) -> Self {
        self.device_class = Some(device_class.into());
        self
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn device(&self) -> &Thermostat {
        &self.device
    }

    pub fn kind(&self) -> &K {
        &self.kind
    }
}

#[async_trait]
impl<K: LyricUpdate> Entity for LyricEntity<K> {
    fn unique_id(&self) -> Option<&str> {
        Some(&self.unique_id)
    }

    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn icon(&self) -> Option<&str> {
        self.icon.as_deref()
    }

    fn device_class(&self) -> Option<&str> {
        self.device_class.as_deref()
    }

    fn available(&self) -> bool {
        self.available
    }

    fn state(&self) -> Option<String> {
        self.kind.state(&self.location, &self.device)
    }

    fn attributes(&self) -> Map<String, Value> {
        self.kind.attributes(&self.location, &self.device)
    }

    /// Runs the kind's hook; availability is set only when it succeeds
    async fn update(&mut self) -> Result<(), EntityError> {
        self.kind
            .lyric_update(&self.client, &mut self.location, &mut self.device)
            .await?;
        self.available = true;
        Ok(())
    }
}

/// A Lyric entity grouped under its thermostat device
pub struct LyricDeviceEntity<K> {
    inner: LyricEntity<K>,
}

impl<K: LyricUpdate> LyricDeviceEntity<K> {
    pub fn new(inner: LyricEntity<K>) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &LyricEntity<K> {
        &self.inner
    }
}

#[async_trait]
impl<K: LyricUpdate> Entity for LyricDeviceEntity<K> {
    fn unique_id(&self) -> Option<&str> {
        self.inner.unique_id()
    }

    fn name(&self) -> Option<&str> {
        self.inner.name()
    }

    fn icon(&self) -> Option<&str> {
        self.inner.icon()
    }

    fn device_class(&self) -> Option<&str> {
        self.inner.device_class()
    }

    fn available(&self) -> bool {
        self.inner.available()
    }

    fn state(&self) -> Option<String> {
        self.inner.state()
    }

    fn attributes(&self) -> Map<String, Value> {
        self.inner.attributes()
    }

    fn device_info(&self) -> Option<DeviceInfo> {
        let device = self.inner.device();
        Some(
            DeviceInfo::new(DeviceIdentifier::new(DOMAIN, &device.mac_id))
                .with_name(&device.name)
                .with_model(&device.device_id)
                .with_manufacturer(MANUFACTURER),
        )
    }

    async fn update(&mut self) -> Result<(), EntityError> {
        self.inner.update().await
    }
}
