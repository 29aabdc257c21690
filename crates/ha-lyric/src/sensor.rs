//! Sensor platform: indoor temperature, indoor humidity and outdoor
//! temperature per thermostat, each only when the thermostat reports it

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ha_config_entries::ConfigEntry;
use ha_core::Platform;
use ha_helpers::{AddEntities, Entity, EntityPlatform, HomeAssistant, IntegrationError, IntegrationResult};
use serde_json::{json, Map, Value};

use crate::api::{Location, Thermostat};
use crate::client::LyricClient;
use crate::consts::{DATA_LYRIC_CLIENT, DOMAIN, SCAN_INTERVAL};
use crate::entity::{refresh_device, LyricDeviceEntity, LyricEntity, LyricUpdate};
use crate::error::LyricResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LyricSensor {
    IndoorTemperature,
    IndoorHumidity,
    OutdoorTemperature,
}

impl LyricSensor {
    pub const ALL: [LyricSensor; 3] = [
        LyricSensor::IndoorTemperature,
        LyricSensor::IndoorHumidity,
        LyricSensor::OutdoorTemperature,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            LyricSensor::IndoorTemperature => "indoor_temperature",
            LyricSensor::IndoorHumidity => "indoor_humidity",
            LyricSensor::OutdoorTemperature => "outdoor_temperature",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            LyricSensor::IndoorTemperature => "Indoor Temperature",
            LyricSensor::IndoorHumidity => "Indoor Humidity",
            LyricSensor::OutdoorTemperature => "Outdoor Temperature",
        }
    }

    fn device_class(&self) -> &'static str {
        match self {
            LyricSensor::IndoorHumidity => "humidity",
            _ => "temperature",
        }
    }

    fn icon(&self) -> &'static str {
        match self {
            LyricSensor::IndoorHumidity => "mdi:water-percent",
            _ => "mdi:thermometer",
        }
    }

    fn value(&self, device: &Thermostat) -> Option<f64> {
        match self {
            LyricSensor::IndoorTemperature => device.indoor_temperature,
            LyricSensor::IndoorHumidity => device.indoor_humidity,
            LyricSensor::OutdoorTemperature => device.outdoor_temperature,
        }
    }

    fn unit(&self, device: &Thermostat) -> &'static str {
        match (self, device.units.as_deref()) {
            (LyricSensor::IndoorHumidity, _) => "%",
            (_, Some("Celsius")) => "°C",
            _ => "°F",
        }
    }
}

#[async_trait]
impl LyricUpdate for LyricSensor {
    async fn lyric_update(
        &mut self,
        client: &LyricClient,
        location: &mut Location,
        device: &mut Thermostat,
    ) -> LyricResult<()> {
        refresh_device(client, location, device).await
    }

    fn state(&self, _location: &Location, device: &Thermostat) -> Option<String> {
        self.value(device).map(|v| v.to_string())
    }

    fn attributes(&self, _location: &Location, device: &Thermostat) -> Map<String, Value> {
        let mut attributes = Map::new();
        attributes.insert("unit_of_measurement".into(), json!(self.unit(device)));
        attributes
    }
}

fn sensor_entity(
    client: Arc<LyricClient>,
    location: Location,
    device: Thermostat,
    sensor: LyricSensor,
) -> LyricDeviceEntity<LyricSensor> {
    let unique_id = format!("{}_{}", device.mac_id, sensor.key());
    let name = format!("{} {}", device.display_name(), sensor.label());
    LyricDeviceEntity::new(
        LyricEntity::new(client, location, device, unique_id, name, sensor)
            .with_icon(sensor.icon())
            .with_device_class(sensor.device_class()),
    )
}

/// Sensor platform of the Lyric integration
pub struct LyricSensorPlatform {
    scan_interval: Duration,
}

impl LyricSensorPlatform {
    pub fn new(scan_interval: Duration) -> Self {
        Self { scan_interval }
    }
}

impl Default for LyricSensorPlatform {
    fn default() -> Self {
        Self::new(SCAN_INTERVAL)
    }
}

#[async_trait]
impl EntityPlatform for LyricSensorPlatform {
    fn platform(&self) -> Platform {
        Platform::Sensor
    }

    fn scan_interval(&self) -> Option<Duration> {
        Some(self.scan_interval)
    }

    async fn setup_entry(
        &self,
        hass: &Arc<HomeAssistant>,
        _entry: &ConfigEntry,
        add_entities: AddEntities,
    ) -> IntegrationResult<()> {
        let client = hass
            .data
            .get::<LyricClient>(DOMAIN, DATA_LYRIC_CLIENT)
            .ok_or_else(|| IntegrationError::NotLoaded(DOMAIN.to_string()))?;

        let mut entities: Vec<Box<dyn Entity>> = Vec::new();
        for (location, device) in client.devices() {
            for sensor in LyricSensor::ALL {
                // Only sensors the thermostat reports a value for
                if sensor.value(&device).is_some() {
                    entities.push(Box::new(sensor_entity(
                        client.clone(),
                        location.clone(),
                        device.clone(),
                        sensor,
                    )));
                }
            }
        }

        add_entities.add(entities, true).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thermostat(units: &str) -> Thermostat {
        serde_json::from_value(json!({
            "deviceID": "LCC-1",
            "macID": "MAC1",
            "deviceClass": "Thermostat",
            "name": "Hallway",
            "units": units,
            "indoorTemperature": 71,
            "indoorHumidity": 38
        }))
        .unwrap()
    }

    #[test]
    fn test_sensor_values() {
        let device = thermostat("Fahrenheit");
        assert_eq!(LyricSensor::IndoorTemperature.value(&device), Some(71.0));
        assert_eq!(LyricSensor::IndoorHumidity.value(&device), Some(38.0));
        assert_eq!(LyricSensor::OutdoorTemperature.value(&device), None);
    }

    #[test]
    fn test_units() {
        assert_eq!(LyricSensor::IndoorTemperature.unit(&thermostat("Celsius")), "°C");
        assert_eq!(LyricSensor::IndoorTemperature.unit(&thermostat("Fahrenheit")), "°F");
        assert_eq!(LyricSensor::IndoorHumidity.unit(&thermostat("Celsius")), "%");
    }

    #[test]
    fn test_sensor_identity() {
        let device = thermostat("Celsius");
        let location = Location {
            location_id: 1,
            name: "Home".into(),
            devices: vec![device.clone()],
        };
        let client = Arc::new(LyricClient::new(Arc::new(crate::api::Lyric::from_locations(
            vec![location.clone()],
        ))));

        let entity = sensor_entity(client, location, device, LyricSensor::IndoorHumidity);
        assert_eq!(entity.unique_id(), Some("MAC1_indoor_humidity"));
        assert_eq!(entity.name(), Some("Hallway Indoor Humidity"));
        assert_eq!(entity.device_class(), Some("humidity"));
        assert_eq!(entity.state().as_deref(), Some("38"));
    }
}
