//! Climate platform
//!
//! One climate entity per thermostat, plus the `lyric.set_hold_time`
//! service which holds the current setpoint for a period of time.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Local;
use dashmap::DashMap;
use ha_config_entries::ConfigEntry;
use ha_core::{Platform, ServiceCall};
use ha_helpers::{AddEntities, Entity, EntityPlatform, HomeAssistant, IntegrationError, IntegrationResult};
use ha_service_registry::{ServiceDescription, ServiceError, ServiceResult};
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::api::{Location, Thermostat};
use crate::client::LyricClient;
use crate::consts::{
    ATTR_TIME_PERIOD, DATA_LYRIC_CLIENT, DEFAULT_HOLD_TIME, DOMAIN, PRESET_HOLD_UNTIL,
    SCAN_INTERVAL, SERVICE_HOLD_TIME,
};
use crate::entity::{refresh_device, LyricDeviceEntity, LyricEntity, LyricUpdate};
use crate::error::{LyricError, LyricResult};

/// Parse a `HH:MM[:SS]` hold period
pub fn parse_hold_time(value: &str) -> LyricResult<Duration> {
    let invalid = || LyricError::InvalidHoldTime(value.to_string());

    let parts = value
        .split(':')
        .map(|p| p.trim().parse::<u64>().map_err(|_| invalid()))
        .collect::<LyricResult<Vec<_>>>()?;

    let (hours, minutes, seconds) = match parts.as_slice() {
        [h, m] => (*h, *m, 0),
        [h, m, s] => (*h, *m, *s),
        _ => return Err(invalid()),
    };

    if minutes >= 60 || seconds >= 60 {
        return Err(invalid());
    }

    let total = hours
        .checked_mul(3600)
        .and_then(|h| h.checked_add(minutes * 60 + seconds))
        .ok_or_else(invalid)?;

    let period = Duration::from_secs(total);
    if period.is_zero() {
        return Err(invalid());
    }
    Ok(period)
}

/// Local wall-clock time `period` from now, as `HH:MM:SS`
fn hold_until(period: Duration) -> LyricResult<String> {
    let period = chrono::Duration::from_std(period)
        .map_err(|e| LyricError::InvalidHoldTime(e.to_string()))?;
    let until = Local::now()
        .checked_add_signed(period)
        .ok_or_else(|| LyricError::InvalidHoldTime(format!("{:?} is out of range", period)))?;
    Ok(until.format("%H:%M:%S").to_string())
}

/// Climate behavior of a thermostat
pub struct ThermostatClimate;

#[async_trait]
impl LyricUpdate for ThermostatClimate {
    async fn lyric_update(
        &mut self,
        client: &LyricClient,
        location: &mut Location,
        device: &mut Thermostat,
    ) -> LyricResult<()> {
        refresh_device(client, location, device).await
    }

    /// HVAC mode as reported by the thermostat
    fn state(&self, _location: &Location, device: &Thermostat) -> Option<String> {
        device
            .changeable_values
            .mode
            .as_ref()
            .map(|mode| match mode.as_str() {
                "Heat" => "heat".to_string(),
                "Cool" => "cool".to_string(),
                "Off" => "off".to_string(),
                "Auto" => "heat_cool".to_string(),
                other => other.to_lowercase(),
            })
    }

    fn attributes(&self, _location: &Location, device: &Thermostat) -> Map<String, Value> {
        let values = &device.changeable_values;
        let mut attributes = Map::new();
        attributes.insert("current_temperature".into(), json!(device.indoor_temperature));
        attributes.insert("current_humidity".into(), json!(device.indoor_humidity));
        attributes.insert("target_temp_low".into(), json!(values.heat_setpoint));
        attributes.insert("target_temp_high".into(), json!(values.cool_setpoint));
        attributes.insert("preset_mode".into(), json!(values.thermostat_setpoint_status));
        attributes.insert("next_period_time".into(), json!(values.next_period_time));
        attributes.insert("temperature_unit".into(), json!(device.units));
        attributes
    }
}

pub type LyricClimate = LyricDeviceEntity<ThermostatClimate>;

fn climate_entity(client: Arc<LyricClient>, location: Location, device: Thermostat) -> LyricClimate {
    let unique_id = device.mac_id.clone();
    let name = device.display_name().to_string();
    LyricDeviceEntity::new(LyricEntity::new(
        client,
        location,
        device,
        unique_id,
        name,
        ThermostatClimate,
    ))
}

fn hold_time_description() -> ServiceDescription {
    ServiceDescription::new(DOMAIN, SERVICE_HOLD_TIME)
        .with_name("Set hold time")
        .with_description("Hold the current setpoint until a time period has passed")
        .with_schema(json!({
            "type": "object",
            "required": ["entity_id"],
            "properties": {
                "entity_id": {
                    "anyOf": [
                        {"type": "string"},
                        {"type": "array", "items": {"type": "string"}}
                    ]
                },
                "time_period": {
                    "type": "string",
                    "pattern": "^[0-9]{1,2}:[0-9]{2}(:[0-9]{2})?$"
                }
            }
        }))
}

/// entity_id -> device_id of the thermostat it controls
type HoldTargets = Arc<DashMap<String, String>>;

async fn set_hold_time(
    client: Arc<LyricClient>,
    targets: HoldTargets,
    call: ServiceCall,
) -> ServiceResult {
    let time_period = call
        .get::<String>(ATTR_TIME_PERIOD)
        .unwrap_or_else(|| DEFAULT_HOLD_TIME.to_string());
    let next_period_time = hold_until(parse_hold_time(&time_period)?)?;

    for entity_id in call.entity_ids() {
        let device_id = targets
            .get(&entity_id)
            .map(|r| r.value().clone())
            .ok_or_else(|| ServiceError::InvalidData(format!("unknown entity {entity_id}")))?;
        let (location, device) = client
            .find_device(&device_id)
            .ok_or(LyricError::DeviceNotFound(device_id))?;

        let mut changes = Map::new();
        changes.insert(
            "thermostatSetpointStatus".into(),
            json!(PRESET_HOLD_UNTIL),
        );
        changes.insert("nextPeriodTime".into(), json!(next_period_time));

        info!(%entity_id, %next_period_time, "Setting hold time");
        client
            .lyric()
            .update_thermostat(&location, &device, changes)
            .await
            .map_err(LyricError::from)?;
    }

    client.refresh().await.map_err(LyricError::from)?;
    Ok(None)
}

/// Climate platform of the Lyric integration
pub struct LyricClimatePlatform {
    scan_interval: Duration,
}

impl LyricClimatePlatform {
    pub fn new(scan_interval: Duration) -> Self {
        Self { scan_interval }
    }
}

impl Default for LyricClimatePlatform {
    fn default() -> Self {
        Self::new(SCAN_INTERVAL)
    }
}

#[async_trait]
impl EntityPlatform for LyricClimatePlatform {
    fn platform(&self) -> Platform {
        Platform::Climate
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

        let mut device_ids = Vec::new();
        let mut entities: Vec<Box<dyn Entity>> = Vec::new();
        for (location, device) in client.devices() {
            device_ids.push(device.device_id.clone());
            entities.push(Box::new(climate_entity(client.clone(), location, device)));
        }

        let entity_ids = add_entities.add(entities, true).await;

        let targets: HoldTargets = Arc::new(entity_ids.into_iter().zip(device_ids).collect());
        debug!(count = targets.len(), "Registering hold time service");

        hass.services
            .register_with_description(hold_time_description(), move |call| {
                set_hold_time(client.clone(), targets.clone(), call)
            });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hold_time() {
        assert_eq!(parse_hold_time("01:00:00").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_hold_time("2:30").unwrap(), Duration::from_secs(9000));
        assert_eq!(parse_hold_time("00:00:45").unwrap(), Duration::from_secs(45));
    }

    #[test]
    fn test_parse_hold_time_rejects() {
        for value in ["", "1", "01:60:00", "01:00:60", "aa:bb", "00:00:00", "1:2:3:4", "-1:00"] {
            assert!(
                matches!(parse_hold_time(value), Err(LyricError::InvalidHoldTime(_))),
                "{value} should be rejected"
            );
        }
    }

    #[test]
    fn test_parse_hold_time_rejects_overflow() {
        let huge = format!("{}:00:00", u64::MAX / 1000);
        assert!(matches!(
            parse_hold_time(&huge),
            Err(LyricError::InvalidHoldTime(_))
        ));
    }

    #[test]
    fn test_hold_until_rejects_out_of_range_period() {
        let period = parse_hold_time(&format!("{}:00:00", u64::MAX / 3600)).unwrap();
        assert!(matches!(hold_until(period), Err(LyricError::InvalidHoldTime(_))));
    }

    #[test]
    fn test_hold_until_format() {
        let until = hold_until(Duration::from_secs(90 * 60)).unwrap();
        let parts: Vec<&str> = until.split(':').collect();
        assert_eq!(parts.len(), 3);
        assert!(parts.iter().all(|p| p.len() == 2));
    }

    #[test]
    fn test_climate_state_and_attributes() {
        let device: Thermostat = serde_json::from_value(json!({
            "deviceID": "LCC-1",
            "macID": "MAC1",
            "deviceClass": "Thermostat",
            "name": "Hallway",
            "units": "Celsius",
            "indoorTemperature": 20.5,
            "changeableValues": {
                "mode": "Auto",
                "heatSetpoint": 19,
                "coolSetpoint": 24,
                "thermostatSetpointStatus": "NoHold"
            }
        }))
        .unwrap();
        let location = Location {
            location_id: 1,
            name: "Home".into(),
            devices: vec![device.clone()],
        };

        assert_eq!(
            ThermostatClimate.state(&location, &device).as_deref(),
            Some("heat_cool")
        );
        let attributes = ThermostatClimate.attributes(&location, &device);
        assert_eq!(attributes["current_temperature"], 20.5);
        assert_eq!(attributes["target_temp_low"], 19.0);
        assert_eq!(attributes["preset_mode"], "NoHold");
        assert_eq!(attributes["temperature_unit"], "Celsius");
    }
}
