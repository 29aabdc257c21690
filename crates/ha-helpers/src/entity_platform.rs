//! Entity platforms
//!
//! An integration registers one [`EntityPlatform`] per platform it supports
//! (climate, sensor, ...). Config entry setup is forwarded to those
//! platforms, which create entities and hand them to [`AddEntities`].

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use ha_config_entries::ConfigEntry;
use ha_core::Platform;
use regex::Regex;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::entity::Entity;
use crate::error::{EntityError, IntegrationResult};
use crate::hass::HomeAssistant;

/// Shared, mutable handle to an entity
pub type EntityRef = Arc<Mutex<Box<dyn Entity>>>;

/// An entity added to the hub
#[derive(Clone)]
pub struct EntityHandle {
    pub entity_id: String,
    pub entry_id: String,
    pub platform: Platform,
    entity: EntityRef,
}

impl EntityHandle {
    pub fn entity(&self) -> EntityRef {
        self.entity.clone()
    }

    /// Run the entity's update hook
    pub async fn update(&self) -> Result<(), EntityError> {
        self.entity.lock().await.update().await
    }

    pub async fn display_state(&self) -> String {
        self.entity.lock().await.display_state()
    }

    pub async fn available(&self) -> bool {
        self.entity.lock().await.available()
    }
}

fn slug_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[^a-z0-9]+").expect("static regex"))
}

/// Turn a display name into an object id
pub fn slugify(name: &str) -> String {
    let lowered = name.to_lowercase();
    let slug = slug_pattern().replace_all(&lowered, "_");
    let slug = slug.trim_matches('_');
    if slug.is_empty() {
        "unnamed".to_string()
    } else {
        slug.to_string()
    }
}

/// All entities added by platforms, indexed by entity id and by
/// (config entry, platform)
#[derive(Default)]
pub struct Entities {
    by_id: DashMap<String, EntityHandle>,
    by_entry_platform: DashMap<(String, Platform), Vec<String>>,
}

impl Entities {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pick a free `{platform}.{object_id}`, suffixing `_2`, `_3`, ... on conflict
    pub fn generate_entity_id(&self, platform: Platform, name: &str) -> String {
        let preferred = format!("{}.{}", platform, slugify(name));
        if !self.by_id.contains_key(&preferred) {
            return preferred;
        }

        (2..)
            .map(|n| format!("{}_{}", preferred, n))
            .find(|candidate| !self.by_id.contains_key(candidate))
            .unwrap_or(preferred)
    }

    /// Add an entity and return its entity id
    pub fn add(&self, entry_id: &str, platform: Platform, entity: Box<dyn Entity>) -> String {
        let suggested = entity
            .name()
            .or(entity.unique_id())
            .unwrap_or("unnamed")
            .to_string();
        let entity_id = self.generate_entity_id(platform, &suggested);

        self.by_entry_platform
            .entry((entry_id.to_string(), platform))
            .or_default()
            .push(entity_id.clone());

        self.by_id.insert(
            entity_id.clone(),
            EntityHandle {
                entity_id: entity_id.clone(),
                entry_id: entry_id.to_string(),
                platform,
                entity: Arc::new(Mutex::new(entity)),
            },
        );

        debug!(entity_id = %entity_id, "Added entity");
        entity_id
    }

    pub fn get(&self, entity_id: &str) -> Option<EntityHandle> {
        self.by_id.get(entity_id).map(|r| r.value().clone())
    }

    /// Entity ids added for an entry on one platform
    pub fn entity_ids(&self, entry_id: &str, platform: Platform) -> Vec<String> {
        self.by_entry_platform
            .get(&(entry_id.to_string(), platform))
            .map(|ids| ids.clone())
            .unwrap_or_default()
    }

    /// Remove everything an entry added on one platform
    pub fn remove_platform(&self, entry_id: &str, platform: Platform) -> Vec<String> {
        let removed = self
            .by_entry_platform
            .remove(&(entry_id.to_string(), platform))
            .map(|(_, ids)| ids)
            .unwrap_or_default();

        for entity_id in &removed {
            self.by_id.remove(entity_id);
        }

        if !removed.is_empty() {
            debug!(entry_id, %platform, count = removed.len(), "Removed entities");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

/// Callback handed to platforms for adding entities for one config entry
#[derive(Clone)]
pub struct AddEntities {
    hass: Arc<HomeAssistant>,
    entry_id: String,
    platform: Platform,
}

impl AddEntities {
    pub fn new(hass: Arc<HomeAssistant>, entry_id: impl Into<String>, platform: Platform) -> Self {
        Self {
            hass,
            entry_id: entry_id.into(),
            platform,
        }
    }

    /// Add entities, optionally refreshing each one first
    ///
    /// A failed refresh is logged and the entity is added anyway; it stays
    /// unavailable until a later update succeeds. Device info is registered
    /// with the device registry. Returns the assigned entity ids in order.
    pub async fn add(&self, entities: Vec<Box<dyn Entity>>, update_before_add: bool) -> Vec<String> {
        let mut entity_ids = Vec::with_capacity(entities.len());

        for mut entity in entities {
            if update_before_add {
                if let Err(e) = entity.update().await {
                    warn!(
                        platform = %self.platform,
                        name = ?entity.name(),
                        error = %e,
                        "Entity update before add failed"
                    );
                }
            }

            if let Some(device_info) = entity.device_info() {
                self.hass.devices.get_or_create(&self.entry_id, &device_info);
            }

            entity_ids.push(self.hass.entities.add(&self.entry_id, self.platform, entity));
        }

        info!(
            entry_id = %self.entry_id,
            platform = %self.platform,
            count = entity_ids.len(),
            "Added entities"
        );
        entity_ids
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }
}

/// Per-integration implementation of one entity platform
#[async_trait]
pub trait EntityPlatform: Send + Sync {
    fn platform(&self) -> Platform;

    /// How often the hub polls this platform's entities; None disables polling
    fn scan_interval(&self) -> Option<Duration> {
        None
    }

    /// Create entities for a config entry
    async fn setup_entry(
        &self,
        hass: &Arc<HomeAssistant>,
        entry: &ConfigEntry,
        add_entities: AddEntities,
    ) -> IntegrationResult<()>;

    /// Tear down what `setup_entry` created
    async fn unload_entry(
        &self,
        hass: &Arc<HomeAssistant>,
        entry: &ConfigEntry,
    ) -> IntegrationResult<bool> {
        hass.entities.remove_platform(&entry.entry_id, self.platform());
        Ok(true)
    }
}

/// Registry of entity platforms keyed by (integration domain, platform)
#[derive(Default)]
pub struct EntityPlatforms {
    platforms: DashMap<(String, Platform), Arc<dyn EntityPlatform>>,
}

impl EntityPlatforms {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, domain: &str, platform: Arc<dyn EntityPlatform>) {
        debug!(domain, platform = %platform.platform(), "Registered entity platform");
        self.platforms
            .insert((domain.to_string(), platform.platform()), platform);
    }

    pub fn get(&self, domain: &str, platform: Platform) -> Option<Arc<dyn EntityPlatform>> {
        self.platforms
            .get(&(domain.to_string(), platform))
            .map(|r| r.value().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    #[async_trait]
    impl Entity for Named {
        fn name(&self) -> Option<&str> {
            Some(self.0)
        }

        async fn update(&mut self) -> Result<(), EntityError> {
            Ok(())
        }
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Living Room"), "living_room");
        assert_eq!(slugify("  Thermostat #1 (Upstairs) "), "thermostat_1_upstairs");
        assert_eq!(slugify("!!!"), "unnamed");
    }

    #[test]
    fn test_entity_ids_are_unique() {
        let entities = Entities::new();

        let first = entities.add("entry", Platform::Climate, Box::new(Named("Living Room")));
        let second = entities.add("entry", Platform::Climate, Box::new(Named("Living Room")));
        let sensor = entities.add("entry", Platform::Sensor, Box::new(Named("Living Room")));

        assert_eq!(first, "climate.living_room");
        assert_eq!(second, "climate.living_room_2");
        assert_eq!(sensor, "sensor.living_room");
    }

    #[test]
    fn test_remove_platform() {
        let entities = Entities::new();
        entities.add("entry-1", Platform::Climate, Box::new(Named("A")));
        entities.add("entry-1", Platform::Sensor, Box::new(Named("A")));
        entities.add("entry-2", Platform::Climate, Box::new(Named("B")));

        let removed = entities.remove_platform("entry-1", Platform::Climate);
        assert_eq!(removed, vec!["climate.a".to_string()]);
        assert!(entities.get("climate.a").is_none());
        assert!(entities.get("sensor.a").is_some());
        assert_eq!(entities.entity_ids("entry-2", Platform::Climate).len(), 1);
        assert_eq!(entities.len(), 2);
    }

    #[tokio::test]
    async fn test_handle_update() {
        let entities = Entities::new();
        let id = entities.add("entry", Platform::Sensor, Box::new(Named("Temp")));

        let handle = entities.get(&id).unwrap();
        handle.update().await.unwrap();
        assert!(handle.available().await);
        assert_eq!(handle.display_state().await, "unknown");
    }
}
