//! Device Registry
//!
//! Tracks devices reported by entities through their `device_info`, keyed
//! by device identifiers.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use ha_core::{DeviceIdentifier, DeviceInfo};
use serde::Serialize;
use tracing::{debug, info};

/// A registered device
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceEntry {
    pub id: String,
    pub identifiers: BTreeSet<DeviceIdentifier>,
    pub config_entries: BTreeSet<String>,
    pub name: Option<String>,
    pub model: Option<String>,
    pub manufacturer: Option<String>,
    pub sw_version: Option<String>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl DeviceEntry {
    fn from_info(info: &DeviceInfo, config_entry_id: &str) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().simple().to_string(),
            identifiers: info.identifiers.clone(),
            config_entries: BTreeSet::from([config_entry_id.to_string()]),
            name: info.name.clone(),
            model: info.model.clone(),
            manufacturer: info.manufacturer.clone(),
            sw_version: info.sw_version.clone(),
            created_at: now,
            modified_at: now,
        }
    }

    /// Merge newer device info into this entry, returning whether anything changed
    fn merge(&mut self, info: &DeviceInfo, config_entry_id: &str) -> bool {
        let before = self.clone();

        self.identifiers.extend(info.identifiers.iter().cloned());
        self.config_entries.insert(config_entry_id.to_string());
        if info.name.is_some() {
            self.name = info.name.clone();
        }
        if info.model.is_some() {
            self.model = info.model.clone();
        }
        if info.manufacturer.is_some() {
            self.manufacturer = info.manufacturer.clone();
        }
        if info.sw_version.is_some() {
            self.sw_version = info.sw_version.clone();
        }

        let changed = *self != before;
        if changed {
            self.modified_at = Utc::now();
        }
        changed
    }
}

/// Device Registry
#[derive(Default)]
pub struct DeviceRegistry {
    /// Primary index: device_id -> DeviceEntry
    by_id: DashMap<String, Arc<DeviceEntry>>,

    /// Index: identifier key -> device_id
    by_identifier: DashMap<String, String>,

    /// Index: config_entry_id -> set of device_ids
    by_config_entry_id: DashMap<String, HashSet<String>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn index_entry(&self, entry: Arc<DeviceEntry>) {
        for identifier in &entry.identifiers {
            self.by_identifier
                .insert(identifier.key(), entry.id.clone());
        }
        for config_entry_id in &entry.config_entries {
            self.by_config_entry_id
                .entry(config_entry_id.clone())
                .or_default()
                .insert(entry.id.clone());
        }
        self.by_id.insert(entry.id.clone(), entry);
    }

    fn unindex_entry(&self, entry: &DeviceEntry) {
        for identifier in &entry.identifiers {
            self.by_identifier.remove(&identifier.key());
        }
        for config_entry_id in &entry.config_entries {
            if let Some(mut ids) = self.by_config_entry_id.get_mut(config_entry_id) {
                ids.remove(&entry.id);
            }
        }
        self.by_id.remove(&entry.id);
    }

    pub fn get(&self, device_id: &str) -> Option<Arc<DeviceEntry>> {
        self.by_id.get(device_id).map(|r| r.value().clone())
    }

    pub fn get_by_identifier(&self, domain: &str, id: &str) -> Option<Arc<DeviceEntry>> {
        let key = DeviceIdentifier::new(domain, id).key();
        let device_id = self.by_identifier.get(&key)?.value().clone();
        self.get(&device_id)
    }

    pub fn get_by_config_entry_id(&self, config_entry_id: &str) -> Vec<Arc<DeviceEntry>> {
        self.by_config_entry_id
            .get(config_entry_id)
            .map(|ids| ids.iter().filter_map(|id| self.get(id)).collect())
            .unwrap_or_default()
    }

    /// Get or create the device described by `info`
    ///
    /// Any matching identifier selects the existing device, which is then
    /// updated with the new info.
    pub fn get_or_create(&self, config_entry_id: &str, info: &DeviceInfo) -> Arc<DeviceEntry> {
        let existing = info
            .identifiers
            .iter()
            .find_map(|identifier| self.get_by_identifier(identifier.domain(), identifier.id()));

        if let Some(existing) = existing {
            let mut updated = (*existing).clone();
            if !updated.merge(info, config_entry_id) {
                return existing;
            }
            debug!(device_id = %updated.id, "Updated device");
            self.unindex_entry(&existing);
            let updated = Arc::new(updated);
            self.index_entry(updated.clone());
            return updated;
        }

        let entry = Arc::new(DeviceEntry::from_info(info, config_entry_id));
        info!(
            device_id = %entry.id,
            name = ?entry.name,
            "Registered device"
        );
        self.index_entry(entry.clone());
        entry
    }

    /// Detach a config entry from its devices, removing orphaned ones
    pub fn clear_config_entry(&self, config_entry_id: &str) {
        let Some((_, device_ids)) = self.by_config_entry_id.remove(config_entry_id) else {
            return;
        };

        for device_id in device_ids {
            let Some(device) = self.get(&device_id) else {
                continue;
            };
            self.unindex_entry(&device);

            let mut updated = (*device).clone();
            updated.config_entries.remove(config_entry_id);
            if updated.config_entries.is_empty() {
                debug!(device_id = %device_id, "Removed device");
                continue;
            }
            updated.modified_at = Utc::now();
            self.index_entry(Arc::new(updated));
        }
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thermostat(mac: &str) -> DeviceInfo {
        DeviceInfo::new(DeviceIdentifier::new("lyric", mac))
            .with_name("Living Room")
            .with_manufacturer("Honeywell")
    }

    #[test]
    fn test_get_or_create_dedupes_by_identifier() {
        let registry = DeviceRegistry::new();

        let first = registry.get_or_create("entry-1", &thermostat("00D02D4A9B01"));
        let second = registry.get_or_create("entry-1", &thermostat("00D02D4A9B01"));

        assert_eq!(first.id, second.id);
        assert_eq!(registry.len(), 1);
        assert!(registry
            .get_by_identifier("lyric", "00D02D4A9B01")
            .is_some());
    }

    #[test]
    fn test_get_or_create_merges_info() {
        let registry = DeviceRegistry::new();
        registry.get_or_create("entry-1", &thermostat("mac"));

        let updated = registry.get_or_create(
            "entry-1",
            &DeviceInfo::new(DeviceIdentifier::new("lyric", "mac")).with_model("LCC-00D02D"),
        );

        assert_eq!(updated.name.as_deref(), Some("Living Room"));
        assert_eq!(updated.model.as_deref(), Some("LCC-00D02D"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_clear_config_entry() {
        let registry = DeviceRegistry::new();
        registry.get_or_create("entry-1", &thermostat("a"));
        let shared = registry.get_or_create("entry-1", &thermostat("b"));
        registry.get_or_create("entry-2", &thermostat("b"));

        registry.clear_config_entry("entry-1");

        assert!(registry.get_by_identifier("lyric", "a").is_none());
        let remaining = registry.get_by_identifier("lyric", "b").unwrap();
        assert_eq!(remaining.id, shared.id);
        assert_eq!(
            remaining.config_entries,
            BTreeSet::from(["entry-2".to_string()])
        );
        assert!(registry.get_by_config_entry_id("entry-1").is_empty());
        assert_eq!(registry.get_by_config_entry_id("entry-2").len(), 1);
    }
}
