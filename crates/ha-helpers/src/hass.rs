//! The central hub object
//!
//! [`HomeAssistant`] owns every registry an integration touches and is
//! passed explicitly to every setup function.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::{DashMap, DashSet};
use futures::future::try_join_all;
use ha_config_entries::{ConfigEntries, ConfigEntriesError, ConfigEntry, ConfigEntryState, Storage};
use ha_core::Platform;
use ha_service_registry::{ServiceRegistry, SharedServiceRegistry};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

use crate::data::DomainData;
use crate::device_registry::DeviceRegistry;
use crate::entity_platform::{AddEntities, Entities, EntityPlatforms};
use crate::error::{IntegrationError, IntegrationResult};
use crate::integration::{ConfigType, Integration};
use crate::oauth2::OAuth2Implementations;

/// The central hub instance
pub struct HomeAssistant {
    config_dir: PathBuf,
    /// Root configuration
    config: ConfigType,
    /// Persisted config entries
    pub config_entries: ConfigEntries,
    /// Service registry for service calls
    pub services: SharedServiceRegistry,
    /// OAuth2 implementations per domain
    pub oauth2: OAuth2Implementations,
    /// Shared integration data
    pub data: DomainData,
    /// Entity platforms per domain
    pub platforms: EntityPlatforms,
    /// Entities added by platforms
    pub entities: Entities,
    /// Devices reported by entities
    pub devices: DeviceRegistry,
    integrations: DashMap<String, Arc<dyn Integration>>,
    components: DashSet<String>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    /// Completion flags of forwarded platform setups per (entry, platform)
    platform_setups: DashMap<(String, Platform), watch::Receiver<bool>>,
    /// Entity polling tasks per (entry, platform)
    pollers: DashMap<(String, Platform), JoinHandle<()>>,
}

impl HomeAssistant {
    /// Create a new instance rooted at `config_dir`
    pub fn new(config_dir: impl AsRef<Path>, config: ConfigType) -> Arc<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();
        let storage = Arc::new(Storage::new(&config_dir));

        Arc::new(Self {
            config_entries: ConfigEntries::new(storage),
            services: Arc::new(ServiceRegistry::new()),
            oauth2: OAuth2Implementations::new(),
            data: DomainData::new(),
            platforms: EntityPlatforms::new(),
            entities: Entities::new(),
            devices: DeviceRegistry::new(),
            integrations: DashMap::new(),
            components: DashSet::new(),
            tasks: Mutex::new(Vec::new()),
            platform_setups: DashMap::new(),
            pollers: DashMap::new(),
            config_dir,
            config,
        })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Path of a file inside the config directory
    pub fn config_path(&self, name: &str) -> PathBuf {
        self.config_dir.join(name)
    }

    pub fn config(&self) -> &ConfigType {
        &self.config
    }

    /// Spawn a background task tracked by [`block_till_done`](Self::block_till_done)
    pub fn create_task<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(future);
        self.tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(handle);
    }

    /// Wait until every tracked task, including ones spawned meanwhile, finished
    pub async fn block_till_done(&self) {
        loop {
            let pending: Vec<_> = {
                let mut tasks = self
                    .tasks
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                tasks.drain(..).collect()
            };

            if pending.is_empty() {
                break;
            }

            for handle in pending {
                if let Err(e) = handle.await {
                    warn!(error = %e, "Background task panicked");
                }
            }
        }
    }

    /// Make an integration available for setup
    pub fn register_integration(&self, integration: Arc<dyn Integration>) {
        debug!(domain = integration.domain(), "Registered integration");
        self.integrations
            .insert(integration.domain().to_string(), integration);
    }

    fn integration(&self, domain: &str) -> IntegrationResult<Arc<dyn Integration>> {
        self.integrations
            .get(domain)
            .map(|r| r.value().clone())
            .ok_or_else(|| IntegrationError::NotLoaded(domain.to_string()))
    }

    /// Whether an integration domain has been set up
    pub fn is_component_loaded(&self, domain: &str) -> bool {
        self.components.contains(domain)
    }

    /// Set up an integration domain with the given root configuration
    #[instrument(skip(self, config))]
    pub async fn setup_component(
        self: &Arc<Self>,
        domain: &str,
        config: &ConfigType,
    ) -> IntegrationResult<bool> {
        if self.is_component_loaded(domain) {
            return Ok(true);
        }

        let integration = self.integration(domain)?;
        let ok = integration.setup(self, config).await?;
        if ok {
            self.components.insert(domain.to_string());
            info!("Set up integration");
        } else {
            warn!("Integration setup returned false");
        }
        Ok(ok)
    }

    /// Set up a config entry, setting up its domain first when needed
    ///
    /// The entry ends up `Loaded` or `SetupError`; a setup error is also
    /// returned to the caller.
    #[instrument(skip(self))]
    pub async fn setup_config_entry(self: &Arc<Self>, entry_id: &str) -> IntegrationResult<bool> {
        let _guard = self.config_entries.lock(entry_id).await;

        let entry = self
            .config_entries
            .get(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;

        if !self.is_component_loaded(&entry.domain) {
            let config = self.config.clone();
            if !self.setup_component(&entry.domain, &config).await? {
                return Ok(false);
            }
        }

        let integration = self.integration(&entry.domain)?;
        self.config_entries
            .transition(entry_id, ConfigEntryState::SetupInProgress, None)?;

        match integration.setup_entry(self, &entry).await {
            Ok(true) => {
                self.config_entries
                    .transition(entry_id, ConfigEntryState::Loaded, None)?;
                info!(domain = %entry.domain, title = %entry.title, "Config entry loaded");
                Ok(true)
            }
            Ok(false) => {
                self.config_entries.transition(
                    entry_id,
                    ConfigEntryState::SetupError,
                    Some("setup returned false".to_string()),
                )?;
                warn!(domain = %entry.domain, "Config entry setup returned false");
                Ok(false)
            }
            Err(e) => {
                error!(domain = %entry.domain, error = %e, "Error setting up config entry");
                self.config_entries.transition(
                    entry_id,
                    ConfigEntryState::SetupError,
                    Some(e.to_string()),
                )?;
                Err(e)
            }
        }
    }

    /// Unload a config entry
    ///
    /// Entries that never loaded are unloaded without calling the
    /// integration. A failing unload leaves the entry `FailedUnload`.
    #[instrument(skip(self))]
    pub async fn unload_config_entry(self: &Arc<Self>, entry_id: &str) -> IntegrationResult<bool> {
        let _guard = self.config_entries.lock(entry_id).await;

        let entry = self
            .config_entries
            .get(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;

        match entry.state {
            ConfigEntryState::NotLoaded => return Ok(true),
            ConfigEntryState::SetupError => {
                self.config_entries
                    .transition(entry_id, ConfigEntryState::UnloadInProgress, None)?;
                self.config_entries
                    .transition(entry_id, ConfigEntryState::NotLoaded, None)?;
                return Ok(true);
            }
            _ => {}
        }

        let integration = self.integration(&entry.domain)?;
        self.config_entries
            .transition(entry_id, ConfigEntryState::UnloadInProgress, None)?;

        match integration.unload_entry(self, &entry).await {
            Ok(true) => {
                self.devices.clear_config_entry(entry_id);
                self.config_entries
                    .transition(entry_id, ConfigEntryState::NotLoaded, None)?;
                info!(domain = %entry.domain, title = %entry.title, "Config entry unloaded");
                Ok(true)
            }
            Ok(false) => {
                self.config_entries.transition(
                    entry_id,
                    ConfigEntryState::FailedUnload,
                    Some("unload returned false".to_string()),
                )?;
                Ok(false)
            }
            Err(e) => {
                error!(domain = %entry.domain, error = %e, "Error unloading config entry");
                self.config_entries.transition(
                    entry_id,
                    ConfigEntryState::FailedUnload,
                    Some(e.to_string()),
                )?;
                Err(e)
            }
        }
    }

    /// Start platform setups for an entry without waiting for them
    ///
    /// Each platform runs as its own task; failures are logged. Unloading
    /// the entry waits for these tasks before tearing platforms down.
    pub fn forward_entry_setups(self: &Arc<Self>, entry: &ConfigEntry, platforms: &[Platform]) {
        for &platform in platforms {
            let hass = Arc::clone(self);
            let entry = entry.clone();
            let (done_tx, done_rx) = watch::channel(false);
            self.platform_setups
                .insert((entry.entry_id.clone(), platform), done_rx);

            self.create_task(async move {
                hass.setup_platform(&entry, platform).await;
                let _ = done_tx.send(true);
            });
        }
    }

    async fn setup_platform(self: &Arc<Self>, entry: &ConfigEntry, platform: Platform) {
        let Some(handler) = self.platforms.get(&entry.domain, platform) else {
            error!(domain = %entry.domain, %platform, "Platform not registered");
            return;
        };

        let add_entities = AddEntities::new(self.clone(), &entry.entry_id, platform);
        match handler.setup_entry(self, entry, add_entities).await {
            Ok(()) => {
                debug!(domain = %entry.domain, %platform, "Platform set up");
                if let Some(period) = handler.scan_interval() {
                    self.start_polling(&entry.entry_id, platform, period);
                }
            }
            Err(e) => {
                error!(domain = %entry.domain, %platform, error = %e, "Platform setup failed")
            }
        }
    }

    /// Wait for a forwarded platform setup of an entry, if one is pending
    async fn wait_platform_setup(&self, entry_id: &str, platform: Platform) {
        let pending = self
            .platform_setups
            .remove(&(entry_id.to_string(), platform))
            .map(|(_, done)| done);

        if let Some(mut done) = pending {
            // A closed channel means the task ended without reporting
            let _ = done.wait_for(|finished| *finished).await;
        }
    }

    /// Poll the entities an entry added on one platform every `period`
    ///
    /// The poller holds only a weak reference to the hub and replaces any
    /// earlier poller for the same entry and platform.
    fn start_polling(self: &Arc<Self>, entry_id: &str, platform: Platform, period: Duration) {
        if period.is_zero() {
            warn!(entry_id, %platform, "Ignoring zero scan interval");
            return;
        }

        let hass = Arc::downgrade(self);
        let key = (entry_id.to_string(), platform);
        let entry_id = entry_id.to_string();

        let handle = tokio::spawn(async move {
            let mut ticks = interval(period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick fires immediately; entities were just added
            ticks.tick().await;

            loop {
                ticks.tick().await;
                let Some(hass) = hass.upgrade() else {
                    break;
                };
                hass.update_entities(&entry_id, platform).await;
            }
        });

        debug!(entry_id = %key.0, %platform, ?period, "Started entity polling");
        if let Some(previous) = self.pollers.insert(key, handle) {
            previous.abort();
        }
    }

    fn stop_polling(&self, entry_id: &str, platform: Platform) {
        if let Some((_, handle)) = self.pollers.remove(&(entry_id.to_string(), platform)) {
            handle.abort();
            debug!(entry_id, %platform, "Stopped entity polling");
        }
    }

    /// Run the update hook of every entity an entry added on one platform
    ///
    /// Failures are logged; the entity keeps its previous availability.
    pub async fn update_entities(&self, entry_id: &str, platform: Platform) {
        for entity_id in self.entities.entity_ids(entry_id, platform) {
            let Some(handle) = self.entities.get(&entity_id) else {
                continue;
            };
            if let Err(e) = handle.update().await {
                debug!(%entity_id, error = %e, "Entity update failed");
            }
        }
    }

    /// Unload platforms for an entry concurrently
    ///
    /// Each platform first waits for its pending setup and stops polling.
    /// Fails with the first platform error. Returns true only if every
    /// platform reported a successful unload.
    pub async fn forward_entry_unloads(
        self: &Arc<Self>,
        entry: &ConfigEntry,
        platforms: &[Platform],
    ) -> IntegrationResult<bool> {
        let unloads = platforms.iter().map(|&platform| async move {
            self.wait_platform_setup(&entry.entry_id, platform).await;
            self.stop_polling(&entry.entry_id, platform);

            let handler = self.platforms.get(&entry.domain, platform).ok_or_else(|| {
                IntegrationError::platform(platform, "platform not registered")
            })?;
            handler.unload_entry(self, entry).await
        });

        let results = try_join_all(unloads).await?;
        Ok(results.into_iter().all(|ok| ok))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Entity;
    use crate::entity_platform::EntityPlatform;
    use crate::error::EntityError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct Probe;

    #[async_trait]
    impl Entity for Probe {
        fn name(&self) -> Option<&str> {
            Some("Probe")
        }

        async fn update(&mut self) -> Result<(), EntityError> {
            Ok(())
        }
    }

    struct ProbePlatform;

    #[async_trait]
    impl EntityPlatform for ProbePlatform {
        fn platform(&self) -> Platform {
            Platform::Sensor
        }

        async fn setup_entry(
            &self,
            _hass: &Arc<HomeAssistant>,
            _entry: &ConfigEntry,
            add_entities: AddEntities,
        ) -> IntegrationResult<()> {
            add_entities.add(vec![Box::new(Probe)], true).await;
            Ok(())
        }
    }

    /// Adds its entity only after a delay
    struct SlowPlatform;

    #[async_trait]
    impl EntityPlatform for SlowPlatform {
        fn platform(&self) -> Platform {
            Platform::Sensor
        }

        async fn setup_entry(
            &self,
            _hass: &Arc<HomeAssistant>,
            _entry: &ConfigEntry,
            add_entities: AddEntities,
        ) -> IntegrationResult<()> {
            tokio::time::sleep(Duration::from_millis(50)).await;
            add_entities.add(vec![Box::new(Probe)], false).await;
            Ok(())
        }
    }

    /// Entity whose first update fails
    struct Flaky {
        polled: Arc<AtomicUsize>,
        available: bool,
    }

    #[async_trait]
    impl Entity for Flaky {
        fn name(&self) -> Option<&str> {
            Some("Flaky")
        }

        fn available(&self) -> bool {
            self.available
        }

        async fn update(&mut self) -> Result<(), EntityError> {
            if self.polled.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(EntityError::new("first update fails"));
            }
            self.available = true;
            Ok(())
        }
    }

    /// Polls its entities every 20ms
    #[derive(Default)]
    struct PolledPlatform {
        polled: Arc<AtomicUsize>,
        added: AtomicBool,
    }

    #[async_trait]
    impl EntityPlatform for PolledPlatform {
        fn platform(&self) -> Platform {
            Platform::Sensor
        }

        fn scan_interval(&self) -> Option<Duration> {
            Some(Duration::from_millis(20))
        }

        async fn setup_entry(
            &self,
            _hass: &Arc<HomeAssistant>,
            _entry: &ConfigEntry,
            add_entities: AddEntities,
        ) -> IntegrationResult<()> {
            self.added.store(true, Ordering::SeqCst);
            let flaky = Flaky {
                polled: self.polled.clone(),
                available: false,
            };
            add_entities.add(vec![Box::new(flaky)], true).await;
            Ok(())
        }
    }

    #[derive(Default)]
    struct Demo {
        setups: AtomicUsize,
        fail_setup: bool,
    }

    #[async_trait]
    impl Integration for Demo {
        fn domain(&self) -> &'static str {
            "demo"
        }

        async fn setup(&self, _hass: &Arc<HomeAssistant>, _config: &ConfigType) -> IntegrationResult<bool> {
            self.setups.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        }

        async fn setup_entry(
            &self,
            hass: &Arc<HomeAssistant>,
            entry: &ConfigEntry,
        ) -> IntegrationResult<bool> {
            if self.fail_setup {
                return Err(IntegrationError::Setup("cloud unreachable".to_string()));
            }
            hass.forward_entry_setups(entry, &[Platform::Sensor]);
            Ok(true)
        }

        async fn unload_entry(
            &self,
            hass: &Arc<HomeAssistant>,
            entry: &ConfigEntry,
        ) -> IntegrationResult<bool> {
            hass.forward_entry_unloads(entry, &[Platform::Sensor]).await
        }
    }

    async fn hass_with(demo: Arc<Demo>) -> (TempDir, Arc<HomeAssistant>, String) {
        let dir = TempDir::new().unwrap();
        let hass = HomeAssistant::new(dir.path(), ConfigType::Null);
        hass.register_integration(demo);
        hass.platforms.register("demo", Arc::new(ProbePlatform));
        let entry = hass
            .config_entries
            .add(ConfigEntry::new("demo", "Demo"))
            .await
            .unwrap();
        (dir, hass, entry.entry_id)
    }

    #[test]
    fn test_config_path() {
        let hass = HomeAssistant::new("/config", ConfigType::Null);
        assert_eq!(hass.config_path("lyric.conf"), PathBuf::from("/config/lyric.conf"));
    }

    #[tokio::test]
    async fn test_block_till_done_waits_for_nested_tasks() {
        let hass = HomeAssistant::new("/config", ConfigType::Null);
        let counter = Arc::new(AtomicUsize::new(0));

        let inner_hass = hass.clone();
        let inner_counter = counter.clone();
        hass.create_task(async move {
            let counter = inner_counter.clone();
            inner_hass.create_task(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            });
            inner_counter.fetch_add(1, Ordering::SeqCst);
        });

        hass.block_till_done().await;
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_setup_and_unload_entry() {
        let demo = Arc::new(Demo::default());
        let (_dir, hass, entry_id) = hass_with(demo.clone()).await;

        assert!(hass.setup_config_entry(&entry_id).await.unwrap());
        hass.block_till_done().await;

        assert!(hass.config_entries.get(&entry_id).unwrap().is_loaded());
        assert_eq!(demo.setups.load(Ordering::SeqCst), 1);
        assert!(hass.entities.get("sensor.probe").is_some());

        assert!(hass.unload_config_entry(&entry_id).await.unwrap());
        assert_eq!(
            hass.config_entries.get(&entry_id).unwrap().state,
            ConfigEntryState::NotLoaded
        );
        assert!(hass.entities.is_empty());
    }

    #[tokio::test]
    async fn test_setup_error_is_recorded() {
        let demo = Arc::new(Demo {
            fail_setup: true,
            ..Default::default()
        });
        let (_dir, hass, entry_id) = hass_with(demo).await;

        let result = hass.setup_config_entry(&entry_id).await;
        assert!(matches!(result, Err(IntegrationError::Setup(_))));

        let entry = hass.config_entries.get(&entry_id).unwrap();
        assert_eq!(entry.state, ConfigEntryState::SetupError);
        assert_eq!(entry.reason.as_deref(), Some("setup failed: cloud unreachable"));

        // An entry that never loaded unloads without touching the integration
        assert!(hass.unload_config_entry(&entry_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_integration() {
        let dir = TempDir::new().unwrap();
        let hass = HomeAssistant::new(dir.path(), ConfigType::Null);
        let entry = hass
            .config_entries
            .add(ConfigEntry::new("hue", "Hue"))
            .await
            .unwrap();

        let result = hass.setup_config_entry(&entry.entry_id).await;
        assert!(matches!(result, Err(IntegrationError::NotLoaded(_))));
    }

    #[tokio::test]
    async fn test_forward_unload_unknown_platform() {
        let demo = Arc::new(Demo::default());
        let (_dir, hass, entry_id) = hass_with(demo).await;
        let entry = hass.config_entries.get(&entry_id).unwrap();

        let result = hass
            .forward_entry_unloads(&entry, &[Platform::Sensor, Platform::Climate])
            .await;
        assert!(matches!(
            result,
            Err(IntegrationError::Platform {
                platform: Platform::Climate,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_unload_waits_for_pending_platform_setup() {
        let demo = Arc::new(Demo::default());
        let (_dir, hass, entry_id) = hass_with(demo).await;
        hass.platforms.register("demo", Arc::new(SlowPlatform));

        assert!(hass.setup_config_entry(&entry_id).await.unwrap());
        // Unload right away, while the platform is still setting up
        assert!(hass.unload_config_entry(&entry_id).await.unwrap());
        hass.block_till_done().await;

        assert_eq!(
            hass.config_entries.get(&entry_id).unwrap().state,
            ConfigEntryState::NotLoaded
        );
        assert!(hass.entities.is_empty());
        assert!(hass.platform_setups.is_empty());
    }

    #[tokio::test]
    async fn test_polling_updates_entities_until_unload() {
        let demo = Arc::new(Demo::default());
        let (_dir, hass, entry_id) = hass_with(demo).await;
        let platform = Arc::new(PolledPlatform::default());
        hass.platforms.register("demo", platform.clone());

        assert!(hass.setup_config_entry(&entry_id).await.unwrap());
        hass.block_till_done().await;
        assert!(platform.added.load(Ordering::SeqCst));

        let flaky = hass.entities.get("sensor.flaky").unwrap();
        assert!(!flaky.available().await);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(flaky.available().await);
        assert!(platform.polled.load(Ordering::SeqCst) >= 2);
        assert_eq!(hass.pollers.len(), 1);

        assert!(hass.unload_config_entry(&entry_id).await.unwrap());
        assert!(hass.pollers.is_empty());

        let polled = platform.polled.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(platform.polled.load(Ordering::SeqCst), polled);
    }

    #[tokio::test]
    async fn test_platforms_without_interval_are_not_polled() {
        let demo = Arc::new(Demo::default());
        let (_dir, hass, entry_id) = hass_with(demo).await;

        assert!(hass.setup_config_entry(&entry_id).await.unwrap());
        hass.block_till_done().await;
        assert!(hass.pollers.is_empty());
    }
}
