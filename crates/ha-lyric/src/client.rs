//! Session wrapper handed from entry setup to the platforms

use std::iter::FusedIterator;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::trace;

use crate::api::{Location, Lyric, Thermostat};
use crate::error::LyricApiError;

/// Holds the Lyric API client for one config entry
pub struct LyricClient {
    lyric: Arc<Lyric>,
    location_names: Vec<String>,
    /// When locations were last fetched; also serializes refreshes
    last_refresh: Mutex<Instant>,
}

impl LyricClient {
    /// Wrap a client whose locations were just fetched
    pub fn new(lyric: Arc<Lyric>) -> Self {
        let location_names = lyric.locations().iter().map(|l| l.name.clone()).collect();
        Self {
            lyric,
            location_names,
            last_refresh: Mutex::new(Instant::now()),
        }
    }

    pub fn lyric(&self) -> &Arc<Lyric> {
        &self.lyric
    }

    /// Names of the locations known when the wrapper was created
    pub fn location_names(&self) -> &[String] {
        &self.location_names
    }

    /// Every `(location, thermostat)` pair the client currently knows about
    ///
    /// Each call starts over from the client's current data.
    pub fn devices(&self) -> Devices {
        Devices {
            locations: self.lyric.locations(),
            location: 0,
            device: 0,
        }
    }

    /// Find a thermostat by device id
    pub fn find_device(&self, device_id: &str) -> Option<(Location, Thermostat)> {
        self.devices().find(|(_, d)| d.device_id == device_id)
    }

    /// Ask the API client to re-fetch locations
    pub async fn refresh(&self) -> Result<(), LyricApiError> {
        let mut last_refresh = self.last_refresh.lock().await;
        self.lyric.update_locations().await?;
        *last_refresh = Instant::now();
        Ok(())
    }

    /// Re-fetch locations unless they were fetched within `max_age`
    ///
    /// Concurrent callers wait for one another, so a burst of entity
    /// updates results in a single fetch. Returns whether a fetch happened.
    pub async fn refresh_if_older_than(&self, max_age: Duration) -> Result<bool, LyricApiError> {
        let mut last_refresh = self.last_refresh.lock().await;
        if last_refresh.elapsed() < max_age {
            trace!("Reusing recently fetched locations");
            return Ok(false);
        }

        self.lyric.update_locations().await?;
        *last_refresh = Instant::now();
        Ok(true)
    }
}

/// Iterator returned by [`LyricClient::devices`]
pub struct Devices {
    locations: Arc<Vec<Location>>,
    location: usize,
    device: usize,
}

impl Iterator for Devices {
    type Item = (Location, Thermostat);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(location) = self.locations.get(self.location) {
            if let Some(device) = location.devices.get(self.device) {
                self.device += 1;
                return Some((location.clone(), device.clone()));
            }
            self.location += 1;
            self.device = 0;
        }
        None
    }
}

impl FusedIterator for Devices {}
