//! Constants for the Lyric integration

use std::time::Duration;

use ha_core::Platform;

pub const DOMAIN: &str = "lyric";

/// Key of the client wrapper in shared domain data
pub const DATA_LYRIC_CLIENT: &str = "lyric_client";

/// Token cache file inside the config directory
pub const CONF_LYRIC_CONFIG_FILE: &str = "lyric.conf";

pub const OAUTH2_AUTHORIZE: &str = "https://api.honeywell.com/oauth2/authorize";
pub const OAUTH2_TOKEN: &str = "https://api.honeywell.com/oauth2/token";

pub const API_BASE_URL: &str = "https://api.honeywell.com/v2";

/// Application name sent to the Lyric API
pub const APP_NAME: &str = "Home Assistant";

pub const MANUFACTURER: &str = "Honeywell";

pub const SERVICE_HOLD_TIME: &str = "set_hold_time";
pub const ATTR_TIME_PERIOD: &str = "time_period";
pub const DEFAULT_HOLD_TIME: &str = "01:00:00";

pub const PRESET_HOLD_UNTIL: &str = "HoldUntil";

/// How often thermostat entities are polled
pub const SCAN_INTERVAL: Duration = Duration::from_secs(10);

/// Entity updates within this window reuse the last fetched locations
pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(5);

/// Platforms set up for every config entry
pub const PLATFORMS: [Platform; 2] = [Platform::Climate, Platform::Sensor];
