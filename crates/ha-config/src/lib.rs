//! Root configuration loading
//!
//! Reads `configuration.yaml` from the config directory and resolves the
//! custom tags integrations rely on to keep credentials out of the main
//! file:
//!
//! - `!include path` - Include another YAML file
//! - `!secret key` - Substitute from secrets.yaml
//! - `!env_var VAR` - Environment variable substitution
//!
//! ```ignore
//! let config = ha_config::load_configuration("/config")?;
//! let lyric = config.get("lyric");
//! ```

mod error;
mod loader;
mod secrets;

pub use error::{ConfigError, ConfigResult};
pub use loader::{load_configuration, ConfigLoader, CONFIGURATION_FILE};
pub use secrets::Secrets;

pub use serde_yaml::Value;
