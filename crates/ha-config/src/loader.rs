//! YAML loader resolving `!include`, `!secret` and `!env_var`

use crate::error::{ConfigError, ConfigResult};
use crate::secrets::Secrets;
use serde_yaml::value::TaggedValue;
use serde_yaml::{Mapping, Value};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace};

pub const CONFIGURATION_FILE: &str = "configuration.yaml";

/// Loads YAML files relative to a config directory
pub struct ConfigLoader {
    config_dir: PathBuf,
    secrets: Secrets,
    /// Files currently being loaded, for cycle detection
    include_stack: HashSet<PathBuf>,
}

impl ConfigLoader {
    pub fn new(config_dir: impl Into<PathBuf>) -> ConfigResult<Self> {
        let config_dir = config_dir.into();
        let secrets = Secrets::load(&config_dir)?;
        Ok(Self::with_secrets(config_dir, secrets))
    }

    pub fn with_secrets(config_dir: impl Into<PathBuf>, secrets: Secrets) -> Self {
        Self {
            config_dir: config_dir.into(),
            secrets,
            include_stack: HashSet::new(),
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Load a file, relative paths resolving against the config directory
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> ConfigResult<Value> {
        let path = self.config_dir.join(path.as_ref());
        debug!(?path, "Loading YAML file");

        if !self.include_stack.insert(path.clone()) {
            return Err(ConfigError::CircularInclude { path });
        }

        let result = fs::read_to_string(&path)
            .map_err(|source| ConfigError::ReadFile {
                path: path.clone(),
                source,
            })
            .and_then(|content| self.load_str(&content, &path));

        self.include_stack.remove(&path);
        result
    }

    /// Parse YAML text; `source` is used for errors and relative includes
    pub fn load_str(&mut self, content: &str, source: &Path) -> ConfigResult<Value> {
        let value = serde_yaml::from_str(content).map_err(|e| ConfigError::ParseYaml {
            path: source.to_path_buf(),
            source: e,
        })?;
        self.resolve(value, source)
    }

    fn resolve(&mut self, value: Value, source: &Path) -> ConfigResult<Value> {
        match value {
            Value::Tagged(tagged) => self.resolve_tag(*tagged, source),
            Value::Mapping(map) => {
                let mut resolved = Mapping::with_capacity(map.len());
                for (k, v) in map {
                    resolved.insert(self.resolve(k, source)?, self.resolve(v, source)?);
                }
                Ok(Value::Mapping(resolved))
            }
            Value::Sequence(seq) => seq
                .into_iter()
                .map(|v| self.resolve(v, source))
                .collect::<ConfigResult<Vec<_>>>()
                .map(Value::Sequence),
            other => Ok(other),
        }
    }

    fn resolve_tag(&mut self, tagged: TaggedValue, source: &Path) -> ConfigResult<Value> {
        let tag = tagged.tag.to_string();
        trace!(%tag, "Resolving tag");

        match tag.as_str() {
            "!include" => {
                let target = tag_string(&tag, tagged.value)?;
                let base = source.parent().unwrap_or(&self.config_dir).to_path_buf();
                self.load_file(base.join(target))
            }
            "!secret" => {
                let key = tag_string(&tag, tagged.value)?;
                Ok(Value::String(self.secrets.get(&key)?.to_string()))
            }
            "!env_var" => {
                let var = tag_string(&tag, tagged.value)?;
                std::env::var(&var)
                    .map(Value::String)
                    .map_err(|_| ConfigError::EnvVarNotFound { var })
            }
            _ => {
                let value = self.resolve(tagged.value, source)?;
                Ok(Value::Tagged(Box::new(TaggedValue {
                    tag: tagged.tag,
                    value,
                })))
            }
        }
    }
}

fn tag_string(tag: &str, value: Value) -> ConfigResult<String> {
    match value {
        Value::String(s) => Ok(s),
        other => Err(ConfigError::InvalidTagValue {
            tag: tag.to_string(),
            found: format!("{:?}", other),
        }),
    }
}

/// Load `<config_dir>/configuration.yaml`
///
/// A missing file is an empty configuration.
pub fn load_configuration(config_dir: impl Into<PathBuf>) -> ConfigResult<Value> {
    let mut loader = ConfigLoader::new(config_dir)?;
    if !loader.config_dir().join(CONFIGURATION_FILE).exists() {
        info!("No {} found, starting with empty configuration", CONFIGURATION_FILE);
        return Ok(Value::Null);
    }
    loader.load_file(CONFIGURATION_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, content: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_missing_configuration_is_empty() {
        let dir = TempDir::new().unwrap();
        assert_eq!(load_configuration(dir.path()).unwrap(), Value::Null);
    }

    #[test]
    fn test_secrets_resolved() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "secrets.yaml", "lyric_id: abc\nlyric_secret: def\n");
        write(
            dir.path(),
            CONFIGURATION_FILE,
            "lyric:\n  client_id: !secret lyric_id\n  client_secret: !secret lyric_secret\n",
        );

        let config = load_configuration(dir.path()).unwrap();
        assert_eq!(config["lyric"]["client_id"], Value::from("abc"));
        assert_eq!(config["lyric"]["client_secret"], Value::from("def"));
    }

    #[test]
    fn test_missing_secret_fails() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), CONFIGURATION_FILE, "lyric:\n  client_id: !secret nope\n");

        assert!(matches!(
            load_configuration(dir.path()),
            Err(ConfigError::SecretNotFound { .. })
        ));
    }

    #[test]
    fn test_include_relative_to_including_file() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "integrations/lyric.yaml", "client_id: abc\nclient_secret: def\n");
        write(dir.path(), CONFIGURATION_FILE, "lyric: !include integrations/lyric.yaml\n");

        let config = load_configuration(dir.path()).unwrap();
        assert_eq!(config["lyric"]["client_secret"], Value::from("def"));
    }

    #[test]
    fn test_circular_include() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.yaml", "b: !include b.yaml\n");
        write(dir.path(), "b.yaml", "a: !include a.yaml\n");

        let mut loader = ConfigLoader::new(dir.path()).unwrap();
        assert!(matches!(
            loader.load_file("a.yaml"),
            Err(ConfigError::CircularInclude { .. })
        ));
    }

    #[test]
    fn test_env_var() {
        let dir = TempDir::new().unwrap();
        std::env::set_var("HA_CONFIG_TEST_LYRIC_ID", "from-env");
        write(
            dir.path(),
            CONFIGURATION_FILE,
            "lyric:\n  client_id: !env_var HA_CONFIG_TEST_LYRIC_ID\n",
        );

        let config = load_configuration(dir.path()).unwrap();
        assert_eq!(config["lyric"]["client_id"], Value::from("from-env"));
        std::env::remove_var("HA_CONFIG_TEST_LYRIC_ID");
    }

    #[test]
    fn test_tag_requires_string() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), CONFIGURATION_FILE, "port: !secret [1, 2]\n");

        assert!(matches!(
            load_configuration(dir.path()),
            Err(ConfigError::InvalidTagValue { .. })
        ));
    }

    #[test]
    fn test_unknown_tags_kept() {
        let dir = TempDir::new().unwrap();
        let mut loader = ConfigLoader::with_secrets(dir.path(), Secrets::default());
        let value = loader
            .load_str("value: !custom thing\n", Path::new("inline.yaml"))
            .unwrap();
        assert!(matches!(value["value"], Value::Tagged(_)));
    }
}
