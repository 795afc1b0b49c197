use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{IoResultExt, Result};

/// current repository format version
pub const FORMAT_VERSION: u32 = 1;

/// repository configuration stored in config.toml
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// on-disk format version
    pub version: u32,
    /// request quota overrides for this repository
    #[serde(default, skip_serializing_if = "Limits::is_default")]
    pub limits: Limits,
}

impl Config {
    /// load config from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).with_path(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).with_path(path)?;
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: FORMAT_VERSION,
            limits: Limits::default(),
        }
    }
}

/// request body and object-count quotas, advertised and enforced
///
/// defaults are the protocol caps; a repository config may lower them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// git receive-pack body cap in bytes
    pub git_push_bytes: usize,
    /// git upload-pack negotiation body cap in bytes
    pub git_fetch_bytes: usize,
    /// native push body cap in bytes
    pub native_push_bytes: usize,
    /// per-object cap on the native push path in bytes
    pub native_object_bytes: usize,
    /// object-count cap on the native push path
    pub native_push_objects: usize,
    /// native batch request body cap in bytes
    pub native_batch_bytes: usize,
    /// default `max_objects` for a batch request
    pub native_batch_default: usize,
    /// upper bound on `max_objects` for a batch request
    pub native_batch_max: usize,
    /// native ref-update body cap in bytes
    pub native_ref_update_bytes: usize,
}

impl Limits {
    fn is_default(&self) -> bool {
        *self == Limits::default()
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            git_push_bytes: 256 * 1024 * 1024,
            git_fetch_bytes: 8 * 1024 * 1024,
            native_push_bytes: 64 * 1024 * 1024,
            native_object_bytes: 16 * 1024 * 1024,
            native_push_objects: 50_000,
            native_batch_bytes: 2 * 1024 * 1024,
            native_batch_default: 10_000,
            native_batch_max: 50_000,
            native_ref_update_bytes: 4 * 1024 * 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_toml_roundtrip() {
        let config = Config {
            version: FORMAT_VERSION,
            limits: Limits {
                native_push_objects: 100,
                ..Limits::default()
            },
        };

        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();

        assert_eq!(parsed.version, FORMAT_VERSION);
        assert_eq!(parsed.limits.native_push_objects, 100);
        assert_eq!(parsed.limits.git_push_bytes, 256 * 1024 * 1024);
    }

    #[test]
    fn test_config_minimal_toml() {
        let toml_str = "version = 1\n";
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.version, 1);
        assert_eq!(config.limits, Limits::default());
    }

    #[test]
    fn test_default_limits_omitted_from_toml() {
        let toml_str = toml::to_string_pretty(&Config::default()).unwrap();
        assert!(!toml_str.contains("limits"));
    }
}
