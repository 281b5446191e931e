//! Loading [`MapperOptions`] from YAML.
//!
//! Options usually live in a section of a bigger application config:
//!
//! ```yaml
//! app:
//!   fanout:
//!     worker_count: 8
//!     failure_policy: best_effort
//!     timeout_secs: 2.5
//! ```
//!
//! `MapperOptions::from_yaml_file("config.yml", "app.fanout")` picks that
//! mapping; missing keys fall back to defaults.
use crate::mapper::{MapperError, MapperOptions};
use std::{fs, path};

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parsing error: {0}")]
    YamlParse(#[from] serde_yaml::Error),
    #[error("Missing config section: {0}")]
    MissingSection(String),
}

/// Read a YAML document from disk.
pub fn load_config(
    config_file_path: impl AsRef<path::Path>,
) -> Result<serde_yaml::Value, ConfigError> {
    let content: String = fs::read_to_string(config_file_path)?;
    let config: serde_yaml::Value = serde_yaml::from_str(&content)?;
    Ok(config)
}

/// Extract a value using dot notation i.e. "app.fanout.worker_count".
pub fn get_config_value<'a>(
    config: &'a serde_yaml::Value,
    key: &str,
) -> Option<&'a serde_yaml::Value> {
    if key.is_empty() {
        return None;
    }
    key.split('.').try_fold(config, |value, key| match value {
        serde_yaml::Value::Mapping(map) => {
            map.get(serde_yaml::Value::String(key.to_string()))
        }
        _ => None,
    })
}

impl MapperOptions {
    /// Options from the mapping at `section` (dot path) of `config`; an
    /// empty `section` means the document root.
    pub fn from_yaml_value(
        config: &serde_yaml::Value,
        section: &str,
    ) -> Result<Self, MapperError> {
        let value = if section.is_empty() {
            config
        } else {
            get_config_value(config, section)
                .ok_or_else(|| ConfigError::MissingSection(section.to_string()))?
        };
        // An empty section (`fanout:` with nothing below) is all defaults.
        let options: MapperOptions = if value.is_null() {
            MapperOptions::default()
        } else {
            serde_yaml::from_value(value.clone()).map_err(ConfigError::from)?
        };
        options.validate()?;
        tracing::debug!(?options, section, "mapper options loaded");
        Ok(options)
    }

    pub fn from_yaml_str(content: &str, section: &str) -> Result<Self, MapperError> {
        let config: serde_yaml::Value =
            serde_yaml::from_str(content).map_err(ConfigError::from)?;
        Self::from_yaml_value(&config, section)
    }

    pub fn from_yaml_file(
        config_file_path: impl AsRef<path::Path>,
        section: &str,
    ) -> Result<Self, MapperError> {
        let config = load_config(config_file_path)?;
        Self::from_yaml_value(&config, section)
    }
}
