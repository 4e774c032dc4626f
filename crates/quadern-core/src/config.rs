//! Configuration for quadern-core
//!
//! Storage keys, id generation and display limits. Every section has
//! defaults, so a config file only needs the values it changes.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::id::IdStrategy;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuadernConfig {
    /// Where the notebook lives
    pub storage: StorageConfig,
    /// Note creation settings
    pub notes: NotesConfig,
    /// Dashboard and search display limits
    pub display: DisplayConfig,
}

/// Storage configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Key holding the current notebook
    pub key: String,
    /// Key of the older notes-only payload, read by `load_legacy`
    pub legacy_key: String,
    /// Directory for the file backend. `None` uses the platform data dir.
    pub data_dir: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            key: "quadern-v1".to_string(),
            legacy_key: "notes-v1".to_string(),
            data_dir: None,
        }
    }
}

/// Note creation configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotesConfig {
    pub id_prefix: String,
    pub id_strategy: IdStrategy,
    /// Recorded in `meta.appVersion` of new notebooks
    pub app_version: String,
    /// Appended to the title of duplicated notes
    pub copy_suffix: String,
}

impl Default for NotesConfig {
    fn default() -> Self {
        Self {
            id_prefix: "n".to_string(),
            id_strategy: IdStrategy::Timestamp,
            app_version: crate::state::APP_VERSION.to_string(),
            copy_suffix: " (còpia)".to_string(),
        }
    }
}

/// Display configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Notes listed under "recent" on the dashboard
    pub max_recent_notes: usize,
    /// Characters of content shown in note lists
    pub preview_length: usize,
    /// Characters of content shown in search results
    pub search_preview_length: usize,
    /// Entries in the dashboard tag cloud
    pub popular_tags: usize,
    /// Days covered by the activity chart
    pub activity_days: usize,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            max_recent_notes: 5,
            preview_length: 80,
            search_preview_length: 200,
            popular_tags: 8,
            activity_days: 7,
        }
    }
}

impl QuadernConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize configuration to TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Load configuration from a JSON string
    pub fn from_json(json_str: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json_str).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Serialize configuration to JSON
    pub fn to_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))
    }

    /// Read a config file. `.json` files are parsed as JSON, anything else as TOML.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        let config = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&text)?,
            _ => Self::from_toml(&text)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.key.trim().is_empty() {
            return Err(ConfigError::Invalid("storage.key must not be empty".to_string()));
        }
        if self.storage.key == self.storage.legacy_key {
            return Err(ConfigError::Invalid(
                "storage.legacy_key must differ from storage.key".to_string(),
            ));
        }
        if self.notes.id_prefix.is_empty()
            || !self
                .notes
                .id_prefix
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            return Err(ConfigError::Invalid(
                "notes.id_prefix must be non-empty ASCII letters, digits or '-'".to_string(),
            ));
        }
        if self.display.preview_length == 0 || self.display.search_preview_length == 0 {
            return Err(ConfigError::Invalid("preview lengths must be positive".to_string()));
        }
        Ok(())
    }

    /// Data directory for the file backend: the configured one, else
    /// `<platform data dir>/quadern`.
    pub fn resolve_data_dir(&self) -> Option<PathBuf> {
        self.storage
            .data_dir
            .clone()
            .or_else(|| dirs::data_dir().map(|d| d.join("quadern")))
    }

    /// Default location of the config file: `<platform config dir>/quadern/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("quadern").join("config.toml"))
    }
}

/// Configuration error
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Failed to serialize config: {0}")]
    Serialize(String),

    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e.to_string())
    }
}

impl From<toml::ser::Error> for ConfigError {
    fn from(e: toml::ser::Error) -> Self {
        ConfigError::Serialize(e.to_string())
    }
}
