// CLI configuration loaded from YAML

use crate::filter::{SortDirection, SortKey};
use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// How new task ids are generated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdScheme {
    #[default]
    Uuid,
    Sequential,
}

/// Settings for the command-line front end
///
/// Every key is optional in the file; missing keys take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the `.tasktable` store
    pub store_path: PathBuf,
    pub sort: SortKey,
    pub direction: SortDirection,
    /// Run the overdue pass before every command
    pub auto_overdue: bool,
    /// Seed the demonstration tasks into an empty store
    pub seed_samples: bool,
    pub id_scheme: IdScheme,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
            sort: SortKey::default(),
            direction: SortDirection::default(),
            auto_overdue: false,
            seed_samples: false,
            id_scheme: IdScheme::default(),
        }
    }
}

impl Config {
    /// Load from `path`, or from the default location when none is given
    ///
    /// An explicit path must exist; a missing default file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => match default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path),
                _ => {
                    debug!("No config file found, using defaults");
                    Ok(Self::default())
                }
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text =
            fs::read_to_string(path).with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = Self::from_yaml(&text).with_context(|| format!("Invalid config file {}", path.display()))?;
        debug!(path = ?path, "Loaded config");
        Ok(config)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text).context("Failed to parse YAML config")
    }
}

/// `<data dir>/tasktable`, or the current directory when the platform has no data dir
pub fn default_store_path() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("tasktable"))
        .unwrap_or_else(|| PathBuf::from("."))
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("tasktable").join("config.yml"))
}
