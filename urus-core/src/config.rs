//! Global urus configuration.

use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::{UrusError, UrusResult};

static DEFAULT_DATA_DIR: &str = "~/.local/share/urus";

fn default_data_dir() -> PathBuf {
    PathBuf::from(DEFAULT_DATA_DIR)
}

/// Configuration at ~/.config/urus/config.toml
///
/// Every key can be overridden from the environment with the `URUS_` prefix,
/// using `__` as the section separator (e.g. `URUS_CLOUD__API_URL`).
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UrusConfig {
    /// Where the local store keeps its files.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default)]
    pub cloud: CloudConfig,

    #[serde(default)]
    pub calendar: CalendarSettings,
}

/// Cloud account backend. Cloud mode is unavailable when `api_url` is unset.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct CloudConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct CalendarSettings {
    /// Name of the calendar provider binary (`urus-calendar-<provider>`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

impl Default for UrusConfig {
    fn default() -> Self {
        UrusConfig {
            data_dir: default_data_dir(),
            cloud: CloudConfig::default(),
            calendar: CalendarSettings::default(),
        }
    }
}

impl UrusConfig {
    pub fn config_path() -> UrusResult<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| UrusError::Config("Could not determine config directory".into()))?
            .join("urus");

        Ok(config_dir.join("config.toml"))
    }

    /// Load the global config, writing a commented default file first if none exists.
    pub fn load() -> UrusResult<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            Self::create_default_config(&config_path)?;
        }

        Self::load_from(&config_path)
    }

    pub fn load_from(path: &Path) -> UrusResult<Self> {
        Config::builder()
            .add_source(File::from(path.to_path_buf()).required(false))
            .add_source(Environment::with_prefix("URUS").separator("__"))
            .build()
            .map_err(|e| UrusError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| UrusError::Config(e.to_string()))
    }

    /// The data directory with `~` expanded.
    pub fn data_path(&self) -> PathBuf {
        let full_path_str = shellexpand::tilde(&self.data_dir.to_string_lossy()).into_owned();
        PathBuf::from(full_path_str)
    }

    /// The cloud backend URL, if one is set.
    pub fn api_url(&self) -> Option<&str> {
        self.cloud.api_url.as_deref().filter(|url| !url.is_empty())
    }

    /// Write the config to `path`, replacing the file.
    pub fn save(&self, path: &Path) -> UrusResult<()> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| UrusError::Config(e.to_string()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                UrusError::Config(format!("Could not create config directory: {e}"))
            })?;
        }

        std::fs::write(path, contents)
            .map_err(|e| UrusError::Config(format!("Could not write config file: {e}")))
    }

    /// Create a default config file with all options commented out.
    pub fn create_default_config(path: &Path) -> UrusResult<()> {
        let contents = format!(
            "\
# urus configuration

# Where local data lives:
# data_dir = \"{}\"

# Cloud account backend (enables login and cloud sync):
# [cloud]
# api_url = \"https://api.example.com\"

# Native calendar provider (binary named urus-calendar-<provider>):
# [calendar]
# provider = \"eds\"
",
            DEFAULT_DATA_DIR
        );

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                UrusError::Config(format!("Could not create config directory: {e}"))
            })?;
        }

        std::fs::write(path, contents)
            .map_err(|e| UrusError::Config(format!("Could not write config file: {e}")))?;

        Ok(())
    }
}
