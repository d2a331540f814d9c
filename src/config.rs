use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use crate::{Error, Result};

pub const DEFAULT_PORT: u16 = 12398;
pub const DEFAULT_MAX_CONCURRENT: usize = 3;
pub const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Root directory holding one sub-directory per task.
    pub history_dir: String,
    /// YAML file describing the image providers.
    pub providers_file: String,
    /// Number of page attempts allowed in flight per batch.
    pub max_concurrent: usize,
    pub provider_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            history_dir: "history".to_string(),
            providers_file: "image_providers.yaml".to_string(),
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            provider_timeout_secs: DEFAULT_PROVIDER_TIMEOUT_SECS,
        }
    }
}

impl AppConfig {
    pub fn pageforge_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".pageforge"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::pageforge_dir()?.join("pageforge.toml"))
    }

    pub fn history_root(&self) -> PathBuf {
        expand_tilde(&self.history_dir)
    }

    pub fn providers_path(&self) -> PathBuf {
        expand_tilde(&self.providers_file)
    }

    pub fn effective_max_concurrent(&self) -> usize {
        self.max_concurrent.max(1)
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs.max(1))
    }

    /// Load from the default location.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load from an explicit path; a missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "AppConfig::load");
        if !path.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(path)?)?;
        debug!(
            host = %config.host,
            port = config.port,
            history_dir = %config.history_dir,
            max_concurrent = config.max_concurrent,
            "Config loaded"
        );
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                debug!(dir = %parent.display(), "Creating config directory");
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        debug!(path = %path.display(), "Config saved");
        Ok(())
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
