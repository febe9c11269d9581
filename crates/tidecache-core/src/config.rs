//! Cache and sync configuration.
//!
//! Configuration is stored at `~/.config/tidecache/config.json`. Missing
//! files and missing fields fall back to defaults.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Application name used for config/cache directory paths
pub const APP_NAME: &str = "tidecache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Separates the cache of one account/profile from another
    pub profile: Option<String>,
    pub cache: CacheConfig,
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    pub max_memory_entries: usize,
    pub max_persistent_bytes: usize,
    /// Payloads at or above this serialized size stay memory-only
    pub small_payload_threshold: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_memory_entries: 100,
            max_persistent_bytes: 5 * 1024 * 1024,
            small_payload_threshold: 100 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SyncConfig {
    /// Periodic ticks are skipped when the credential expires within this window
    pub expiry_lead_secs: u64,
    /// A tick is skipped if the category synced less than this fraction of an interval ago
    pub tick_guard_ratio: f64,
    pub backoff_base_minutes: i64,
    pub backoff_step_minutes: i64,
    pub backoff_max_minutes: i64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            expiry_lead_secs: 5 * 60,
            tick_guard_ratio: 0.8,
            backoff_base_minutes: 30,
            backoff_step_minutes: 15,
            backoff_max_minutes: 120,
        }
    }
}

impl SyncConfig {
    pub fn expiry_lead(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.expiry_lead_secs as i64)
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;

        let mut path = cache_dir.join(APP_NAME);
        if let Some(ref profile) = self.profile {
            path = path.join(profile);
        }
        Ok(path)
    }
}
