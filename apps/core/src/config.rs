//! Config module - Manages tbc-offers configuration (tbc-offers.toml).
//!
//! Configuration file contains:
//! - Data directory holding the file-backed storage areas
//! - Chunking and quota limits for the synchronized area
//! - Backoff settings for loaders waiting on a migration

use crate::storage::migration::RetryPolicy;
use crate::storage::partition::MAX_CHUNK_BYTES;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Storage limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Byte budget for one serialized chunk
    #[serde(default = "default_max_chunk_bytes")]
    pub max_chunk_bytes: usize,
    /// Per-item ceiling enforced by the synchronized area (key + value)
    #[serde(default = "default_sync_quota_bytes_per_item")]
    pub sync_quota_bytes_per_item: usize,
}

fn default_max_chunk_bytes() -> usize {
    MAX_CHUNK_BYTES
}

fn default_sync_quota_bytes_per_item() -> usize {
    8192
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            max_chunk_bytes: default_max_chunk_bytes(),
            sync_quota_bytes_per_item: default_sync_quota_bytes_per_item(),
        }
    }
}

/// Backoff used while another caller migrates a legacy record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    8
}

fn default_initial_delay_ms() -> u64 {
    50
}

fn default_max_delay_ms() -> u64 {
    1000
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl MigrationConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }
}

/// Main tbc-offers configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Config version (for future migrations)
    #[serde(default = "default_version")]
    pub version: u32,

    /// Directory holding sync.json and local.json
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub migration: MigrationConfig,
}

fn default_version() -> u32 {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            data_dir: default_data_dir(),
            storage: StorageConfig::default(),
            migration: MigrationConfig::default(),
        }
    }
}

/// Get default data directory.
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("tbc-offers"))
        .unwrap_or_else(|| PathBuf::from("./tbc-offers-data"))
}

/// Get default config directory (~/.config/tbc-offers/).
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("tbc-offers"))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Get default config file path.
pub fn default_config_path() -> PathBuf {
    default_config_dir().join("tbc-offers.toml")
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create config with a specific data directory.
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            ..Self::default()
        }
    }

    /// Load config from file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Cannot parse config file: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Load config from default path, falling back to defaults.
    pub fn load_default() -> Result<Self> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content =
            toml::to_string_pretty(self).with_context(|| "Cannot serialize config to TOML")?;

        std::fs::write(path, content)
            .with_context(|| format!("Cannot write config file: {}", path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }

    /// Save config to default path.
    pub fn save_default(&self) -> Result<PathBuf> {
        let path = default_config_path();
        self.save(&path)?;
        Ok(path)
    }

    /// Reject limits the storage layer cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.storage.max_chunk_bytes == 0 {
            anyhow::bail!("storage.max_chunk_bytes must be positive");
        }
        if self.storage.max_chunk_bytes >= self.storage.sync_quota_bytes_per_item {
            anyhow::bail!(
                "storage.max_chunk_bytes ({}) must stay below sync_quota_bytes_per_item ({})",
                self.storage.max_chunk_bytes,
                self.storage.sync_quota_bytes_per_item
            );
        }
        if self.migration.max_attempts == 0 {
            anyhow::bail!("migration.max_attempts must be at least 1");
        }
        Ok(())
    }

    /// Path of the synchronized area file.
    pub fn sync_area_path(&self) -> PathBuf {
        self.data_dir.join("sync.json")
    }

    /// Path of the device-local area file.
    pub fn local_area_path(&self) -> PathBuf {
        self.data_dir.join("local.json")
    }
}
