//! StreamVault configuration via `streamvault.toml`
//!
//! One file configures every store. Each section maps onto the owning
//! crate's config struct and every field has a default, so an empty file
//! (or a missing section) is valid.

use serde::{Deserialize, Serialize};
use std::path::Path;
use streamvault_core::{Error, Result};
use streamvault_objects::ObjectStoreConfig;
use streamvault_txn::TransactionalConfig;
use streamvault_widecolumn::WideColumnConfig;

/// Config file name looked up by deployments
pub const CONFIG_FILE_NAME: &str = "streamvault.toml";

/// Default transactional database id
pub const DEFAULT_DATABASE_ID: &str = "streamflix";

fn default_database_id() -> String {
    DEFAULT_DATABASE_ID.to_string()
}

/// Top-level configuration loaded from `streamvault.toml`
///
/// # Example
///
/// ```toml
/// database_id = "streamflix"
///
/// [wide_column]
/// shard_count = 3
///
/// [objects]
/// chunk_size = 67108864
/// placement = "zone-aware"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamVaultConfig {
    /// Transactional database holding platform metadata
    #[serde(default = "default_database_id")]
    pub database_id: String,
    /// `[wide_column]` section
    #[serde(default)]
    pub wide_column: WideColumnConfig,
    /// `[transactional]` section
    #[serde(default)]
    pub transactional: TransactionalConfig,
    /// `[objects]` section
    #[serde(default)]
    pub objects: ObjectStoreConfig,
}

impl Default for StreamVaultConfig {
    fn default() -> Self {
        Self {
            database_id: default_database_id(),
            wide_column: WideColumnConfig::default(),
            transactional: TransactionalConfig::default(),
            objects: ObjectStoreConfig::default(),
        }
    }
}

impl StreamVaultConfig {
    /// Reject values no store can run with
    pub fn validate(&self) -> Result<()> {
        if self.database_id.is_empty() {
            return Err(Error::Config("database_id must not be empty".into()));
        }
        if self.wide_column.shard_count == 0 {
            return Err(Error::Config("wide_column.shard_count must be positive".into()));
        }
        if self.wide_column.max_cell_versions == 0 {
            return Err(Error::Config(
                "wide_column.max_cell_versions must be positive".into(),
            ));
        }
        self.objects.validate()
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# StreamVault storage configuration
#
# Transactional database holding users, videos and watch history
database_id = "streamflix"

[wide_column]
# Shards each table is split across (hash routed)
shard_count = 3
# Versions kept per column; older ones are trimmed on write
max_cell_versions = 64
# Upper bound on a full-table scan
scan_timeout_ms = 5000

[transactional]
# Longest a commit waits for one row lock before aborting
lock_timeout_ms = 50
# Clock uncertainty window
clock_uncertainty_us = 1000
# Sleep out the uncertainty window before a commit returns
commit_wait = false

[objects]
# 64 MiB chunks
chunk_size = 67108864
replication_factor = 3
holder_count = 5
zone_count = 2
# "random" or "zone-aware"
placement = "random"
# Budget for writing one chunk's secondaries
replication_timeout_ms = 10000
"#
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config: StreamVaultConfig = toml::from_str(&content).map_err(|e| {
            Error::Config(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                Error::Config(format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            Error::Config(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use streamvault_objects::PlacementKind;
    use tempfile::TempDir;

    #[test]
    fn default_toml_matches_default() {
        let parsed: StreamVaultConfig = toml::from_str(StreamVaultConfig::default_toml()).unwrap();
        assert_eq!(parsed, StreamVaultConfig::default());
    }

    #[test]
    fn empty_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "").unwrap();
        let config = StreamVaultConfig::from_file(&path).unwrap();
        assert_eq!(config.database_id, "streamflix");
        assert_eq!(config.objects.replication_factor, 3);
    }

    #[test]
    fn write_default_does_not_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[wide_column]\nshard_count = 8\n").unwrap();

        StreamVaultConfig::write_default_if_missing(&path).unwrap();

        let config = StreamVaultConfig::from_file(&path).unwrap();
        assert_eq!(config.wide_column.shard_count, 8);
        assert_eq!(config.wide_column.max_cell_versions, 64);
    }

    #[test]
    fn round_trip_through_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        let mut config = StreamVaultConfig::default();
        config.objects.placement = PlacementKind::ZoneAware;
        config.transactional.commit_wait = true;
        config.write_to_file(&path).unwrap();

        let parsed = StreamVaultConfig::from_file(&path).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn invalid_values_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[objects]\nchunk_size = 0\n").unwrap();
        assert!(matches!(
            StreamVaultConfig::from_file(&path),
            Err(Error::Config(_))
        ));
        std::fs::write(&path, "database_id = 7").unwrap();
        assert!(StreamVaultConfig::from_file(&path).is_err());
    }
}
