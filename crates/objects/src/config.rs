//! Object store settings (`[objects]` in `streamvault.toml`)

use crate::placement::PlacementKind;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use streamvault_core::{Error, Result};

/// Object store configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectStoreConfig {
    /// Maximum chunk size in bytes
    pub chunk_size: usize,
    /// Replicas per chunk for files created without an explicit factor
    pub replication_factor: usize,
    /// In-memory chunk holders created by `ObjectStore::new`
    pub holder_count: usize,
    /// Zones the holders are spread across
    pub zone_count: usize,
    /// Placement policy
    pub placement: PlacementKind,
    /// Budget for writing one chunk's secondaries, in milliseconds
    pub replication_timeout_ms: u64,
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self {
            chunk_size: 64 * 1024 * 1024,
            replication_factor: 3,
            holder_count: 5,
            zone_count: 2,
            placement: PlacementKind::Random,
            replication_timeout_ms: 10_000,
        }
    }
}

impl ObjectStoreConfig {
    /// Replication budget
    pub fn replication_timeout(&self) -> Duration {
        Duration::from_millis(self.replication_timeout_ms)
    }

    /// Builder: set the chunk size
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Builder: set the default replication factor
    pub fn with_replication_factor(mut self, factor: usize) -> Self {
        self.replication_factor = factor;
        self
    }

    /// Builder: set the holder count
    pub fn with_holders(mut self, holder_count: usize, zone_count: usize) -> Self {
        self.holder_count = holder_count;
        self.zone_count = zone_count;
        self
    }

    /// Reject settings the store cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::Config("objects.chunk_size must be positive".into()));
        }
        if self.replication_factor == 0 {
            return Err(Error::Config(
                "objects.replication_factor must be at least 1".into(),
            ));
        }
        if self.holder_count == 0 || self.zone_count == 0 {
            return Err(Error::Config(
                "objects.holder_count and objects.zone_count must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = ObjectStoreConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.chunk_size, 67_108_864);
    }

    #[test]
    fn test_placement_parses_kebab_case() {
        let config: ObjectStoreConfig = toml::from_str("placement = \"zone-aware\"").unwrap();
        assert_eq!(config.placement, PlacementKind::ZoneAware);
        assert_eq!(config.replication_factor, 3);
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        assert!(ObjectStoreConfig::default()
            .with_chunk_size(0)
            .validate()
            .is_err());
    }
}
