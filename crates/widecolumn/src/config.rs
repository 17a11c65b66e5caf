//! Wide-column store settings
//!
//! Loaded as the `[wide_column]` section of `streamvault.toml`. Every field
//! has a default so a partial section is valid.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Wide-column store configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WideColumnConfig {
    /// Number of shards each table is split across
    pub shard_count: usize,
    /// Versions retained per column; older ones are trimmed on write
    pub max_cell_versions: usize,
    /// Upper bound on a full scan, in milliseconds
    pub scan_timeout_ms: u64,
}

impl Default for WideColumnConfig {
    fn default() -> Self {
        Self {
            shard_count: 3,
            max_cell_versions: 64,
            scan_timeout_ms: 5_000,
        }
    }
}

impl WideColumnConfig {
    /// Scan timeout as a `Duration`
    pub fn scan_timeout(&self) -> Duration {
        Duration::from_millis(self.scan_timeout_ms)
    }

    /// Builder: set the shard count
    pub fn with_shard_count(mut self, shard_count: usize) -> Self {
        self.shard_count = shard_count;
        self
    }

    /// Builder: set the retained versions per column
    pub fn with_max_cell_versions(mut self, max: usize) -> Self {
        self.max_cell_versions = max;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WideColumnConfig::default();
        assert_eq!(config.shard_count, 3);
        assert_eq!(config.max_cell_versions, 64);
        assert_eq!(config.scan_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_partial_section_fills_defaults() {
        let config: WideColumnConfig = toml::from_str("shard_count = 8").unwrap();
        assert_eq!(config.shard_count, 8);
        assert_eq!(config.max_cell_versions, 64);
    }
}
