//! Transactional store settings (`[transactional]` in `streamvault.toml`)

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Transactional store configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionalConfig {
    /// Longest a prepare waits for one row lock, in milliseconds
    pub lock_timeout_ms: u64,
    /// Half-width of the clock uncertainty window, in microseconds
    pub clock_uncertainty_us: u64,
    /// Wait out the clock uncertainty before a commit returns
    pub commit_wait: bool,
    /// How many finished transactions keep a queryable status
    pub finished_txn_retention: usize,
}

impl Default for TransactionalConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 50,
            clock_uncertainty_us: 1_000,
            commit_wait: false,
            finished_txn_retention: 1_024,
        }
    }
}

impl TransactionalConfig {
    /// Lock wait bound
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Clock uncertainty bound
    pub fn clock_uncertainty(&self) -> Duration {
        Duration::from_micros(self.clock_uncertainty_us)
    }

    /// Builder: set the lock wait bound
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Builder: enable or disable commit-wait
    pub fn with_commit_wait(mut self, enabled: bool) -> Self {
        self.commit_wait = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TransactionalConfig::default();
        assert_eq!(config.lock_timeout(), Duration::from_millis(50));
        assert_eq!(config.clock_uncertainty(), Duration::from_millis(1));
        assert!(!config.commit_wait);
    }

    #[test]
    fn test_partial_section() {
        let config: TransactionalConfig = toml::from_str("commit_wait = true").unwrap();
        assert!(config.commit_wait);
        assert_eq!(config.lock_timeout_ms, 50);
    }
}
