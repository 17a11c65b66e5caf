//! Deadlines for long-running fan-out
//!
//! Scans and replication fan-out check a `Deadline` between units of work
//! so no caller waits indefinitely on a slow shard or chunk holder.

use crate::error::{Error, Result};
use std::time::{Duration, Instant};

/// A point in time after which work should stop
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    /// Expire `timeout` from now
    pub fn after(timeout: Duration) -> Self {
        Self {
            at: Instant::now().checked_add(timeout),
        }
    }

    /// Never expires
    pub fn never() -> Self {
        Self { at: None }
    }

    /// True once the deadline has passed
    pub fn expired(&self) -> bool {
        self.at.is_some_and(|at| Instant::now() >= at)
    }

    /// Time left, `None` for an unbounded deadline
    pub fn remaining(&self) -> Option<Duration> {
        self.at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// Fail with [`Error::Timeout`] naming `operation` if expired
    pub fn check(&self, operation: &str) -> Result<()> {
        if self.expired() {
            Err(Error::Timeout(operation.to_string()))
        } else {
            Ok(())
        }
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Self::never()
    }
}
