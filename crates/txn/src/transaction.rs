//! Transaction state
//!
//! ```text
//! Active ──prepare──▶ Prepared ──commit──▶ Committed
//!   │                    │
//!   └──────abort─────────┴──────────────▶ Aborted
//! ```
//!
//! Committed and Aborted are terminal. Only an Active transaction accepts
//! new mutations.

use crate::locks::LockKey;
use crate::mutation::Mutation;
use std::fmt;
use std::time::{Duration, Instant};
use streamvault_core::{Error, Result, Timestamp};

/// Transaction identifier, unique per store
pub type TxnId = u64;

/// Lifecycle state of a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Accepting reads and buffered mutations
    Active,
    /// Locks held and mutations validated; waiting for commit
    Prepared,
    /// Mutations visible at `commit_ts`
    Committed {
        /// Commit timestamp
        commit_ts: Timestamp,
    },
    /// Discarded
    Aborted {
        /// Human-readable reason for abort
        reason: String,
    },
}

impl TransactionStatus {
    /// True for Committed and Aborted
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Committed { .. } | TransactionStatus::Aborted { .. }
        )
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionStatus::Active => write!(f, "ACTIVE"),
            TransactionStatus::Prepared => write!(f, "PREPARED"),
            TransactionStatus::Committed { commit_ts } => write!(f, "COMMITTED@{}", commit_ts),
            TransactionStatus::Aborted { reason } => write!(f, "ABORTED ({})", reason),
        }
    }
}

/// A transaction bound to one database and one read timestamp
#[derive(Debug)]
pub struct Transaction {
    /// Identifier
    pub id: TxnId,
    /// Database the transaction runs against
    pub db_id: String,
    /// Snapshot timestamp for reads
    pub read_ts: Timestamp,
    /// Read-only transactions reject mutations
    pub read_only: bool,
    status: TransactionStatus,
    mutations: Vec<(LockKey, Mutation)>,
    locked: Vec<LockKey>,
    started: Instant,
}

impl Transaction {
    /// Create an Active transaction
    pub fn new(id: TxnId, db_id: &str, read_ts: Timestamp, read_only: bool) -> Self {
        Self {
            id,
            db_id: db_id.to_string(),
            read_ts,
            read_only,
            status: TransactionStatus::Active,
            mutations: Vec::new(),
            locked: Vec::new(),
            started: Instant::now(),
        }
    }

    /// Current state
    pub fn status(&self) -> &TransactionStatus {
        &self.status
    }

    /// Check if transaction is active
    pub fn is_active(&self) -> bool {
        matches!(self.status, TransactionStatus::Active)
    }

    /// Check if transaction is prepared
    pub fn is_prepared(&self) -> bool {
        matches!(self.status, TransactionStatus::Prepared)
    }

    /// Time since the transaction began
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Buffered mutations with their row addresses, in order
    pub fn mutations(&self) -> &[(LockKey, Mutation)] {
        &self.mutations
    }

    /// Locks held by this transaction
    pub fn locked(&self) -> &[LockKey] {
        &self.locked
    }

    /// Fail unless the transaction is Active
    pub fn ensure_active(&self) -> Result<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(self.not_active())
        }
    }

    fn not_active(&self) -> Error {
        match &self.status {
            TransactionStatus::Aborted { reason } => Error::TransactionAborted {
                txn_id: self.id,
                reason: reason.clone(),
            },
            other => Error::TransactionNotActive {
                txn_id: self.id,
                state: other.to_string(),
            },
        }
    }

    /// Buffer mutations already resolved to their row addresses
    pub fn buffer(&mut self, mutations: Vec<(LockKey, Mutation)>) -> Result<()> {
        self.ensure_active()?;
        if self.read_only && !mutations.is_empty() {
            return Err(Error::invalid_input(format!(
                "transaction {} is read-only",
                self.id
            )));
        }
        self.mutations.extend(mutations);
        Ok(())
    }

    /// Lock addresses of every buffered mutation
    pub fn lock_keys(&self) -> Vec<LockKey> {
        let mut keys: Vec<LockKey> = self.mutations.iter().map(|(k, _)| k.clone()).collect();
        keys.sort();
        keys.dedup();
        keys
    }

    /// Active → Prepared, remembering the locks taken
    pub fn mark_prepared(&mut self, locked: Vec<LockKey>) -> Result<()> {
        self.ensure_active()?;
        self.locked = locked;
        self.status = TransactionStatus::Prepared;
        Ok(())
    }

    /// Prepared → Committed; returns the locks to release
    pub fn mark_committed(&mut self, commit_ts: Timestamp) -> Result<Vec<LockKey>> {
        if !self.is_prepared() && !self.is_active() {
            return Err(self.not_active());
        }
        self.status = TransactionStatus::Committed { commit_ts };
        self.mutations.clear();
        Ok(std::mem::take(&mut self.locked))
    }

    /// Any non-terminal state → Aborted; returns the locks to release
    pub fn mark_aborted(&mut self, reason: impl Into<String>) -> Result<Vec<LockKey>> {
        if self.status.is_terminal() {
            return Err(self.not_active());
        }
        self.status = TransactionStatus::Aborted {
            reason: reason.into(),
        };
        self.mutations.clear();
        Ok(std::mem::take(&mut self.locked))
    }
}
