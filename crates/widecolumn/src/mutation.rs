//! Row mutations for `mutate_rows`

use bytes::Bytes;
use streamvault_core::Timestamp;

/// One change to a single row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Write a cell version (now if `timestamp` is `None`)
    SetCell {
        /// Column family
        family: String,
        /// Column qualifier
        column: String,
        /// Value bytes
        value: Bytes,
        /// Explicit version timestamp
        timestamp: Option<Timestamp>,
    },
    /// Delete versions of one column, optionally within `[start, end]`
    DeleteCells {
        /// Column family
        family: String,
        /// Column qualifier
        column: String,
        /// Inclusive range; `None` deletes every version
        range: Option<(Timestamp, Timestamp)>,
    },
    /// Delete every column of a family
    DeleteFamily {
        /// Column family
        family: String,
    },
    /// Delete the whole row
    DeleteRow,
}

impl Mutation {
    /// Shorthand for `SetCell` with the current time
    pub fn set(family: &str, column: &str, value: impl Into<Bytes>) -> Self {
        Mutation::SetCell {
            family: family.to_string(),
            column: column.to_string(),
            value: value.into(),
            timestamp: None,
        }
    }

    /// Family the mutation touches, if any
    pub fn family(&self) -> Option<&str> {
        match self {
            Mutation::SetCell { family, .. }
            | Mutation::DeleteCells { family, .. }
            | Mutation::DeleteFamily { family } => Some(family),
            Mutation::DeleteRow => None,
        }
    }
}

/// Every mutation for one row key, applied in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowMutation {
    /// Target row
    pub row_key: String,
    /// Changes in application order
    pub mutations: Vec<Mutation>,
}

impl RowMutation {
    /// Start an empty mutation list for `row_key`
    pub fn new(row_key: impl Into<String>) -> Self {
        Self {
            row_key: row_key.into(),
            mutations: Vec::new(),
        }
    }

    /// Append a `SetCell` at the current time
    pub fn set(mut self, family: &str, column: &str, value: impl Into<Bytes>) -> Self {
        self.mutations.push(Mutation::set(family, column, value));
        self
    }

    /// Append any mutation
    pub fn push(mut self, mutation: Mutation) -> Self {
        self.mutations.push(mutation);
        self
    }
}

/// Per-shard outcome of a failed batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardFailure {
    /// Shard index
    pub shard: usize,
    /// Row keys in the failed batch
    pub row_keys: Vec<String>,
    /// Rendered error
    pub error: String,
}

/// Result of `mutate_rows`
///
/// Shard batches succeed or fail independently; a failure in one shard never
/// rolls back another.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutateRowsReport {
    /// Rows applied successfully
    pub applied_rows: usize,
    /// Shard batches that were rejected
    pub failures: Vec<ShardFailure>,
}

impl MutateRowsReport {
    /// True if every shard batch was applied
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Row keys that were not applied
    pub fn failed_rows(&self) -> impl Iterator<Item = &str> {
        self.failures
            .iter()
            .flat_map(|f| f.row_keys.iter().map(String::as_str))
    }
}
