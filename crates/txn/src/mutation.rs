//! Buffered row mutations

use crate::schema::{Row, RowKey};
use std::collections::BTreeMap;
use streamvault_core::Value;

/// Change to one column in an `Update`
#[derive(Debug, Clone, PartialEq)]
pub enum Assignment {
    /// Overwrite with a value
    Set(Value),
    /// Add to an INT64 column (NULL counts as zero)
    Increment(i64),
}

/// One row mutation
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// Insert a new row; fails if the key already exists
    Insert {
        /// Table name
        table: String,
        /// Column values; omitted columns take their defaults
        row: Row,
    },
    /// Change columns of an existing row; fails if the row is absent
    Update {
        /// Table name
        table: String,
        /// Primary key of the row
        key: RowKey,
        /// Column → assignment
        changes: BTreeMap<String, Assignment>,
    },
    /// Delete a row (absent rows are ignored)
    Delete {
        /// Table name
        table: String,
        /// Primary key of the row
        key: RowKey,
    },
}

impl Mutation {
    /// Build an `Insert` from column/value pairs
    pub fn insert<I, K, V>(table: &str, columns: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Mutation::Insert {
            table: table.to_string(),
            row: columns
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Build an `Update` with no assignments yet
    pub fn update(table: &str, key: impl Into<RowKey>) -> Self {
        Mutation::Update {
            table: table.to_string(),
            key: key.into(),
            changes: BTreeMap::new(),
        }
    }

    /// Build a `Delete`
    pub fn delete(table: &str, key: impl Into<RowKey>) -> Self {
        Mutation::Delete {
            table: table.to_string(),
            key: key.into(),
        }
    }

    /// Add `column = value` to an `Update` (no-op on other variants)
    pub fn set(mut self, column: &str, value: impl Into<Value>) -> Self {
        if let Mutation::Update { changes, .. } = &mut self {
            changes.insert(column.to_string(), Assignment::Set(value.into()));
        }
        self
    }

    /// Add `column = column + delta` to an `Update` (no-op on other variants)
    pub fn increment(mut self, column: &str, delta: i64) -> Self {
        if let Mutation::Update { changes, .. } = &mut self {
            changes.insert(column.to_string(), Assignment::Increment(delta));
        }
        self
    }

    /// Target table
    pub fn table(&self) -> &str {
        match self {
            Mutation::Insert { table, .. }
            | Mutation::Update { table, .. }
            | Mutation::Delete { table, .. } => table,
        }
    }
}
