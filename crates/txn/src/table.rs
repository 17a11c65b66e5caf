//! Multi-versioned tables
//!
//! Each row key owns a version chain, newest first. A version carries the
//! commit timestamp and either the full row image or a tombstone. A read at
//! timestamp T returns the newest version with `commit_ts <= T`; if that
//! version is a tombstone the row does not exist at T.

use crate::schema::{Row, RowKey, TableSchema};
use std::collections::{BTreeMap, VecDeque};
use streamvault_core::Timestamp;

/// One committed row image
#[derive(Debug, Clone)]
pub struct RowVersion {
    /// Commit timestamp of the writing transaction
    pub commit_ts: Timestamp,
    /// Row image; `None` is a tombstone
    pub data: Option<Row>,
}

/// Versions of one row key, newest first
#[derive(Debug, Clone, Default)]
pub struct RowVersions {
    versions: VecDeque<RowVersion>,
}

impl RowVersions {
    /// Add a version; commit timestamps only grow
    #[inline]
    pub fn push(&mut self, version: RowVersion) {
        debug_assert!(
            self.versions
                .front()
                .map_or(true, |v| v.commit_ts < version.commit_ts),
            "commit timestamps must increase per row"
        );
        self.versions.push_front(version);
    }

    /// Newest version visible at `ts`
    pub fn at(&self, ts: Timestamp) -> Option<&RowVersion> {
        self.versions.iter().find(|v| v.commit_ts <= ts)
    }

    /// Newest version
    pub fn latest(&self) -> Option<&RowVersion> {
        self.versions.front()
    }

    /// Drop versions no reader at or after `horizon` can observe
    ///
    /// Keeps every version newer than `horizon` plus the one visible at
    /// `horizon`. Returns how many were removed.
    pub fn gc(&mut self, horizon: Timestamp) -> usize {
        let Some(visible) = self.versions.iter().position(|v| v.commit_ts <= horizon) else {
            return 0;
        };
        let before = self.versions.len();
        self.versions.truncate(visible + 1);
        // a tombstone that nobody can see past is dead weight
        if self
            .versions
            .back()
            .is_some_and(|v| v.data.is_none() && v.commit_ts <= horizon)
        {
            self.versions.pop_back();
        }
        before - self.versions.len()
    }

    /// Number of versions stored
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    /// True if no versions remain
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}

/// A schema plus its multi-versioned rows
#[derive(Debug, Clone)]
pub struct VersionedTable {
    schema: TableSchema,
    rows: BTreeMap<RowKey, RowVersions>,
}

impl VersionedTable {
    /// Create an empty table
    pub fn new(schema: TableSchema) -> Self {
        Self {
            schema,
            rows: BTreeMap::new(),
        }
    }

    /// Table schema
    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// Row image visible at `ts`
    pub fn read_at(&self, key: &RowKey, ts: Timestamp) -> Option<&Row> {
        self.rows.get(key)?.at(ts)?.data.as_ref()
    }

    /// Newest committed row image
    pub fn read_latest(&self, key: &RowKey) -> Option<&Row> {
        self.rows.get(key)?.latest()?.data.as_ref()
    }

    /// Every row visible at `ts`, in key order
    pub fn scan_at(&self, ts: Timestamp) -> impl Iterator<Item = &Row> {
        self.rows
            .values()
            .filter_map(move |chain| chain.at(ts).and_then(|v| v.data.as_ref()))
    }

    /// Append a committed version (`None` deletes)
    pub fn apply(&mut self, key: RowKey, data: Option<Row>, commit_ts: Timestamp) {
        self.rows
            .entry(key)
            .or_default()
            .push(RowVersion { commit_ts, data });
    }

    /// Rows whose newest version is not a tombstone
    pub fn live_rows(&self) -> usize {
        self.rows
            .values()
            .filter(|c| c.latest().is_some_and(|v| v.data.is_some()))
            .count()
    }

    /// Versions across all rows
    pub fn version_count(&self) -> usize {
        self.rows.values().map(RowVersions::len).sum()
    }

    /// Garbage-collect versions older than `horizon`
    pub fn gc(&mut self, horizon: Timestamp) -> usize {
        let mut removed = 0;
        self.rows.retain(|_, chain| {
            removed += chain.gc(horizon);
            !chain.is_empty()
        });
        removed
    }
}
