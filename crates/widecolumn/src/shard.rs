//! Shards and the data each one owns
//!
//! A shard holds, for every table, the rows whose keys route to it. All
//! access to a shard's rows goes through its single `Mutex`, so operations
//! on one shard apply in arrival order. Different shards never contend.

use crate::cell::{Cell, CellChain, Row, StoredRow};
use crate::filter::{project, RowFilter};
use crate::mutation::{Mutation, RowMutation};
use bytes::Bytes;
use parking_lot::{Mutex, MutexGuard, RwLock};
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering};
use streamvault_core::{Error, Result, Timestamp};

/// Rows of one table that live on one shard, ordered by key
#[derive(Debug, Default)]
pub(crate) struct TableShard {
    rows: BTreeMap<String, StoredRow>,
}

impl TableShard {
    fn chain_mut(&mut self, row_key: &str, family: &str, column: &str) -> &mut CellChain {
        self.rows
            .entry(row_key.to_string())
            .or_default()
            .entry(family.to_string())
            .or_default()
            .entry(column.to_string())
            .or_default()
    }

    fn cell_count(&self) -> usize {
        self.rows
            .values()
            .flat_map(|fams| fams.values())
            .flat_map(|cols| cols.values())
            .map(CellChain::len)
            .sum()
    }
}

/// Data guarded by a shard's lock: table name → rows
#[derive(Debug, Default)]
pub(crate) struct ShardData {
    tables: FxHashMap<String, TableShard>,
}

/// Version timestamp for a write without an explicit one
///
/// Strictly after the newest stored version so back-to-back writes inside
/// one microsecond keep distinct versions.
fn implicit_timestamp(chain: &CellChain) -> Timestamp {
    let now = Timestamp::now();
    match chain.latest() {
        Some(latest) if latest.timestamp >= now => latest.timestamp.next(),
        _ => now,
    }
}

impl ShardData {
    pub(crate) fn ensure_table(&mut self, table: &str) {
        self.tables.entry(table.to_string()).or_default();
    }

    fn table_mut(&mut self, table: &str) -> &mut TableShard {
        self.tables.entry(table.to_string()).or_default()
    }

    /// Append a version; returns the timestamp actually written
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn put_cell(
        &mut self,
        table: &str,
        row_key: &str,
        family: &str,
        column: &str,
        value: Bytes,
        timestamp: Option<Timestamp>,
        max_versions: usize,
    ) -> Timestamp {
        let chain = self.table_mut(table).chain_mut(row_key, family, column);
        let ts = timestamp.unwrap_or_else(|| implicit_timestamp(chain));
        chain.insert(Cell::new(value, ts));
        chain.trim(max_versions);
        ts
    }

    pub(crate) fn get(
        &self,
        table: &str,
        row_key: &str,
        filter: Option<&RowFilter>,
    ) -> Option<Row> {
        let stored = self.tables.get(table)?.rows.get(row_key)?;
        project(row_key, stored, filter)
    }

    /// Rows with `start <= key < end`, filtered, at most `limit`
    pub(crate) fn scan(
        &self,
        table: &str,
        start: &str,
        end: Option<&str>,
        filter: Option<&RowFilter>,
        limit: Option<usize>,
    ) -> Vec<Row> {
        let Some(shard) = self.tables.get(table) else {
            return Vec::new();
        };
        if end.is_some_and(|e| e <= start) {
            return Vec::new();
        }
        let upper = match end {
            Some(e) => Bound::Excluded(e),
            None => Bound::Unbounded,
        };
        shard
            .rows
            .range::<str, _>((Bound::Included(start), upper))
            .filter_map(|(key, stored)| project(key, stored, filter))
            .take(limit.unwrap_or(usize::MAX))
            .collect()
    }

    /// Apply one row's mutations in order
    pub(crate) fn apply_row(&mut self, table: &str, row: &RowMutation, max_versions: usize) {
        for mutation in &row.mutations {
            match mutation {
                Mutation::SetCell {
                    family,
                    column,
                    value,
                    timestamp,
                } => {
                    self.put_cell(
                        table,
                        &row.row_key,
                        family,
                        column,
                        value.clone(),
                        *timestamp,
                        max_versions,
                    );
                }
                Mutation::DeleteCells {
                    family,
                    column,
                    range,
                } => {
                    let shard = self.table_mut(table);
                    if let Some(fams) = shard.rows.get_mut(&row.row_key) {
                        if let Some(cols) = fams.get_mut(family) {
                            match range {
                                Some((start, end)) => {
                                    if let Some(chain) = cols.get_mut(column) {
                                        chain.remove_range(*start, *end);
                                        if chain.is_empty() {
                                            cols.remove(column);
                                        }
                                    }
                                }
                                None => {
                                    cols.remove(column);
                                }
                            }
                            if cols.is_empty() {
                                fams.remove(family);
                            }
                        }
                        if fams.is_empty() {
                            shard.rows.remove(&row.row_key);
                        }
                    }
                }
                Mutation::DeleteFamily { family } => {
                    let shard = self.table_mut(table);
                    if let Some(fams) = shard.rows.get_mut(&row.row_key) {
                        fams.remove(family);
                        if fams.is_empty() {
                            shard.rows.remove(&row.row_key);
                        }
                    }
                }
                Mutation::DeleteRow => {
                    self.delete_row(table, &row.row_key);
                }
            }
        }
    }

    /// Remove a row; returns whether it existed
    pub(crate) fn delete_row(&mut self, table: &str, row_key: &str) -> bool {
        self.tables
            .get_mut(table)
            .is_some_and(|t| t.rows.remove(row_key).is_some())
    }

    /// Read-modify-write of a decimal ASCII counter
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn increment(
        &mut self,
        table: &str,
        row_key: &str,
        family: &str,
        column: &str,
        delta: i64,
        max_versions: usize,
    ) -> Result<i64> {
        let chain = self.table_mut(table).chain_mut(row_key, family, column);
        let current = match chain.latest() {
            None => 0,
            Some(cell) => parse_counter(cell, column)?,
        };
        let next = current.checked_add(delta).ok_or_else(|| {
            Error::invalid_input(format!("counter '{}' overflows adding {}", column, delta))
        })?;
        let ts = implicit_timestamp(chain);
        chain.insert(Cell::new(Bytes::from(next.to_string()), ts));
        chain.trim(max_versions);
        Ok(next)
    }

    pub(crate) fn row_count(&self, table: &str) -> usize {
        self.tables.get(table).map_or(0, |t| t.rows.len())
    }

    pub(crate) fn total_rows(&self) -> usize {
        self.tables.values().map(|t| t.rows.len()).sum()
    }

    pub(crate) fn total_cells(&self) -> usize {
        self.tables.values().map(TableShard::cell_count).sum()
    }
}

fn parse_counter(cell: &Cell, column: &str) -> Result<i64> {
    cell.as_str()
        .and_then(|s| s.trim().parse::<i64>().ok())
        .ok_or_else(|| {
            Error::invalid_input(format!(
                "counter '{}' holds a non-numeric value: {:?}",
                column,
                String::from_utf8_lossy(&cell.value)
            ))
        })
}

/// One shard and its current owner
#[derive(Debug)]
pub(crate) struct Shard {
    id: usize,
    server: RwLock<String>,
    available: AtomicBool,
    data: Mutex<ShardData>,
}

impl Shard {
    pub(crate) fn new(id: usize) -> Self {
        Self {
            id,
            server: RwLock::new(format!("shard-server-{}", id)),
            available: AtomicBool::new(true),
            data: Mutex::new(ShardData::default()),
        }
    }

    /// Shard index
    pub fn id(&self) -> usize {
        self.id
    }

    /// Server currently owning this shard
    pub fn server(&self) -> String {
        self.server.read().clone()
    }

    pub(crate) fn assign(&self, server: String) -> String {
        std::mem::replace(&mut *self.server.write(), server)
    }

    /// Whether the shard is serving requests
    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Acquire)
    }

    pub(crate) fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Release);
    }

    /// Lock the shard's data, failing if it is unavailable
    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, ShardData>> {
        if !self.is_available() {
            return Err(Error::ShardUnavailable { shard: self.id });
        }
        Ok(self.data.lock())
    }

    /// Lock regardless of availability (stats, table registration)
    pub(crate) fn lock_unchecked(&self) -> MutexGuard<'_, ShardData> {
        self.data.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX: usize = 64;

    #[test]
    fn test_put_and_get() {
        let mut data = ShardData::default();
        data.ensure_table("t");
        data.put_cell("t", "r1", "f", "c", Bytes::from("v"), Some(Timestamp::from_micros(5)), MAX);

        let row = data.get("t", "r1", None).unwrap();
        let cell = row.latest("f", "c").unwrap();
        assert_eq!(cell.as_str(), Some("v"));
        assert_eq!(cell.timestamp, Timestamp::from_micros(5));
        assert!(data.get("t", "r2", None).is_none());
        assert!(data.get("other", "r1", None).is_none());
    }

    #[test]
    fn test_implicit_timestamps_are_distinct() {
        let mut data = ShardData::default();
        for i in 0..5 {
            data.put_cell("t", "r", "f", "c", Bytes::from(i.to_string()), None, MAX);
        }
        let row = data.get("t", "r", None).unwrap();
        assert_eq!(row.versions("f", "c").len(), 5);
        assert_eq!(row.latest_str("f", "c"), Some("4"));
    }

    #[test]
    fn test_version_trim_on_write() {
        let mut data = ShardData::default();
        for ts in 1..=10u64 {
            data.put_cell("t", "r", "f", "c", Bytes::from("x"), Some(Timestamp::from_micros(ts)), 4);
        }
        assert_eq!(data.get("t", "r", None).unwrap().versions("f", "c").len(), 4);
    }

    #[test]
    fn test_scan_range_and_limit() {
        let mut data = ShardData::default();
        for key in ["a", "b", "c", "d"] {
            data.put_cell("t", key, "f", "c", Bytes::from(key), None, MAX);
        }
        let keys: Vec<_> = data
            .scan("t", "b", Some("d"), None, None)
            .into_iter()
            .map(|r| r.key)
            .collect();
        assert_eq!(keys, vec!["b", "c"]);
        assert_eq!(data.scan("t", "", None, None, Some(3)).len(), 3);
    }

    #[test]
    fn test_increment_counter() {
        let mut data = ShardData::default();
        assert_eq!(data.increment("t", "v1", "m", "views", 1, MAX).unwrap(), 1);
        assert_eq!(data.increment("t", "v1", "m", "views", 5, MAX).unwrap(), 6);
        assert_eq!(data.increment("t", "v1", "m", "views", -2, MAX).unwrap(), 4);
        let row = data.get("t", "v1", None).unwrap();
        assert_eq!(row.latest_str("m", "views"), Some("4"));
    }

    #[test]
    fn test_increment_non_numeric_rejected() {
        let mut data = ShardData::default();
        data.put_cell("t", "v1", "m", "views", Bytes::from("lots"), None, MAX);
        let err = data.increment("t", "v1", "m", "views", 1, MAX).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_delete_mutations() {
        let mut data = ShardData::default();
        let row = RowMutation::new("r")
            .set("f", "a", "1")
            .set("f", "b", "2")
            .set("g", "c", "3");
        data.apply_row("t", &row, MAX);
        assert_eq!(data.get("t", "r", None).unwrap().cell_count(), 3);

        data.apply_row(
            "t",
            &RowMutation::new("r").push(Mutation::DeleteCells {
                family: "f".into(),
                column: "a".into(),
                range: None,
            }),
            MAX,
        );
        data.apply_row(
            "t",
            &RowMutation::new("r").push(Mutation::DeleteFamily { family: "g".into() }),
            MAX,
        );
        let row = data.get("t", "r", None).unwrap();
        assert_eq!(row.cell_count(), 1);
        assert_eq!(row.latest_str("f", "b"), Some("2"));

        data.apply_row("t", &RowMutation::new("r").push(Mutation::DeleteRow), MAX);
        assert!(data.get("t", "r", None).is_none());
        assert_eq!(data.row_count("t"), 0);
    }

    #[test]
    fn test_unavailable_shard_rejects_lock() {
        let shard = Shard::new(2);
        shard.set_available(false);
        assert!(matches!(shard.lock(), Err(Error::ShardUnavailable { shard: 2 })));
        shard.set_available(true);
        assert!(shard.lock().is_ok());
    }

    #[test]
    fn test_reassign_returns_previous_owner() {
        let shard = Shard::new(0);
        assert_eq!(shard.server(), "shard-server-0");
        assert_eq!(shard.assign("node-b".into()), "shard-server-0");
        assert_eq!(shard.server(), "node-b");
    }
}
