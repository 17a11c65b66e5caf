//! Cells and per-column version chains
//!
//! Every (row, family, column) address holds a chain of timestamped cell
//! versions. Versions are kept in descending timestamp order (newest first)
//! so the common read, "latest version at or before T", stops at the first
//! match.

use bytes::Bytes;
use std::collections::{BTreeMap, VecDeque};
use streamvault_core::Timestamp;

/// One timestamped version of a column value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    /// Raw bytes
    pub value: Bytes,
    /// Write timestamp
    pub timestamp: Timestamp,
    /// Optional labels attached at write time
    pub labels: Vec<String>,
}

impl Cell {
    /// Create an unlabeled cell
    pub fn new(value: impl Into<Bytes>, timestamp: Timestamp) -> Self {
        Self {
            value: value.into(),
            timestamp,
            labels: Vec::new(),
        }
    }

    /// Attach labels
    pub fn with_labels(mut self, labels: Vec<String>) -> Self {
        self.labels = labels;
        self
    }

    /// Value as UTF-8, `None` if the bytes are not valid UTF-8
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.value).ok()
    }
}

/// Version chain for one column, newest first
#[derive(Debug, Clone, Default)]
pub struct CellChain {
    versions: VecDeque<Cell>,
}

impl CellChain {
    /// Create an empty chain
    pub fn new() -> Self {
        Self {
            versions: VecDeque::with_capacity(2),
        }
    }

    /// Insert a version keeping descending timestamp order
    ///
    /// A version with the same timestamp as an existing one replaces it.
    /// The common case (a newer write) is an O(1) `push_front`.
    pub fn insert(&mut self, cell: Cell) {
        match self.versions.front() {
            None => self.versions.push_front(cell),
            Some(front) if cell.timestamp > front.timestamp => self.versions.push_front(cell),
            _ => {
                let pos = self
                    .versions
                    .iter()
                    .position(|c| c.timestamp <= cell.timestamp);
                match pos {
                    Some(i) if self.versions[i].timestamp == cell.timestamp => {
                        self.versions[i] = cell;
                    }
                    Some(i) => self.versions.insert(i, cell),
                    None => self.versions.push_back(cell),
                }
            }
        }
    }

    /// Drop the oldest versions beyond `max_versions`
    ///
    /// Returns how many versions were removed. Always keeps at least one.
    pub fn trim(&mut self, max_versions: usize) -> usize {
        let keep = max_versions.max(1);
        let before = self.versions.len();
        self.versions.truncate(keep);
        before - self.versions.len()
    }

    /// Newest version
    #[inline]
    pub fn latest(&self) -> Option<&Cell> {
        self.versions.front()
    }

    /// Newest version with timestamp ≤ `ts`
    pub fn at(&self, ts: Timestamp) -> Option<&Cell> {
        self.versions.iter().find(|c| c.timestamp <= ts)
    }

    /// Remove every version inside `[start, end]`
    pub fn remove_range(&mut self, start: Timestamp, end: Timestamp) -> usize {
        let before = self.versions.len();
        self.versions
            .retain(|c| c.timestamp < start || c.timestamp > end);
        before - self.versions.len()
    }

    /// Iterate newest first
    pub fn iter(&self) -> impl Iterator<Item = &Cell> {
        self.versions.iter()
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

/// Stored layout of one row inside a shard: family → column → chain
pub(crate) type StoredRow = BTreeMap<String, BTreeMap<String, CellChain>>;

/// Column name → cells, newest first
pub type ColumnMap = BTreeMap<String, Vec<Cell>>;

/// A row as returned to callers: family → column → versions (newest first)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    /// Row key
    pub key: String,
    /// Family name → columns
    pub families: BTreeMap<String, ColumnMap>,
}

impl Row {
    /// Create an empty row
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            families: BTreeMap::new(),
        }
    }

    /// Newest cell at (family, column)
    pub fn latest(&self, family: &str, column: &str) -> Option<&Cell> {
        self.families
            .get(family)
            .and_then(|cols| cols.get(column))
            .and_then(|cells| cells.first())
    }

    /// Newest value at (family, column) as UTF-8
    pub fn latest_str(&self, family: &str, column: &str) -> Option<&str> {
        self.latest(family, column).and_then(Cell::as_str)
    }

    /// Every version at (family, column), newest first
    pub fn versions(&self, family: &str, column: &str) -> &[Cell] {
        self.families
            .get(family)
            .and_then(|cols| cols.get(column))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Columns of a family
    pub fn family(&self, family: &str) -> Option<&ColumnMap> {
        self.families.get(family)
    }

    /// Total number of cell versions in the row
    pub fn cell_count(&self) -> usize {
        self.families
            .values()
            .flat_map(|cols| cols.values())
            .map(Vec::len)
            .sum()
    }

    /// True if the row has no cells
    pub fn is_empty(&self) -> bool {
        self.cell_count() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(v: &str, ts: u64) -> Cell {
        Cell::new(Bytes::copy_from_slice(v.as_bytes()), Timestamp::from_micros(ts))
    }

    #[test]
    fn test_chain_orders_newest_first() {
        let mut chain = CellChain::new();
        chain.insert(cell("a", 10));
        chain.insert(cell("c", 30));
        chain.insert(cell("b", 20));

        let ts: Vec<u64> = chain.iter().map(|c| c.timestamp.as_micros()).collect();
        assert_eq!(ts, vec![30, 20, 10]);
        assert_eq!(chain.latest().unwrap().as_str(), Some("c"));
    }

    #[test]
    fn test_chain_same_timestamp_replaces() {
        let mut chain = CellChain::new();
        chain.insert(cell("old", 10));
        chain.insert(cell("new", 10));
        assert_eq!(chain.len(), 1);
        assert_eq!(chain.latest().unwrap().as_str(), Some("new"));
    }

    #[test]
    fn test_chain_at_snapshot() {
        let mut chain = CellChain::new();
        chain.insert(cell("v1", 100));
        chain.insert(cell("v2", 200));

        assert!(chain.at(Timestamp::from_micros(99)).is_none());
        assert_eq!(chain.at(Timestamp::from_micros(150)).unwrap().as_str(), Some("v1"));
        assert_eq!(chain.at(Timestamp::from_micros(200)).unwrap().as_str(), Some("v2"));
    }

    #[test]
    fn test_chain_trim_keeps_newest() {
        let mut chain = CellChain::new();
        for ts in 1..=10 {
            chain.insert(cell("x", ts));
        }
        assert_eq!(chain.trim(3), 7);
        let ts: Vec<u64> = chain.iter().map(|c| c.timestamp.as_micros()).collect();
        assert_eq!(ts, vec![10, 9, 8]);
        assert_eq!(chain.trim(0), 2);
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn test_chain_remove_range() {
        let mut chain = CellChain::new();
        for ts in [10, 20, 30, 40] {
            chain.insert(cell("x", ts));
        }
        let removed = chain.remove_range(Timestamp::from_micros(15), Timestamp::from_micros(30));
        assert_eq!(removed, 2);
        let ts: Vec<u64> = chain.iter().map(|c| c.timestamp.as_micros()).collect();
        assert_eq!(ts, vec![40, 10]);
    }

    #[test]
    fn test_row_accessors() {
        let mut row = Row::new("u1");
        row.families
            .entry("metrics".into())
            .or_default()
            .insert("views".into(), vec![cell("3", 3), cell("2", 2)]);

        assert_eq!(row.latest_str("metrics", "views"), Some("3"));
        assert_eq!(row.versions("metrics", "views").len(), 2);
        assert!(row.versions("metrics", "missing").is_empty());
        assert_eq!(row.cell_count(), 2);
    }
}
