//! Row filters
//!
//! Filters are evaluated at the owning shard so only matching cells cross
//! the shard boundary. All conditions are conjunctive:
//!
//! - family regex: family name must match
//! - column regex: column qualifier must match
//! - timestamp range: cell timestamp within `[start, end]` (inclusive)
//! - value regex: cell value (lossy UTF-8) must match
//! - cells per column: keep at most N newest surviving versions
//!
//! Regexes are unanchored, so `"views"` also matches `"total_views"`. Use
//! [`RowFilter::family`] / [`RowFilter::column`] for exact names.

use crate::cell::{Cell, ColumnMap, Row, StoredRow};
use regex::Regex;
use streamvault_core::{Error, Result, Timestamp};

/// Inclusive timestamp window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampRange {
    /// Earliest timestamp kept
    pub start: Timestamp,
    /// Latest timestamp kept
    pub end: Timestamp,
}

impl TimestampRange {
    /// True if `ts` lies in the window
    pub fn contains(&self, ts: Timestamp) -> bool {
        ts >= self.start && ts <= self.end
    }
}

/// Conjunctive cell filter
#[derive(Debug, Clone, Default)]
pub struct RowFilter {
    family: Option<Regex>,
    column: Option<Regex>,
    value: Option<Regex>,
    time_range: Option<TimestampRange>,
    cells_per_column: Option<usize>,
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern)
        .map_err(|e| Error::invalid_input(format!("invalid filter regex '{}': {}", pattern, e)))
}

impl RowFilter {
    /// Filter that keeps everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep only the newest version of each column
    pub fn latest() -> Self {
        Self::new().cells_per_column(1)
    }

    /// Keep families whose name matches `pattern`
    pub fn family_regex(mut self, pattern: &str) -> Result<Self> {
        self.family = Some(compile(pattern)?);
        Ok(self)
    }

    /// Keep exactly the family `name`
    pub fn family(self, name: &str) -> Self {
        let pattern = format!("^{}$", regex::escape(name));
        // an escaped literal always compiles
        match self.clone().family_regex(&pattern) {
            Ok(filter) => filter,
            Err(_) => self,
        }
    }

    /// Keep columns whose qualifier matches `pattern`
    pub fn column_regex(mut self, pattern: &str) -> Result<Self> {
        self.column = Some(compile(pattern)?);
        Ok(self)
    }

    /// Keep exactly the column `name`
    pub fn column(self, name: &str) -> Self {
        let pattern = format!("^{}$", regex::escape(name));
        match self.clone().column_regex(&pattern) {
            Ok(filter) => filter,
            Err(_) => self,
        }
    }

    /// Keep cells whose value matches `pattern`
    pub fn value_regex(mut self, pattern: &str) -> Result<Self> {
        self.value = Some(compile(pattern)?);
        Ok(self)
    }

    /// Keep cells with `start <= timestamp <= end`
    pub fn time_range(mut self, start: Timestamp, end: Timestamp) -> Self {
        self.time_range = Some(TimestampRange { start, end });
        self
    }

    /// Read as of `ts`: cells written at or before `ts`
    pub fn as_of(self, ts: Timestamp) -> Self {
        self.time_range(Timestamp::EPOCH, ts)
    }

    /// Keep at most `n` versions per column
    pub fn cells_per_column(mut self, n: usize) -> Self {
        self.cells_per_column = Some(n);
        self
    }

    fn keep_cell(&self, cell: &Cell) -> bool {
        if let Some(range) = &self.time_range {
            if !range.contains(cell.timestamp) {
                return false;
            }
        }
        if let Some(re) = &self.value {
            if !re.is_match(&String::from_utf8_lossy(&cell.value)) {
                return false;
            }
        }
        true
    }

    /// Project a stored row through this filter
    ///
    /// Returns `None` when no cell survives.
    pub(crate) fn apply(&self, key: &str, stored: &StoredRow) -> Option<Row> {
        let mut row = Row::new(key);
        for (family, columns) in stored {
            if self.family.as_ref().is_some_and(|re| !re.is_match(family)) {
                continue;
            }
            let mut kept = ColumnMap::new();
            for (column, chain) in columns {
                if self.column.as_ref().is_some_and(|re| !re.is_match(column)) {
                    continue;
                }
                let limit = self.cells_per_column.unwrap_or(usize::MAX);
                let cells: Vec<Cell> = chain
                    .iter()
                    .filter(|c| self.keep_cell(c))
                    .take(limit)
                    .cloned()
                    .collect();
                if !cells.is_empty() {
                    kept.insert(column.clone(), cells);
                }
            }
            if !kept.is_empty() {
                row.families.insert(family.clone(), kept);
            }
        }
        if row.families.is_empty() {
            None
        } else {
            Some(row)
        }
    }
}

/// Project a stored row with an optional filter
pub(crate) fn project(key: &str, stored: &StoredRow, filter: Option<&RowFilter>) -> Option<Row> {
    match filter {
        Some(f) => f.apply(key, stored),
        None => RowFilter::new().apply(key, stored),
    }
}
