//! The wide-column store
//!
//! Tables are registered once and exist on every shard. A row key is routed
//! to exactly one shard by the store's [`ShardRouter`]; the router never
//! changes after construction, so a key never moves. Ownership of a shard
//! can move between servers with [`WideColumnStore::reassign_shard`].
//!
//! # Thread Safety
//!
//! All operations take `&self`. Each shard serializes access to its own rows;
//! scans and batch mutations fan out over shards with rayon.

use crate::cell::Row;
use crate::config::WideColumnConfig;
use crate::filter::RowFilter;
use crate::mutation::{MutateRowsReport, RowMutation, ShardFailure};
use crate::routing::{HashRouter, ShardRouter};
use crate::shard::Shard;
use bytes::Bytes;
use parking_lot::RwLock;
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use streamvault_core::{Deadline, Error, Result, Timestamp};
use tracing::{debug, info, warn};

/// Registered table
#[derive(Debug, Clone)]
struct TableMeta {
    families: Vec<String>,
    created_at: Timestamp,
}

impl TableMeta {
    fn has_family(&self, family: &str) -> bool {
        self.families.iter().any(|f| f == family)
    }
}

/// Current owner of one shard
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardAssignment {
    /// Shard index
    pub shard: usize,
    /// Owning server
    pub server: String,
    /// Whether the shard is serving requests
    pub available: bool,
}

/// Point-in-time statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WideColumnStats {
    /// Registered tables
    pub table_count: usize,
    /// Shards per table
    pub shard_count: usize,
    /// Router in use ("hash", "range")
    pub router: &'static str,
    /// Row count held by each shard, across tables
    pub rows_per_shard: Vec<usize>,
    /// Rows across all shards
    pub total_rows: usize,
    /// Cell versions across all shards
    pub total_cells: usize,
    /// Shards currently refusing requests
    pub unavailable_shards: Vec<usize>,
}

/// Table metadata as reported to callers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    /// Table name
    pub name: String,
    /// Declared column families
    pub families: Vec<String>,
    /// Registration time
    pub created_at: Timestamp,
}

/// Sharded wide-column store
#[derive(Debug)]
pub struct WideColumnStore {
    config: WideColumnConfig,
    router: Box<dyn ShardRouter>,
    shards: Vec<Shard>,
    tables: RwLock<FxHashMap<String, TableMeta>>,
}

impl WideColumnStore {
    /// Create a store with hash routing over `config.shard_count` shards
    pub fn new(config: WideColumnConfig) -> Self {
        let router = HashRouter::new(config.shard_count);
        Self::with_router(config, Box::new(router))
    }

    /// Create a store with a custom router
    ///
    /// The router's shard count wins over `config.shard_count`.
    pub fn with_router(mut config: WideColumnConfig, router: Box<dyn ShardRouter>) -> Self {
        config.shard_count = router.shard_count();
        let shards = (0..config.shard_count).map(Shard::new).collect();
        info!(
            target: "streamvault::widecolumn",
            shards = config.shard_count,
            router = router.name(),
            "Wide-column store started"
        );
        Self {
            config,
            router,
            shards,
            tables: RwLock::new(FxHashMap::default()),
        }
    }

    /// Active configuration
    pub fn config(&self) -> &WideColumnConfig {
        &self.config
    }

    /// Number of shards
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Shard that owns `row_key`
    pub fn shard_for(&self, row_key: &str) -> usize {
        self.router.route(row_key)
    }

    fn shard(&self, index: usize) -> Result<&Shard> {
        self.shards.get(index).ok_or_else(|| {
            Error::invalid_input(format!(
                "shard {} out of range (shard count {})",
                index,
                self.shards.len()
            ))
        })
    }

    fn table_meta(&self, table: &str) -> Result<TableMeta> {
        self.tables
            .read()
            .get(table)
            .cloned()
            .ok_or_else(|| Error::TableNotFound(table.to_string()))
    }

    fn check_family(&self, table: &str, meta: &TableMeta, family: &str) -> Result<()> {
        if meta.has_family(family) {
            Ok(())
        } else {
            Err(Error::FamilyNotFound {
                table: table.to_string(),
                family: family.to_string(),
            })
        }
    }

    // ========================================================================
    // Tables
    // ========================================================================

    /// Register a table with its column families on every shard
    pub fn create_table(&self, name: &str, families: &[&str]) -> Result<()> {
        if name.is_empty() {
            return Err(Error::invalid_input("table name must not be empty"));
        }
        if families.iter().any(|f| f.is_empty()) {
            return Err(Error::invalid_input("column family name must not be empty"));
        }

        let mut tables = self.tables.write();
        if tables.contains_key(name) {
            return Err(Error::TableExists(name.to_string()));
        }

        let mut declared: Vec<String> = families.iter().map(|f| f.to_string()).collect();
        declared.sort();
        declared.dedup();

        for shard in &self.shards {
            shard.lock_unchecked().ensure_table(name);
        }
        tables.insert(
            name.to_string(),
            TableMeta {
                families: declared.clone(),
                created_at: Timestamp::now(),
            },
        );

        info!(
            target: "streamvault::widecolumn",
            table = name,
            families = ?declared,
            "Table created"
        );
        Ok(())
    }

    /// True if `name` is registered
    pub fn table_exists(&self, name: &str) -> bool {
        self.tables.read().contains_key(name)
    }

    /// Registered table names, sorted
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Metadata of a registered table
    pub fn table_info(&self, name: &str) -> Result<TableInfo> {
        let meta = self.table_meta(name)?;
        Ok(TableInfo {
            name: name.to_string(),
            families: meta.families,
            created_at: meta.created_at,
        })
    }

    // ========================================================================
    // Single-row operations
    // ========================================================================

    /// Write a cell version, creating the row if needed
    ///
    /// Returns the version timestamp written (`timestamp`, or now).
    pub fn put(
        &self,
        table: &str,
        row_key: &str,
        family: &str,
        column: &str,
        value: impl Into<Bytes>,
        timestamp: Option<Timestamp>,
    ) -> Result<Timestamp> {
        let meta = self.table_meta(table)?;
        self.check_family(table, &meta, family)?;

        let index = self.router.route(row_key);
        let mut data = self.shard(index)?.lock()?;
        let ts = data.put_cell(
            table,
            row_key,
            family,
            column,
            value.into(),
            timestamp,
            self.config.max_cell_versions,
        );
        debug!(
            target: "streamvault::widecolumn",
            table,
            shard = index,
            row_key,
            family,
            column,
            "Cell written"
        );
        Ok(ts)
    }

    /// Read a row, optionally narrowed by `filter`
    ///
    /// `Ok(None)` when the table or row is absent or the filter removes
    /// every cell.
    pub fn get(
        &self,
        table: &str,
        row_key: &str,
        filter: Option<&RowFilter>,
    ) -> Result<Option<Row>> {
        if !self.table_exists(table) {
            return Ok(None);
        }
        let index = self.router.route(row_key);
        let data = self.shard(index)?.lock()?;
        Ok(data.get(table, row_key, filter))
    }

    /// Delete a row; returns whether it existed
    pub fn delete_row(&self, table: &str, row_key: &str) -> Result<bool> {
        self.table_meta(table)?;
        let index = self.router.route(row_key);
        let mut data = self.shard(index)?.lock()?;
        Ok(data.delete_row(table, row_key))
    }

    /// Add `delta` to a decimal ASCII counter cell and return the new value
    ///
    /// A missing cell counts as zero. The read and the write happen under
    /// the owning shard's lock, so concurrent increments never lose updates.
    pub fn increment_counter(
        &self,
        table: &str,
        row_key: &str,
        family: &str,
        column: &str,
        delta: i64,
    ) -> Result<i64> {
        let meta = self.table_meta(table)?;
        self.check_family(table, &meta, family)?;

        let index = self.router.route(row_key);
        let mut data = self.shard(index)?.lock()?;
        let value = data.increment(
            table,
            row_key,
            family,
            column,
            delta,
            self.config.max_cell_versions,
        )?;
        debug!(
            target: "streamvault::widecolumn",
            table,
            shard = index,
            row_key,
            column,
            value,
            "Counter incremented"
        );
        Ok(value)
    }

    // ========================================================================
    // Multi-shard operations
    // ========================================================================

    /// Rows with `start_key <= key < end_key`, merged across shards
    ///
    /// `end_key = None` scans to the end of the table. Bounded by the
    /// configured scan timeout.
    pub fn scan(
        &self,
        table: &str,
        start_key: &str,
        end_key: Option<&str>,
        filter: Option<&RowFilter>,
        limit: Option<usize>,
    ) -> Result<Vec<Row>> {
        let deadline = Deadline::after(self.config.scan_timeout());
        self.scan_with_deadline(table, start_key, end_key, filter, limit, deadline)
    }

    /// [`scan`](Self::scan) with an explicit deadline
    ///
    /// Fails with `Timeout` if the deadline passes before every shard has
    /// answered. Any unavailable shard fails the scan.
    pub fn scan_with_deadline(
        &self,
        table: &str,
        start_key: &str,
        end_key: Option<&str>,
        filter: Option<&RowFilter>,
        limit: Option<usize>,
        deadline: Deadline,
    ) -> Result<Vec<Row>> {
        if !self.table_exists(table) {
            return Ok(Vec::new());
        }
        let targets = self.router.shards_for_range(start_key, end_key);

        let per_shard: Vec<Vec<Row>> = targets
            .par_iter()
            .map(|&index| {
                deadline.check("scan")?;
                let rows = {
                    let data = self.shard(index)?.lock()?;
                    data.scan(table, start_key, end_key, filter, limit)
                };
                deadline.check("scan")?;
                Ok(rows)
            })
            .collect::<Result<_>>()?;

        let mut merged: Vec<Row> = per_shard.into_iter().flatten().collect();
        merged.sort_by(|a, b| a.key.cmp(&b.key));
        if let Some(limit) = limit {
            merged.truncate(limit);
        }
        debug!(
            target: "streamvault::widecolumn",
            table,
            shards = targets.len(),
            rows = merged.len(),
            "Scan complete"
        );
        Ok(merged)
    }

    /// Apply row mutations grouped by owning shard
    ///
    /// Each shard's batch is validated and applied under that shard's lock as
    /// one unit. Batches on different shards are independent: one shard
    /// failing does not roll back the others. Only an unknown table fails
    /// the whole call.
    pub fn mutate_rows(&self, table: &str, rows: Vec<RowMutation>) -> Result<MutateRowsReport> {
        let meta = self.table_meta(table)?;

        let mut batches: FxHashMap<usize, Vec<RowMutation>> = FxHashMap::default();
        for row in rows {
            batches
                .entry(self.router.route(&row.row_key))
                .or_default()
                .push(row);
        }
        let mut batches: Vec<(usize, Vec<RowMutation>)> = batches.into_iter().collect();
        batches.sort_by_key(|(shard, _)| *shard);

        let outcomes: Vec<(usize, Vec<RowMutation>, Result<usize>)> = batches
            .into_par_iter()
            .map(|(index, batch)| {
                let result = self.apply_shard_batch(table, &meta, index, &batch);
                (index, batch, result)
            })
            .collect();

        let mut report = MutateRowsReport::default();
        for (shard, batch, result) in outcomes {
            match result {
                Ok(applied) => report.applied_rows += applied,
                Err(e) => {
                    warn!(
                        target: "streamvault::widecolumn",
                        table,
                        shard,
                        rows = batch.len(),
                        error = %e,
                        "Shard batch rejected"
                    );
                    report.failures.push(ShardFailure {
                        shard,
                        row_keys: batch.into_iter().map(|r| r.row_key).collect(),
                        error: e.to_string(),
                    });
                }
            }
        }
        Ok(report)
    }

    fn apply_shard_batch(
        &self,
        table: &str,
        meta: &TableMeta,
        index: usize,
        batch: &[RowMutation],
    ) -> Result<usize> {
        for row in batch {
            for mutation in &row.mutations {
                if let Some(family) = mutation.family() {
                    self.check_family(table, meta, family)?;
                }
            }
        }
        let mut data = self.shard(index)?.lock()?;
        for row in batch {
            data.apply_row(table, row, self.config.max_cell_versions);
        }
        Ok(batch.len())
    }

    // ========================================================================
    // Shard management
    // ========================================================================

    /// Move ownership of a shard to `server`; returns the previous owner
    ///
    /// Keys stay on the same shard; only the owning server changes.
    pub fn reassign_shard(&self, shard: usize, server: &str) -> Result<String> {
        let previous = self.shard(shard)?.assign(server.to_string());
        info!(
            target: "streamvault::widecolumn",
            shard,
            from = %previous,
            to = server,
            "Shard reassigned"
        );
        Ok(previous)
    }

    /// Owner and availability of every shard
    pub fn shard_assignments(&self) -> Vec<ShardAssignment> {
        self.shards
            .iter()
            .map(|s| ShardAssignment {
                shard: s.id(),
                server: s.server(),
                available: s.is_available(),
            })
            .collect()
    }

    /// Take a shard offline or bring it back
    ///
    /// While offline, every request routed to the shard fails with
    /// `ShardUnavailable`.
    pub fn set_shard_available(&self, shard: usize, available: bool) -> Result<()> {
        self.shard(shard)?.set_available(available);
        if available {
            info!(target: "streamvault::widecolumn", shard, "Shard back online");
        } else {
            warn!(target: "streamvault::widecolumn", shard, "Shard marked unavailable");
        }
        Ok(())
    }

    /// Point-in-time statistics
    pub fn stats(&self) -> WideColumnStats {
        let mut rows_per_shard = Vec::with_capacity(self.shards.len());
        let mut total_cells = 0;
        for shard in &self.shards {
            let data = shard.lock_unchecked();
            rows_per_shard.push(data.total_rows());
            total_cells += data.total_cells();
        }
        WideColumnStats {
            table_count: self.tables.read().len(),
            shard_count: self.shards.len(),
            router: self.router.name(),
            total_rows: rows_per_shard.iter().sum(),
            rows_per_shard,
            total_cells,
            unavailable_shards: self
                .shards
                .iter()
                .filter(|s| !s.is_available())
                .map(Shard::id)
                .collect(),
        }
    }

    /// Rows of `table` held by each shard
    pub fn table_rows_per_shard(&self, table: &str) -> Result<Vec<usize>> {
        self.table_meta(table)?;
        Ok(self
            .shards
            .iter()
            .map(|s| s.lock_unchecked().row_count(table))
            .collect())
    }
}

impl Default for WideColumnStore {
    fn default() -> Self {
        Self::new(WideColumnConfig::default())
    }
}
