//! One transactional database: its tables, lock table and apply gate
//!
//! The table map's `RwLock` doubles as the apply gate. A commit picks its
//! timestamp and applies every mutation while holding the write side; new
//! read timestamps are picked under the read side. Hence any read
//! timestamp greater than a commit timestamp was issued after that commit
//! was fully applied, and no reader ever observes half a transaction.

use crate::locks::{LockKey, LockTable};
use crate::mutation::{Assignment, Mutation};
use crate::query::Query;
use crate::schema::{ColumnType, Row, RowKey, TableSchema};
use crate::table::VersionedTable;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use streamvault_core::{Error, GlobalClock, Result, Timestamp, Value};

/// Final row image produced by staging a transaction's mutations
type StagedWrite = (String, RowKey, Option<Row>);

/// Per-database counts for stats
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DatabaseCounts {
    /// Tables
    pub tables: usize,
    /// Rows whose newest version is live
    pub live_rows: usize,
    /// Stored row versions, tombstones included
    pub row_versions: usize,
    /// Row locks currently held
    pub held_locks: usize,
}

/// Schema-typed tables with MVCC versions
#[derive(Debug)]
pub struct Database {
    id: String,
    tables: RwLock<FxHashMap<String, VersionedTable>>,
    locks: LockTable,
}

impl Database {
    /// Create a database from validated schemas
    pub fn new(id: &str, schemas: Vec<TableSchema>) -> Result<Self> {
        if id.is_empty() {
            return Err(Error::invalid_input("database id must not be empty"));
        }
        let mut tables = FxHashMap::default();
        for schema in schemas {
            schema.validate()?;
            if tables.contains_key(&schema.name) {
                return Err(Error::TableExists(schema.name));
            }
            tables.insert(schema.name.clone(), VersionedTable::new(schema));
        }
        Ok(Self {
            id: id.to_string(),
            tables: RwLock::new(tables),
            locks: LockTable::new(),
        })
    }

    /// Database id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Row lock table
    pub fn locks(&self) -> &LockTable {
        &self.locks
    }

    /// Table names, sorted
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Schema of `table`
    pub fn schema(&self, table: &str) -> Result<TableSchema> {
        self.tables
            .read()
            .get(table)
            .map(|t| t.schema().clone())
            .ok_or_else(|| Error::TableNotFound(table.to_string()))
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Issue a read timestamp that observes every finished commit
    pub fn snapshot_ts(&self, clock: &GlobalClock) -> Timestamp {
        let _gate = self.tables.read();
        clock.tick()
    }

    /// Run `query` against the snapshot at `ts`
    pub fn query_at(&self, query: &Query, ts: Timestamp) -> Result<Vec<Row>> {
        let tables = self.tables.read();
        let table = tables
            .get(&query.table)
            .ok_or_else(|| Error::TableNotFound(query.table.clone()))?;
        query.validate(table.schema())?;
        Ok(query.run(table.scan_at(ts)))
    }

    /// Run `query` against a fresh snapshot
    pub fn query_latest(&self, query: &Query, clock: &GlobalClock) -> Result<Vec<Row>> {
        let tables = self.tables.read();
        let ts = clock.tick();
        let table = tables
            .get(&query.table)
            .ok_or_else(|| Error::TableNotFound(query.table.clone()))?;
        query.validate(table.schema())?;
        Ok(query.run(table.scan_at(ts)))
    }

    /// Point read of one row at `ts`
    pub fn read_row_at(&self, table: &str, key: &RowKey, ts: Timestamp) -> Result<Option<Row>> {
        let tables = self.tables.read();
        let t = tables
            .get(table)
            .ok_or_else(|| Error::TableNotFound(table.to_string()))?;
        Ok(t.read_at(key, ts).cloned())
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Check mutations against the schema and resolve their row addresses
    ///
    /// Insert rows come back normalized (defaults filled in, numerics
    /// widened). Existence checks happen later, at prepare and commit.
    pub fn resolve(&self, mutations: Vec<Mutation>) -> Result<Vec<(LockKey, Mutation)>> {
        let tables = self.tables.read();
        mutations
            .into_iter()
            .map(|mutation| {
                let table = tables
                    .get(mutation.table())
                    .ok_or_else(|| Error::TableNotFound(mutation.table().to_string()))?;
                let schema = table.schema();
                match mutation {
                    Mutation::Insert { table, row } => {
                        let row = schema.normalize_row(row)?;
                        let key = schema.key_of(&row)?;
                        Ok(((table.clone(), key), Mutation::Insert { table, row }))
                    }
                    Mutation::Update {
                        table,
                        key,
                        changes,
                    } => {
                        schema.check_key(&key)?;
                        let changes = resolve_changes(schema, changes)?;
                        Ok((
                            (table.clone(), key.clone()),
                            Mutation::Update {
                                table,
                                key,
                                changes,
                            },
                        ))
                    }
                    Mutation::Delete { table, key } => {
                        schema.check_key(&key)?;
                        Ok(((table.clone(), key.clone()), Mutation::Delete { table, key }))
                    }
                }
            })
            .collect()
    }

    /// Validate buffered mutations against the latest committed state
    pub fn validate(&self, mutations: &[(LockKey, Mutation)]) -> Result<()> {
        let tables = self.tables.read();
        stage(&tables, mutations).map(|_| ())
    }

    /// Apply buffered mutations at one new commit timestamp
    ///
    /// Every row image is computed before anything is written, so an error
    /// leaves the database untouched.
    pub fn apply(&self, mutations: &[(LockKey, Mutation)], clock: &GlobalClock) -> Result<Timestamp> {
        let mut tables = self.tables.write();
        let staged = stage(&tables, mutations)?;
        let commit_ts = clock.tick();
        for (table, key, data) in staged {
            if let Some(t) = tables.get_mut(&table) {
                if data.is_none() && t.read_latest(&key).is_none() {
                    continue;
                }
                t.apply(key, data, commit_ts);
            }
        }
        Ok(commit_ts)
    }

    /// Drop versions no reader at or after `horizon` can see
    pub fn gc(&self, horizon: Timestamp) -> usize {
        self.tables
            .write()
            .values_mut()
            .map(|t| t.gc(horizon))
            .sum()
    }

    /// Current counts
    pub fn counts(&self) -> DatabaseCounts {
        let tables = self.tables.read();
        DatabaseCounts {
            tables: tables.len(),
            live_rows: tables.values().map(VersionedTable::live_rows).sum(),
            row_versions: tables.values().map(VersionedTable::version_count).sum(),
            held_locks: self.locks.held_count(),
        }
    }
}

fn resolve_changes(
    schema: &TableSchema,
    changes: BTreeMap<String, Assignment>,
) -> Result<BTreeMap<String, Assignment>> {
    if changes.is_empty() {
        return Err(Error::invalid_input(format!(
            "update on {} assigns no columns",
            schema.name
        )));
    }
    changes
        .into_iter()
        .map(|(column, assignment)| {
            if schema.is_key_column(&column) {
                return Err(Error::schema(
                    &schema.name,
                    format!("primary key column '{}' cannot be updated", column),
                ));
            }
            let assignment = match assignment {
                Assignment::Set(value) => Assignment::Set(schema.check_value(&column, value)?),
                Assignment::Increment(delta) => {
                    let def = schema.column_def(&column).ok_or_else(|| {
                        Error::schema(&schema.name, format!("unknown column '{}'", column))
                    })?;
                    if def.ty != ColumnType::Int64 {
                        return Err(Error::schema(
                            &schema.name,
                            format!("cannot increment {} column '{}'", def.ty, column),
                        ));
                    }
                    Assignment::Increment(delta)
                }
            };
            Ok((column, assignment))
        })
        .collect()
}

/// Compute final row images for a mutation list against the latest state
///
/// Later mutations see the effect of earlier ones in the same list.
fn stage(
    tables: &FxHashMap<String, VersionedTable>,
    mutations: &[(LockKey, Mutation)],
) -> Result<Vec<StagedWrite>> {
    let mut overlay: BTreeMap<LockKey, Option<Row>> = BTreeMap::new();

    for ((table_name, key), mutation) in mutations {
        let table = tables
            .get(table_name)
            .ok_or_else(|| Error::TableNotFound(table_name.clone()))?;
        let address = (table_name.clone(), key.clone());
        let current: Option<Row> = match overlay.get(&address) {
            Some(staged) => staged.clone(),
            None => table.read_latest(key).cloned(),
        };

        let next = match mutation {
            Mutation::Insert { row, .. } => {
                if current.is_some() {
                    return Err(Error::RowExists {
                        table: table_name.clone(),
                        key: key.to_string(),
                    });
                }
                Some(row.clone())
            }
            Mutation::Update { changes, .. } => {
                let mut row = current.ok_or_else(|| Error::RowNotFound {
                    table: table_name.clone(),
                    key: key.to_string(),
                })?;
                for (column, assignment) in changes {
                    let value = match assignment {
                        Assignment::Set(value) => value.clone(),
                        Assignment::Increment(delta) => {
                            let base = row.get(column).and_then(Value::as_int).unwrap_or(0);
                            let sum = base.checked_add(*delta).ok_or_else(|| {
                                Error::schema(
                                    table_name,
                                    format!("increment overflows column '{}'", column),
                                )
                            })?;
                            Value::Int(sum)
                        }
                    };
                    row.insert(column.clone(), value);
                }
                Some(row)
            }
            Mutation::Delete { .. } => None,
        };
        overlay.insert(address, next);
    }

    Ok(overlay
        .into_iter()
        .map(|((table, key), data)| (table, key, data))
        .collect())
}
