//! Transactional store: databases, transactions and two-phase commit
//!
//! ## Commit protocol
//!
//! 1. `begin_transaction` picks a read timestamp from the global clock.
//! 2. Mutations are checked against the schema and buffered.
//! 3. `prepare_transaction` takes every row lock in key order (each wait
//!    bounded by `lock_timeout`) and validates the buffer against the
//!    latest committed state.
//! 4. `commit_transaction` picks the commit timestamp and applies all
//!    mutations atomically, then releases the locks.
//!
//! Any failure in steps 3 or 4 aborts the transaction and releases its
//! locks. Prepared transactions block conflicting writers but never
//! readers: reads always go to the MVCC snapshot.

use crate::config::TransactionalConfig;
use crate::database::Database;
use crate::mutation::Mutation;
use crate::query::Query;
use crate::schema::{Row, RowKey, TableSchema};
use crate::transaction::{Transaction, TransactionStatus, TxnId};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use streamvault_core::{Error, GlobalClock, Result, Timestamp};
use tracing::{debug, info, warn};

/// Snapshot of store counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionalStats {
    /// Registered databases
    pub databases: usize,
    /// Tables across all databases
    pub tables: usize,
    /// Live rows across all tables
    pub live_rows: usize,
    /// Stored row versions, tombstones included
    pub row_versions: usize,
    /// Transactions not yet committed or aborted
    pub active_transactions: usize,
    /// Row locks currently held
    pub held_locks: usize,
    /// Transactions started since creation
    pub total_started: u64,
    /// Transactions committed since creation
    pub total_committed: u64,
    /// Transactions aborted since creation
    pub total_aborted: u64,
    /// Highest timestamp the clock has issued
    pub last_timestamp: Timestamp,
}

/// Multi-database transactional store with snapshot reads
pub struct TransactionalStore {
    config: TransactionalConfig,
    clock: Arc<GlobalClock>,
    databases: DashMap<String, Arc<Database>>,
    transactions: DashMap<TxnId, Arc<Mutex<Transaction>>>,
    /// Terminal statuses of recently finished transactions, oldest first
    finished: Mutex<VecDeque<(TxnId, TransactionStatus)>>,
    next_txn_id: AtomicU64,
    total_started: AtomicU64,
    total_committed: AtomicU64,
    total_aborted: AtomicU64,
}

impl TransactionalStore {
    /// Create a store with its own clock
    pub fn new(config: TransactionalConfig) -> Self {
        let clock = Arc::new(GlobalClock::new(config.clock_uncertainty()));
        Self::with_clock(config, clock)
    }

    /// Create a store sharing an existing clock
    pub fn with_clock(config: TransactionalConfig, clock: Arc<GlobalClock>) -> Self {
        Self {
            config,
            clock,
            databases: DashMap::new(),
            transactions: DashMap::new(),
            finished: Mutex::new(VecDeque::new()),
            next_txn_id: AtomicU64::new(1),
            total_started: AtomicU64::new(0),
            total_committed: AtomicU64::new(0),
            total_aborted: AtomicU64::new(0),
        }
    }

    /// Store configuration
    pub fn config(&self) -> &TransactionalConfig {
        &self.config
    }

    /// Clock shared by every transaction
    pub fn clock(&self) -> &Arc<GlobalClock> {
        &self.clock
    }

    // ========================================================================
    // Databases
    // ========================================================================

    /// Register a database with its table schemas
    pub fn create_database(&self, db_id: &str, schemas: Vec<TableSchema>) -> Result<()> {
        let database = Database::new(db_id, schemas)?;
        match self.databases.entry(db_id.to_string()) {
            Entry::Occupied(_) => Err(Error::DatabaseExists(db_id.to_string())),
            Entry::Vacant(slot) => {
                info!(
                    target: "streamvault::txn",
                    db_id,
                    tables = ?database.table_names(),
                    "Created database"
                );
                slot.insert(Arc::new(database));
                Ok(())
            }
        }
    }

    /// Registered database ids, sorted
    pub fn database_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.databases.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Schema of one table
    pub fn table_schema(&self, db_id: &str, table: &str) -> Result<TableSchema> {
        self.database(db_id)?.schema(table)
    }

    fn database(&self, db_id: &str) -> Result<Arc<Database>> {
        self.databases
            .get(db_id)
            .map(|d| Arc::clone(d.value()))
            .ok_or_else(|| Error::DatabaseNotFound(db_id.to_string()))
    }

    fn handle(&self, txn_id: TxnId) -> Result<Arc<Mutex<Transaction>>> {
        self.transactions
            .get(&txn_id)
            .map(|t| Arc::clone(t.value()))
            .ok_or(Error::TransactionNotFound(txn_id))
    }

    // ========================================================================
    // Transactions
    // ========================================================================

    /// Start a transaction whose reads see every commit finished so far
    pub fn begin_transaction(&self, db_id: &str, read_only: bool) -> Result<TxnId> {
        let database = self.database(db_id)?;
        let txn_id = self.next_txn_id.fetch_add(1, Ordering::Relaxed);
        let read_ts = database.snapshot_ts(&self.clock);
        self.transactions.insert(
            txn_id,
            Arc::new(Mutex::new(Transaction::new(txn_id, db_id, read_ts, read_only))),
        );
        self.total_started.fetch_add(1, Ordering::Relaxed);
        debug!(target: "streamvault::txn", txn_id, db_id, %read_ts, read_only, "Began transaction");
        Ok(txn_id)
    }

    /// Read timestamp of a transaction bound to `db_id`
    fn read_ts_of(&self, db_id: &str, txn_id: TxnId) -> Result<Timestamp> {
        let handle = self.handle(txn_id)?;
        let txn = handle.lock();
        if txn.db_id != db_id {
            return Err(Error::invalid_input(format!(
                "transaction {} belongs to database {}",
                txn_id, txn.db_id
            )));
        }
        if txn.status().is_terminal() {
            txn.ensure_active()?;
        }
        Ok(txn.read_ts)
    }

    /// Run a query at the transaction's snapshot, or at a fresh one
    ///
    /// Buffered, uncommitted mutations of the transaction are not visible.
    pub fn execute_query(&self, db_id: &str, query: &Query, txn_id: Option<TxnId>) -> Result<Vec<Row>> {
        let database = self.database(db_id)?;
        match txn_id {
            Some(id) => {
                let read_ts = self.read_ts_of(db_id, id)?;
                database.query_at(query, read_ts)
            }
            None => database.query_latest(query, &self.clock),
        }
    }

    /// Point read by primary key
    pub fn read_row(
        &self,
        db_id: &str,
        table: &str,
        key: &RowKey,
        txn_id: Option<TxnId>,
    ) -> Result<Option<Row>> {
        let database = self.database(db_id)?;
        let read_ts = match txn_id {
            Some(id) => self.read_ts_of(db_id, id)?,
            None => database.snapshot_ts(&self.clock),
        };
        database.read_row_at(table, key, read_ts)
    }

    /// Buffer mutations in a transaction, or commit them on their own
    ///
    /// Without a transaction the mutations run in a fresh single-use
    /// transaction and the commit timestamp is returned.
    pub fn execute_mutation(
        &self,
        db_id: &str,
        mutations: Vec<Mutation>,
        txn_id: Option<TxnId>,
    ) -> Result<Option<Timestamp>> {
        let database = self.database(db_id)?;
        let resolved = database.resolve(mutations)?;
        match txn_id {
            Some(id) => {
                let handle = self.handle(id)?;
                let mut txn = handle.lock();
                if txn.db_id != db_id {
                    return Err(Error::invalid_input(format!(
                        "transaction {} belongs to database {}",
                        id, txn.db_id
                    )));
                }
                let count = resolved.len();
                txn.buffer(resolved)?;
                debug!(target: "streamvault::txn", txn_id = id, count, "Buffered mutations");
                Ok(None)
            }
            None => {
                let id = self.begin_transaction(db_id, false)?;
                {
                    let handle = self.handle(id)?;
                    handle.lock().buffer(resolved)?;
                }
                self.commit_transaction(id).map(Some)
            }
        }
    }

    /// Lock and validate every row the transaction writes
    pub fn prepare_transaction(&self, txn_id: TxnId) -> Result<()> {
        let handle = self.handle(txn_id)?;
        let mut txn = handle.lock();
        let database = self.database(&txn.db_id)?;
        self.prepare_locked(&mut txn, &database)
    }

    fn prepare_locked(&self, txn: &mut Transaction, database: &Database) -> Result<()> {
        txn.ensure_active()?;
        let keys = txn.lock_keys();
        if let Err(e) = database
            .locks()
            .acquire_all(&keys, txn.id, self.config.lock_timeout())
        {
            self.fail(txn, database, &e);
            return Err(e);
        }
        let lock_count = keys.len();
        txn.mark_prepared(keys)?;

        if let Err(e) = database.validate(txn.mutations()) {
            self.fail(txn, database, &e);
            return Err(e);
        }
        debug!(target: "streamvault::txn", txn_id = txn.id, locks = lock_count, "Prepared transaction");
        Ok(())
    }

    /// Commit, preparing first if needed; returns the commit timestamp
    pub fn commit_transaction(&self, txn_id: TxnId) -> Result<Timestamp> {
        let handle = self.handle(txn_id)?;
        let mut txn = handle.lock();
        let database = self.database(&txn.db_id)?;

        if txn.mutations().is_empty() && txn.is_active() {
            let commit_ts = self.clock.tick();
            txn.mark_committed(commit_ts)?;
            self.finish(&txn);
            self.total_committed.fetch_add(1, Ordering::Relaxed);
            debug!(target: "streamvault::txn", txn_id, %commit_ts, "Committed empty transaction");
            return Ok(commit_ts);
        }

        if txn.is_active() {
            self.prepare_locked(&mut txn, &database)?;
        } else if !txn.is_prepared() {
            txn.ensure_active()?;
        }

        let commit_ts = match database.apply(txn.mutations(), &self.clock) {
            Ok(ts) => ts,
            Err(e) => {
                self.fail(&mut txn, &database, &e);
                return Err(e);
            }
        };
        let mutation_count = txn.mutations().len();
        let locked = txn.mark_committed(commit_ts)?;

        if self.config.commit_wait {
            let waited = self.clock.wait_until_past(commit_ts);
            debug!(target: "streamvault::txn", txn_id, waited_us = waited.as_micros() as u64, "Commit wait");
        }
        database.locks().release_all(&locked, txn_id);
        self.finish(&txn);
        self.total_committed.fetch_add(1, Ordering::Relaxed);

        info!(
            target: "streamvault::txn",
            txn_id,
            db_id = %txn.db_id,
            %commit_ts,
            mutations = mutation_count,
            "Committed transaction"
        );
        Ok(commit_ts)
    }

    /// Abort a transaction and release its locks
    pub fn abort_transaction(&self, txn_id: TxnId) -> Result<()> {
        let handle = self.handle(txn_id)?;
        let mut txn = handle.lock();
        let database = self.database(&txn.db_id)?;
        let locked = txn.mark_aborted("aborted by caller")?;
        database.locks().release_all(&locked, txn_id);
        self.finish(&txn);
        self.total_aborted.fetch_add(1, Ordering::Relaxed);
        info!(target: "streamvault::txn", txn_id, "Aborted transaction");
        Ok(())
    }

    /// Current or final state of a transaction
    pub fn transaction_status(&self, txn_id: TxnId) -> Result<TransactionStatus> {
        if let Ok(handle) = self.handle(txn_id) {
            return Ok(handle.lock().status().clone());
        }
        self.finished
            .lock()
            .iter()
            .rev()
            .find(|(id, _)| *id == txn_id)
            .map(|(_, status)| status.clone())
            .ok_or(Error::TransactionNotFound(txn_id))
    }

    /// Abort after a prepare or apply failure
    fn fail(&self, txn: &mut Transaction, database: &Database, error: &Error) {
        if let Ok(locked) = txn.mark_aborted(error.to_string()) {
            database.locks().release_all(&locked, txn.id);
        }
        self.finish(txn);
        self.total_aborted.fetch_add(1, Ordering::Relaxed);
        warn!(target: "streamvault::txn", txn_id = txn.id, error = %error, "Transaction aborted");
    }

    /// Move a terminal transaction from the live map into the status ring
    fn finish(&self, txn: &Transaction) {
        self.transactions.remove(&txn.id);
        let retention = self.config.finished_txn_retention;
        if retention == 0 {
            return;
        }
        let mut finished = self.finished.lock();
        if finished.len() >= retention {
            finished.pop_front();
        }
        finished.push_back((txn.id, txn.status().clone()));
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Drop row versions older than `before` that no live snapshot needs
    ///
    /// The horizon is clamped to the oldest read timestamp among the
    /// database's unfinished transactions. Returns versions removed.
    pub fn gc_versions(&self, db_id: &str, before: Timestamp) -> Result<usize> {
        let database = self.database(db_id)?;
        let handles: Vec<Arc<Mutex<Transaction>>> = self
            .transactions
            .iter()
            .map(|e| Arc::clone(e.value()))
            .collect();
        let horizon = handles
            .iter()
            .filter_map(|h| {
                let txn = h.lock();
                (txn.db_id == db_id && !txn.status().is_terminal()).then_some(txn.read_ts)
            })
            .fold(before, Timestamp::min);
        let removed = database.gc(horizon);
        debug!(target: "streamvault::txn", db_id, %horizon, removed, "Collected row versions");
        Ok(removed)
    }

    /// Transactions not yet finished
    pub fn active_transactions(&self) -> usize {
        self.transactions.len()
    }

    /// Current counters
    pub fn stats(&self) -> TransactionalStats {
        let databases: Vec<Arc<Database>> =
            self.databases.iter().map(|e| Arc::clone(e.value())).collect();
        let mut stats = TransactionalStats {
            databases: databases.len(),
            active_transactions: self.transactions.len(),
            total_started: self.total_started.load(Ordering::Relaxed),
            total_committed: self.total_committed.load(Ordering::Relaxed),
            total_aborted: self.total_aborted.load(Ordering::Relaxed),
            last_timestamp: self.clock.last_issued(),
            ..Default::default()
        };
        for database in databases {
            let counts = database.counts();
            stats.tables += counts.tables;
            stats.live_rows += counts.live_rows;
            stats.row_versions += counts.row_versions;
            stats.held_locks += counts.held_locks;
        }
        stats
    }
}

impl Default for TransactionalStore {
    fn default() -> Self {
        Self::new(TransactionalConfig::default())
    }
}

impl std::fmt::Debug for TransactionalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionalStore")
            .field("databases", &self.databases.len())
            .field("active_transactions", &self.transactions.len())
            .finish()
    }
}
