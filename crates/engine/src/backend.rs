//! Store interfaces used by the coordinator
//!
//! The coordinator holds each store behind one of these traits, so tests
//! and deployments can substitute failing, remote or instrumented stores.
//! The concrete stores implement them by delegation.

use bytes::Bytes;
use streamvault_core::{Result, Timestamp};
use streamvault_objects::{GcReport, ObjectStore, StorageStats};
use streamvault_txn::{
    Mutation, Query, Row as Record, TableSchema, TransactionalStats, TransactionalStore, TxnId,
};
use streamvault_widecolumn::{Row, RowFilter, WideColumnStats, WideColumnStore};

/// Sharded event and counter storage
pub trait WideColumnBackend: Send + Sync {
    /// Register a table with its column families
    fn create_table(&self, name: &str, families: &[&str]) -> Result<()>;

    /// True if the table is registered
    fn table_exists(&self, name: &str) -> bool;

    /// Write a cell at the current time
    fn put(&self, table: &str, row_key: &str, family: &str, column: &str, value: Bytes)
        -> Result<Timestamp>;

    /// Read one row
    fn get(&self, table: &str, row_key: &str, filter: Option<&RowFilter>) -> Result<Option<Row>>;

    /// Range scan merged across shards
    fn scan(
        &self,
        table: &str,
        start_key: &str,
        end_key: Option<&str>,
        filter: Option<&RowFilter>,
        limit: Option<usize>,
    ) -> Result<Vec<Row>>;

    /// Atomic counter increment
    fn increment_counter(
        &self,
        table: &str,
        row_key: &str,
        family: &str,
        column: &str,
        delta: i64,
    ) -> Result<i64>;

    /// Self-reported statistics
    fn stats(&self) -> Result<WideColumnStats>;
}

/// Relational metadata storage with transactions
pub trait TransactionalBackend: Send + Sync {
    /// Register a database
    fn create_database(&self, db_id: &str, schemas: Vec<TableSchema>) -> Result<()>;

    /// Registered database ids
    fn database_ids(&self) -> Vec<String>;

    /// Start a transaction
    fn begin_transaction(&self, db_id: &str, read_only: bool) -> Result<TxnId>;

    /// Run a query
    fn execute_query(&self, db_id: &str, query: &Query, txn_id: Option<TxnId>)
        -> Result<Vec<Record>>;

    /// Buffer or auto-commit mutations
    fn execute_mutation(
        &self,
        db_id: &str,
        mutations: Vec<Mutation>,
        txn_id: Option<TxnId>,
    ) -> Result<Option<Timestamp>>;

    /// Commit a transaction
    fn commit_transaction(&self, txn_id: TxnId) -> Result<Timestamp>;

    /// Abort a transaction
    fn abort_transaction(&self, txn_id: TxnId) -> Result<()>;

    /// Self-reported statistics
    fn stats(&self) -> Result<TransactionalStats>;
}

/// Replicated blob storage
pub trait ObjectBackend: Send + Sync {
    /// Replace (or create) a file
    fn write_file(&self, path: &str, data: Bytes) -> Result<()>;

    /// Read a whole file
    fn read_file(&self, path: &str) -> Result<Bytes>;

    /// Delete a file and its replicas
    fn delete_file(&self, path: &str) -> Result<()>;

    /// True if the file exists
    fn exists(&self, path: &str) -> bool;

    /// Last modification time of a file
    fn modified_at(&self, path: &str) -> Option<Timestamp>;

    /// Paths under `prefix`
    fn list_files(&self, prefix: &str) -> Vec<String>;

    /// Reap unreferenced chunks
    fn collect_garbage(&self) -> Result<GcReport>;

    /// Self-reported statistics
    fn storage_stats(&self) -> Result<StorageStats>;
}

// ============================================================================
// In-process stores
// ============================================================================

impl WideColumnBackend for WideColumnStore {
    fn create_table(&self, name: &str, families: &[&str]) -> Result<()> {
        WideColumnStore::create_table(self, name, families)
    }

    fn table_exists(&self, name: &str) -> bool {
        WideColumnStore::table_exists(self, name)
    }

    fn put(
        &self,
        table: &str,
        row_key: &str,
        family: &str,
        column: &str,
        value: Bytes,
    ) -> Result<Timestamp> {
        WideColumnStore::put(self, table, row_key, family, column, value, None)
    }

    fn get(&self, table: &str, row_key: &str, filter: Option<&RowFilter>) -> Result<Option<Row>> {
        WideColumnStore::get(self, table, row_key, filter)
    }

    fn scan(
        &self,
        table: &str,
        start_key: &str,
        end_key: Option<&str>,
        filter: Option<&RowFilter>,
        limit: Option<usize>,
    ) -> Result<Vec<Row>> {
        WideColumnStore::scan(self, table, start_key, end_key, filter, limit)
    }

    fn increment_counter(
        &self,
        table: &str,
        row_key: &str,
        family: &str,
        column: &str,
        delta: i64,
    ) -> Result<i64> {
        WideColumnStore::increment_counter(self, table, row_key, family, column, delta)
    }

    fn stats(&self) -> Result<WideColumnStats> {
        Ok(WideColumnStore::stats(self))
    }
}

impl TransactionalBackend for TransactionalStore {
    fn create_database(&self, db_id: &str, schemas: Vec<TableSchema>) -> Result<()> {
        TransactionalStore::create_database(self, db_id, schemas)
    }

    fn database_ids(&self) -> Vec<String> {
        TransactionalStore::database_ids(self)
    }

    fn begin_transaction(&self, db_id: &str, read_only: bool) -> Result<TxnId> {
        TransactionalStore::begin_transaction(self, db_id, read_only)
    }

    fn execute_query(
        &self,
        db_id: &str,
        query: &Query,
        txn_id: Option<TxnId>,
    ) -> Result<Vec<Record>> {
        TransactionalStore::execute_query(self, db_id, query, txn_id)
    }

    fn execute_mutation(
        &self,
        db_id: &str,
        mutations: Vec<Mutation>,
        txn_id: Option<TxnId>,
    ) -> Result<Option<Timestamp>> {
        TransactionalStore::execute_mutation(self, db_id, mutations, txn_id)
    }

    fn commit_transaction(&self, txn_id: TxnId) -> Result<Timestamp> {
        TransactionalStore::commit_transaction(self, txn_id)
    }

    fn abort_transaction(&self, txn_id: TxnId) -> Result<()> {
        TransactionalStore::abort_transaction(self, txn_id)
    }

    fn stats(&self) -> Result<TransactionalStats> {
        Ok(TransactionalStore::stats(self))
    }
}

impl ObjectBackend for ObjectStore {
    fn write_file(&self, path: &str, data: Bytes) -> Result<()> {
        ObjectStore::write_file(self, path, data).map(|_| ())
    }

    fn read_file(&self, path: &str) -> Result<Bytes> {
        ObjectStore::read_file(self, path)
    }

    fn delete_file(&self, path: &str) -> Result<()> {
        ObjectStore::delete_file(self, path)
    }

    fn exists(&self, path: &str) -> bool {
        ObjectStore::exists(self, path)
    }

    fn modified_at(&self, path: &str) -> Option<Timestamp> {
        self.file_info(path).map(|info| info.file.modified_at)
    }

    fn list_files(&self, prefix: &str) -> Vec<String> {
        ObjectStore::list_files(self, prefix)
    }

    fn collect_garbage(&self) -> Result<GcReport> {
        Ok(ObjectStore::collect_garbage(self))
    }

    fn storage_stats(&self) -> Result<StorageStats> {
        Ok(ObjectStore::storage_stats(self))
    }
}
