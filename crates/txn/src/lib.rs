//! Transactional store for StreamVault
//!
//! Schema-typed relational tables with multi-version concurrency control,
//! snapshot reads and two-phase commit ordered by a global clock.
//!
//! # Example
//!
//! ```
//! use streamvault_txn::{ColumnDef, ColumnType, Mutation, Query, TableSchema, TransactionalStore};
//!
//! let store = TransactionalStore::default();
//! store.create_database("main", vec![
//!     TableSchema::new("Users")
//!         .column(ColumnDef::new("user_id", ColumnType::string(36)).not_null())
//!         .column(ColumnDef::new("username", ColumnType::string(50)).not_null())
//!         .primary_key(&["user_id"]),
//! ])?;
//!
//! let txn = store.begin_transaction("main", false)?;
//! store.execute_mutation(
//!     "main",
//!     vec![Mutation::insert("Users", [("user_id", "u1"), ("username", "alice")])],
//!     Some(txn),
//! )?;
//! store.commit_transaction(txn)?;
//!
//! let rows = store.execute_query("main", &Query::table("Users"), None)?;
//! assert_eq!(rows.len(), 1);
//! # Ok::<(), streamvault_core::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod database;
pub mod locks;
pub mod mutation;
pub mod query;
pub mod schema;
pub mod store;
pub mod table;
pub mod transaction;

pub use config::TransactionalConfig;
pub use database::{Database, DatabaseCounts};
pub use locks::{LockKey, LockTable};
pub use mutation::{Assignment, Mutation};
pub use query::{CompareOp, Predicate, Query, SortOrder};
pub use schema::{ColumnDef, ColumnType, Row, RowKey, TableSchema};
pub use store::{TransactionalStats, TransactionalStore};
pub use table::{RowVersion, RowVersions, VersionedTable};
pub use transaction::{Transaction, TransactionStatus, TxnId};
