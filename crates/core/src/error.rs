//! Error types for the storage core
//!
//! Every store surfaces the same error enum so the coordinator can reason
//! about failures without knowing which layer produced them.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! Each variant belongs to exactly one [`ErrorKind`]:
//!
//! - `NotFound`: table, row, database, transaction, file or chunk absent
//! - `Conflict`: lock conflict, duplicate creation, transaction state clash
//! - `Corruption`: checksum mismatch or no verifiable replica left
//! - `Unavailable`: a shard or chunk holder cannot be reached
//! - `InvalidInput`: schema violation, bad argument, malformed counter
//! - `Timeout`: a bounded wait expired
//! - `Internal`: everything else (I/O, configuration)

use std::io;
use thiserror::Error;

/// Result type alias for storage operations
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse failure classification used by callers to decide how to react
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The addressed entity does not exist
    NotFound,
    /// Another operation holds the resource or it already exists
    Conflict,
    /// Stored bytes failed verification
    Corruption,
    /// A shard, holder or store could not be reached
    Unavailable,
    /// The request itself is malformed
    InvalidInput,
    /// A bounded wait expired
    Timeout,
    /// Unexpected internal failure
    Internal,
}

/// Error types for the storage core
#[derive(Debug, Error)]
pub enum Error {
    // ------------------------------------------------------------------
    // Wide-column store
    // ------------------------------------------------------------------
    /// Table is not registered
    #[error("table not found: {0}")]
    TableNotFound(String),

    /// Table is already registered
    #[error("table already exists: {0}")]
    TableExists(String),

    /// Column family was not declared when the table was created
    #[error("column family '{family}' not found in table '{table}'")]
    FamilyNotFound {
        /// Table name
        table: String,
        /// Requested family
        family: String,
    },

    /// Shard is currently not serving requests
    #[error("shard {shard} is unavailable")]
    ShardUnavailable {
        /// Shard index
        shard: usize,
    },

    // ------------------------------------------------------------------
    // Transactional store
    // ------------------------------------------------------------------
    /// Database id is not registered
    #[error("database not found: {0}")]
    DatabaseNotFound(String),

    /// Database id is already registered
    #[error("database already exists: {0}")]
    DatabaseExists(String),

    /// Row does not exist at the time the mutation is applied
    #[error("row not found in {table}: {key}")]
    RowNotFound {
        /// Table name
        table: String,
        /// Rendered primary key
        key: String,
    },

    /// Row already exists and the mutation requires it to be absent
    #[error("row already exists in {table}: {key}")]
    RowExists {
        /// Table name
        table: String,
        /// Rendered primary key
        key: String,
    },

    /// Unknown transaction id
    #[error("transaction not found: {0}")]
    TransactionNotFound(u64),

    /// Transaction is not in a state that allows the requested operation
    #[error("transaction {txn_id} is not active: {state}")]
    TransactionNotActive {
        /// Transaction id
        txn_id: u64,
        /// Current state, rendered
        state: String,
    },

    /// Transaction aborted, carrying the reason
    #[error("transaction {txn_id} aborted: {reason}")]
    TransactionAborted {
        /// Transaction id
        txn_id: u64,
        /// Human-readable reason
        reason: String,
    },

    /// A row lock is held by another transaction
    #[error("lock conflict on {table}:{key} (held by transaction {holder})")]
    LockConflict {
        /// Table name
        table: String,
        /// Rendered primary key
        key: String,
        /// Transaction currently holding the lock
        holder: u64,
    },

    /// Row does not match the table schema
    #[error("schema violation in {table}: {message}")]
    SchemaViolation {
        /// Table name
        table: String,
        /// What is wrong
        message: String,
    },

    // ------------------------------------------------------------------
    // Object store
    // ------------------------------------------------------------------
    /// File metadata is absent
    #[error("file not found: {0}")]
    FileNotFound(String),

    /// File metadata already exists
    #[error("file already exists: {0}")]
    FileExists(String),

    /// Chunk is not stored on the addressed holder
    #[error("chunk {chunk_id} not found on {holder}")]
    ChunkNotFound {
        /// Chunk id
        chunk_id: String,
        /// Holder id
        holder: String,
    },

    /// Stored bytes do not hash to the recorded checksum
    #[error("checksum mismatch for chunk {chunk_id}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Chunk id
        chunk_id: String,
        /// Recorded checksum
        expected: String,
        /// Computed checksum
        actual: String,
    },

    /// Every replica of a chunk failed to serve verified bytes
    #[error("no valid replica for chunk {chunk_id}")]
    NoValidReplica {
        /// Chunk id
        chunk_id: String,
    },

    /// Chunk holder is offline or refused the request
    #[error("chunk holder unavailable: {0}")]
    HolderUnavailable(String),

    // ------------------------------------------------------------------
    // Shared
    // ------------------------------------------------------------------
    /// Generic not-found for coordinator-level entities (videos, users)
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity kind ("video", "user", ...)
        entity: &'static str,
        /// Identifier
        id: String,
    },

    /// Bounded wait expired
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// Store reported itself unreachable
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Invalid argument
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Configuration could not be loaded or is inconsistent
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error (configuration files)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Unexpected internal failure
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an `InvalidInput` error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Error::InvalidInput(message.into())
    }

    /// Create an `Internal` error
    pub fn internal(message: impl Into<String>) -> Self {
        Error::Internal(message.into())
    }

    /// Create a `NotFound` error for a coordinator-level entity
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Error::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Create a `SchemaViolation` error
    pub fn schema(table: impl Into<String>, message: impl Into<String>) -> Self {
        Error::SchemaViolation {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::TableNotFound(_)
            | Error::FamilyNotFound { .. }
            | Error::DatabaseNotFound(_)
            | Error::RowNotFound { .. }
            | Error::TransactionNotFound(_)
            | Error::FileNotFound(_)
            | Error::ChunkNotFound { .. }
            | Error::NotFound { .. } => ErrorKind::NotFound,

            Error::TableExists(_)
            | Error::DatabaseExists(_)
            | Error::RowExists { .. }
            | Error::TransactionNotActive { .. }
            | Error::TransactionAborted { .. }
            | Error::LockConflict { .. }
            | Error::FileExists(_) => ErrorKind::Conflict,

            Error::ChecksumMismatch { .. } | Error::NoValidReplica { .. } => {
                ErrorKind::Corruption
            }

            Error::ShardUnavailable { .. } | Error::HolderUnavailable(_) | Error::Unavailable(_) => {
                ErrorKind::Unavailable
            }

            Error::SchemaViolation { .. } | Error::InvalidInput(_) => ErrorKind::InvalidInput,

            Error::Timeout(_) => ErrorKind::Timeout,

            Error::Config(_) | Error::Io(_) | Error::Internal(_) => ErrorKind::Internal,
        }
    }

    /// True for any not-found variant
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// True for lock conflicts and other contention failures
    pub fn is_conflict(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }

    /// True when the failure is worth retrying unchanged
    ///
    /// Lock conflicts, timeouts and unreachable components are transient;
    /// schema violations and missing entities are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::LockConflict { .. }
                | Error::Timeout(_)
                | Error::ShardUnavailable { .. }
                | Error::HolderUnavailable(_)
                | Error::Unavailable(_)
        )
    }
}
