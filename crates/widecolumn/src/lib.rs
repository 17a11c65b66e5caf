//! Sharded wide-column store
//!
//! Rows are addressed by string keys inside named tables, grouped into
//! column families, and every cell keeps timestamped versions. Keys are
//! routed to a fixed set of shards by a pluggable [`ShardRouter`].
//!
//! # Example
//!
//! ```
//! use streamvault_widecolumn::{RowFilter, WideColumnStore};
//!
//! let store = WideColumnStore::default();
//! store.create_table("video_metrics", &["metrics"]).unwrap();
//! store.put("video_metrics", "v1", "metrics", "views", "0", None).unwrap();
//! store.increment_counter("video_metrics", "v1", "metrics", "views", 1).unwrap();
//!
//! let row = store.get("video_metrics", "v1", Some(&RowFilter::latest())).unwrap().unwrap();
//! assert_eq!(row.latest_str("metrics", "views"), Some("1"));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cell;
pub mod config;
pub mod filter;
pub mod mutation;
pub mod routing;
mod shard;
pub mod store;

pub use cell::{Cell, ColumnMap, Row};
pub use config::WideColumnConfig;
pub use filter::{RowFilter, TimestampRange};
pub use mutation::{MutateRowsReport, Mutation, RowMutation, ShardFailure};
pub use routing::{HashRouter, RangeRouter, ShardRouter};
pub use store::{ShardAssignment, TableInfo, WideColumnStats, WideColumnStore};
