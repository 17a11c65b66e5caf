//! Core types shared by every StreamVault store
//!
//! This crate defines the foundational types used throughout the system:
//! - Error: one error taxonomy for all stores, classified by `ErrorKind`
//! - Timestamp: microseconds since the Unix epoch
//! - GlobalClock: monotonic commit timestamps with an uncertainty window
//! - Deadline: bound on scans and replication fan-out
//! - Value / KeyPart: dynamic column values and primary-key components

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod clock;
pub mod deadline;
pub mod error;
pub mod timestamp;
pub mod value;

pub use clock::{GlobalClock, TimeInterval};
pub use deadline::Deadline;
pub use error::{Error, ErrorKind, Result};
pub use timestamp::Timestamp;
pub use value::{KeyPart, Value};
