//! StreamVault - layered storage core for a video platform
//!
//! Three stores sit under one coordinator:
//!
//! - a sharded wide-column store for watch events, counters and indexes
//! - a transactional store (MVCC snapshots, two-phase commit) for users,
//!   videos and watch history
//! - a chunked, replicated object store for video payloads and thumbnails
//!
//! The rest of the platform talks to [`StorageCoordinator`] only.
//!
//! # Quick Start
//!
//! ```
//! use streamvault::{NewUser, StorageCoordinator, StreamVaultConfig};
//!
//! let coordinator = StorageCoordinator::from_config(&StreamVaultConfig::default())?;
//! coordinator.bootstrap()?;
//! coordinator.create_user(NewUser::new("u1", "ada@example.com", "ada", "hash"))?;
//! assert!(coordinator.get_user_profile("u1")?.is_some());
//! # Ok::<(), streamvault::Error>(())
//! ```

pub use streamvault_core::{Error, ErrorKind, Result, Timestamp};
pub use streamvault_engine::*;
