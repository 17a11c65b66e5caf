//! Chunked object store for StreamVault
//!
//! Large binary payloads (videos, streaming segments, thumbnails) are split
//! into fixed-size chunks, each checksummed with SHA-256 and replicated
//! across chunk holders chosen by a pluggable placement policy.
//!
//! # Example
//!
//! ```
//! use streamvault_objects::{ObjectStore, ObjectStoreConfig};
//!
//! let store = ObjectStore::new(ObjectStoreConfig::default().with_chunk_size(1024))?;
//! let path = store.store_video("v1", vec![7u8; 3000])?;
//! assert_eq!(path, "/videos/v1.mp4");
//! assert_eq!(store.get_video("v1")?.len(), 3000);
//! assert_eq!(store.file_info(&path).unwrap().chunks.len(), 3);
//! # Ok::<(), streamvault_core::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod checksum;
pub mod config;
pub mod holder;
pub mod metadata;
pub mod placement;
pub mod store;

pub use checksum::{compute_checksum, verify_checksum};
pub use config::ObjectStoreConfig;
pub use holder::{ChunkHolder, HolderStats, MemoryChunkHolder};
pub use metadata::{ChunkMeta, FileInfo, FileMeta, Replica, ReplicaStatus};
pub use placement::{PlacementKind, PlacementPolicy, RandomPlacement, ZoneAwarePlacement};
pub use store::{
    chunk_count, segment_path, thumbnail_path, video_path, GcReport, ObjectStore, RepairReport,
    StorageStats,
};
