//! StreamVault storage engine
//!
//! This crate wires the three stores into platform workflows:
//! - Config: one `streamvault.toml` for every store
//! - Backends: trait seams the coordinator reaches each store through
//! - Coordinator: uploads, watch events, recommendations, analytics,
//!   search and health
//! - Reconciliation: cleanup of cross-store leftovers
//!
//! # Example
//!
//! ```
//! use bytes::Bytes;
//! use streamvault_engine::{StorageCoordinator, StreamVaultConfig, VideoUpload};
//!
//! let coordinator = StorageCoordinator::from_config(&StreamVaultConfig::default())?;
//! coordinator.bootstrap()?;
//! coordinator.upload_video(VideoUpload {
//!     video_id: "v1".into(),
//!     creator_id: "u1".into(),
//!     title: "Intro to Rust".into(),
//!     description: "Ownership in ten minutes".into(),
//!     duration: 600,
//!     category: "education".into(),
//!     tags: vec!["rust".into()],
//!     video: Bytes::from_static(b"frames"),
//!     thumbnail: None,
//! })?;
//! assert_eq!(coordinator.get_video("v1")?.data, Bytes::from_static(b"frames"));
//! # Ok::<(), streamvault_core::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod config;
pub mod coordinator;
pub mod models;
pub mod reconcile;
pub mod schemas;

pub use backend::{ObjectBackend, TransactionalBackend, WideColumnBackend};
pub use config::{StreamVaultConfig, CONFIG_FILE_NAME, DEFAULT_DATABASE_ID};
pub use coordinator::StorageCoordinator;
pub use models::{
    AnalyticsDashboard, DailyActivity, HealthStatus, NewUser, ReconciliationReport, ScoredVideo,
    StoreHealth, StoredVideo, SystemHealth, UploadReceipt, UserProfile, VideoMetadata,
    VideoMetrics, VideoUpload, WatchHistoryEntry, WriteReport,
};
pub use schemas::platform_schemas;
