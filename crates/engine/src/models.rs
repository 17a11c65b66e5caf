//! Coordinator inputs and results
//!
//! Typed views over the platform tables. Transactional rows are converted
//! through `from_record`, which reports a schema error naming the table
//! when a stored row lacks a required column.

use bytes::Bytes;
use chrono::NaiveDate;
use streamvault_core::{Error, Result, Timestamp, Value};
use streamvault_objects::{GcReport, StorageStats};
use streamvault_txn::{Row as Record, TransactionalStats};
use streamvault_widecolumn::WideColumnStats;

use crate::schemas::{USERS, VIDEOS, WATCH_HISTORY};

// ============================================================================
// Record helpers
// ============================================================================

fn required<'a>(record: &'a Record, table: &str, column: &str) -> Result<&'a Value> {
    match record.get(column) {
        Some(value) if !value.is_null() => Ok(value),
        _ => Err(Error::schema(table, format!("stored row has no {}", column))),
    }
}

fn required_str(record: &Record, table: &str, column: &str) -> Result<String> {
    required(record, table, column)?
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| Error::schema(table, format!("{} is not a string", column)))
}

fn required_int(record: &Record, table: &str, column: &str) -> Result<i64> {
    required(record, table, column)?
        .as_int()
        .ok_or_else(|| Error::schema(table, format!("{} is not an integer", column)))
}

fn required_ts(record: &Record, table: &str, column: &str) -> Result<Timestamp> {
    required(record, table, column)?
        .as_timestamp()
        .ok_or_else(|| Error::schema(table, format!("{} is not a timestamp", column)))
}

fn optional_str(record: &Record, column: &str) -> Option<String> {
    record.get(column).and_then(Value::as_str).map(str::to_string)
}

fn optional_bool(record: &Record, column: &str) -> bool {
    record.get(column).and_then(Value::as_bool).unwrap_or(false)
}

pub(crate) fn optional_value(value: Option<String>) -> Value {
    value.map(Value::String).unwrap_or(Value::Null)
}

// ============================================================================
// Users
// ============================================================================

/// Input to [`create_user`](crate::StorageCoordinator::create_user)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    /// User id
    pub user_id: String,
    /// Email address
    pub email: String,
    /// Display name
    pub username: String,
    /// Credential hash, stored as given
    pub password_hash: String,
    /// Given name
    pub first_name: Option<String>,
    /// Family name
    pub last_name: Option<String>,
}

impl NewUser {
    /// User with the required fields only
    pub fn new(user_id: &str, email: &str, username: &str, password_hash: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            email: email.to_string(),
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            first_name: None,
            last_name: None,
        }
    }
}

/// Stored user profile (the credential hash is never returned)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    /// User id
    pub user_id: String,
    /// Email address
    pub email: String,
    /// Display name
    pub username: String,
    /// Given name
    pub first_name: Option<String>,
    /// Family name
    pub last_name: Option<String>,
    /// Creation time
    pub created_at: Timestamp,
    /// Last update time
    pub updated_at: Timestamp,
    /// `FREE` unless changed
    pub subscription_tier: String,
    /// Email verified
    pub is_verified: bool,
}

impl UserProfile {
    /// Convert a `Users` row
    pub fn from_record(record: &Record) -> Result<Self> {
        Ok(Self {
            user_id: required_str(record, USERS, "user_id")?,
            email: required_str(record, USERS, "email")?,
            username: required_str(record, USERS, "username")?,
            first_name: optional_str(record, "first_name"),
            last_name: optional_str(record, "last_name"),
            created_at: required_ts(record, USERS, "created_at")?,
            updated_at: required_ts(record, USERS, "updated_at")?,
            subscription_tier: optional_str(record, "subscription_tier")
                .unwrap_or_else(|| "FREE".to_string()),
            is_verified: optional_bool(record, "is_verified"),
        })
    }
}

// ============================================================================
// Videos
// ============================================================================

/// Input to [`upload_video`](crate::StorageCoordinator::upload_video)
#[derive(Debug, Clone, PartialEq)]
pub struct VideoUpload {
    /// Video id
    pub video_id: String,
    /// Uploading user
    pub creator_id: String,
    /// Title
    pub title: String,
    /// Free-form description
    pub description: String,
    /// Length in seconds
    pub duration: i64,
    /// Category used for recommendations
    pub category: String,
    /// Tags
    pub tags: Vec<String>,
    /// Encoded video payload
    pub video: Bytes,
    /// Optional thumbnail image
    pub thumbnail: Option<Bytes>,
}

/// Where an upload landed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    /// Object path of the video payload
    pub video_path: String,
    /// Object path of the thumbnail, if one was uploaded
    pub thumbnail_path: Option<String>,
    /// Commit timestamp of the metadata row
    pub commit_ts: Timestamp,
    /// Best-effort writes that failed
    pub secondary_failures: Vec<String>,
}

/// A `Videos` row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoMetadata {
    /// Video id
    pub video_id: String,
    /// Uploading user
    pub creator_id: String,
    /// Title
    pub title: String,
    /// Description
    pub description: Option<String>,
    /// Length in seconds
    pub duration: i64,
    /// Object path of the payload
    pub file_path: Option<String>,
    /// Object path of the thumbnail
    pub thumbnail_path: Option<String>,
    /// Category
    pub category: Option<String>,
    /// Tags
    pub tags: Vec<String>,
    /// Committed views
    pub view_count: i64,
    /// Likes
    pub like_count: i64,
    /// Upload time
    pub upload_date: Timestamp,
    /// Processing status
    pub status: String,
    /// Premium-only content
    pub is_premium: bool,
}

impl VideoMetadata {
    /// Convert a `Videos` row
    pub fn from_record(record: &Record) -> Result<Self> {
        let tags = record
            .get("tags")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Ok(Self {
            video_id: required_str(record, VIDEOS, "video_id")?,
            creator_id: required_str(record, VIDEOS, "creator_id")?,
            title: required_str(record, VIDEOS, "title")?,
            description: optional_str(record, "description"),
            duration: required_int(record, VIDEOS, "duration")?,
            file_path: optional_str(record, "file_path"),
            thumbnail_path: optional_str(record, "thumbnail_path"),
            category: optional_str(record, "category"),
            tags,
            view_count: record.get("view_count").and_then(Value::as_int).unwrap_or(0),
            like_count: record.get("like_count").and_then(Value::as_int).unwrap_or(0),
            upload_date: required_ts(record, VIDEOS, "upload_date")?,
            status: optional_str(record, "status").unwrap_or_else(|| "PROCESSING".to_string()),
            is_premium: optional_bool(record, "is_premium"),
        })
    }
}

/// Metadata joined with the payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredVideo {
    /// `Videos` row
    pub metadata: VideoMetadata,
    /// Payload bytes
    pub data: Bytes,
}

// ============================================================================
// Watch events
// ============================================================================

/// Outcome of a write that touches a primary and secondary stores
///
/// The primary write either committed (`commit_ts`) or the whole call
/// failed. Secondary writes are best-effort and each failure is listed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReport {
    /// Commit timestamp of the primary write
    pub commit_ts: Timestamp,
    /// Failed secondary writes, one line each
    pub secondary_failures: Vec<String>,
}

impl WriteReport {
    /// True if every secondary write landed
    pub fn is_complete(&self) -> bool {
        self.secondary_failures.is_empty()
    }
}

/// A `WatchHistory` row
#[derive(Debug, Clone, PartialEq)]
pub struct WatchHistoryEntry {
    /// Viewer
    pub user_id: String,
    /// Video watched
    pub video_id: String,
    /// Event time
    pub timestamp: Timestamp,
    /// Seconds watched
    pub watch_time: i64,
    /// Fraction of the video watched
    pub completion_rate: Option<f64>,
    /// Device class
    pub device_type: Option<String>,
}

impl WatchHistoryEntry {
    /// Convert a `WatchHistory` row
    pub fn from_record(record: &Record) -> Result<Self> {
        Ok(Self {
            user_id: required_str(record, WATCH_HISTORY, "user_id")?,
            video_id: required_str(record, WATCH_HISTORY, "video_id")?,
            timestamp: required_ts(record, WATCH_HISTORY, "timestamp")?,
            watch_time: required_int(record, WATCH_HISTORY, "watch_time")?,
            completion_rate: record.get("completion_rate").and_then(Value::as_f64),
            device_type: optional_str(record, "device_type"),
        })
    }
}

// ============================================================================
// Recommendations, search, analytics
// ============================================================================

/// A video with a combined relevance score
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredVideo {
    /// Video id
    pub video_id: String,
    /// Higher ranks first
    pub score: f64,
}

/// Counters kept in `video_metrics`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VideoMetrics {
    /// Video id
    pub video_id: String,
    /// View counter
    pub views: i64,
    /// Seconds watched across all viewers
    pub total_watch_time: i64,
}

/// One day of watch activity
#[derive(Debug, Clone, PartialEq)]
pub struct DailyActivity {
    /// UTC date
    pub date: NaiveDate,
    /// Distinct viewers
    pub active_users: usize,
    /// Watch events
    pub views: usize,
    /// Seconds watched
    pub watch_time: i64,
    /// Mean seconds per event
    pub avg_watch_time: f64,
}

/// Aggregates over a date range
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyticsDashboard {
    /// First day (inclusive)
    pub start: NaiveDate,
    /// Last day (inclusive)
    pub end: NaiveDate,
    /// Days with activity, oldest first
    pub daily: Vec<DailyActivity>,
    /// Distinct viewers over the range
    pub unique_users: usize,
    /// Watch events over the range
    pub total_views: usize,
    /// Seconds watched over the range
    pub total_watch_time: i64,
    /// Up to 10 videos by view counter
    pub top_videos: Vec<VideoMetrics>,
}

// ============================================================================
// Health
// ============================================================================

/// Store status, ordered from best to worst
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HealthStatus {
    /// Fully operational
    Healthy,
    /// Serving with reduced capacity
    Degraded,
    /// Unreachable
    Unhealthy,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
        };
        write!(f, "{}", s)
    }
}

/// Status of one store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreHealth<S> {
    /// Derived status
    pub status: HealthStatus,
    /// Self-reported statistics, absent when unreachable
    pub stats: Option<S>,
    /// Why the store is not healthy
    pub detail: Option<String>,
}

impl<S> StoreHealth<S> {
    /// Healthy or degraded store with stats
    pub fn reporting(stats: S, degraded: Option<String>) -> Self {
        Self {
            status: if degraded.is_some() {
                HealthStatus::Degraded
            } else {
                HealthStatus::Healthy
            },
            stats: Some(stats),
            detail: degraded,
        }
    }

    /// Store that could not be reached
    pub fn unreachable(error: &Error) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            stats: None,
            detail: Some(error.to_string()),
        }
    }
}

/// Aggregated health of every store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemHealth {
    /// Worst status across stores
    pub overall: HealthStatus,
    /// Wide-column store
    pub wide_column: StoreHealth<WideColumnStats>,
    /// Transactional store
    pub transactional: StoreHealth<TransactionalStats>,
    /// Object store
    pub objects: StoreHealth<StorageStats>,
}

impl SystemHealth {
    /// Combine per-store reports
    pub fn new(
        wide_column: StoreHealth<WideColumnStats>,
        transactional: StoreHealth<TransactionalStats>,
        objects: StoreHealth<StorageStats>,
    ) -> Self {
        let overall = wide_column
            .status
            .max(transactional.status)
            .max(objects.status);
        Self {
            overall,
            wide_column,
            transactional,
            objects,
        }
    }
}

// ============================================================================
// Reconciliation
// ============================================================================

/// What a reconciliation pass cleaned up
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationReport {
    /// Blob paths deleted because no metadata row refers to them
    pub orphan_blobs: Vec<String>,
    /// Video ids whose metadata row was deleted because the blob is gone
    pub dangling_videos: Vec<String>,
    /// Chunk garbage collection that followed
    pub gc: GcReport,
}

impl ReconciliationReport {
    /// True if nothing needed fixing
    pub fn is_clean(&self) -> bool {
        self.orphan_blobs.is_empty() && self.dangling_videos.is_empty()
    }
}
