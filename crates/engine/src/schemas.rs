//! Platform table layout
//!
//! Names and column families of the wide-column tables, and typed schemas
//! of the transactional tables, created by
//! [`StorageCoordinator::bootstrap`](crate::StorageCoordinator::bootstrap).

use streamvault_txn::{ColumnDef, ColumnType, TableSchema};

// ============================================================================
// Wide-column tables
// ============================================================================

/// Per-user watch events, keyed `{user}#{ts}#{video}`
pub const USER_WATCH_HISTORY: &str = "user_watch_history";
/// Per-video counters, keyed by video id
pub const VIDEO_METRICS: &str = "video_metrics";
/// Precomputed recommendations, keyed `{user}#{video}`
pub const USER_RECOMMENDATIONS: &str = "user_recommendations";
/// Inverted search index, keyed `{term}#{video}`
pub const SEARCH_INDEX: &str = "search_index";

/// Every wide-column table with its column families
pub const WIDE_TABLES: &[(&str, &[&str])] = &[
    (USER_WATCH_HISTORY, &["watch", "metadata"]),
    (VIDEO_METRICS, &["metrics", "analytics"]),
    (USER_RECOMMENDATIONS, &["recommendations", "scores", "metadata"]),
    (SEARCH_INDEX, &["terms", "scores"]),
];

// ============================================================================
// Transactional tables
// ============================================================================

/// User profiles
pub const USERS: &str = "Users";
/// Video metadata
pub const VIDEOS: &str = "Videos";
/// Relational watch log
pub const WATCH_HISTORY: &str = "WatchHistory";
/// Subscription records
pub const SUBSCRIPTIONS: &str = "Subscriptions";

fn id() -> ColumnType {
    ColumnType::string(36)
}

/// Schemas of the platform database
pub fn platform_schemas() -> Vec<TableSchema> {
    vec![
        TableSchema::new(USERS)
            .column(ColumnDef::new("user_id", id()).not_null())
            .column(ColumnDef::new("email", ColumnType::string(255)).not_null())
            .column(ColumnDef::new("username", ColumnType::string(50)).not_null())
            .column(ColumnDef::new("password_hash", ColumnType::string(255)).not_null())
            .column(ColumnDef::new("first_name", ColumnType::string(100)))
            .column(ColumnDef::new("last_name", ColumnType::string(100)))
            .column(ColumnDef::new("created_at", ColumnType::Timestamp).not_null())
            .column(ColumnDef::new("updated_at", ColumnType::Timestamp).not_null())
            .column(ColumnDef::new("subscription_tier", ColumnType::string(20)).default_value("FREE"))
            .column(ColumnDef::new("is_verified", ColumnType::Bool).default_value(false))
            .primary_key(&["user_id"]),
        TableSchema::new(VIDEOS)
            .column(ColumnDef::new("video_id", id()).not_null())
            .column(ColumnDef::new("creator_id", id()).not_null())
            .column(ColumnDef::new("title", ColumnType::string(500)).not_null())
            .column(ColumnDef::new("description", ColumnType::text()))
            .column(ColumnDef::new("duration", ColumnType::Int64).not_null())
            .column(ColumnDef::new("file_path", ColumnType::string(1000)))
            .column(ColumnDef::new("thumbnail_path", ColumnType::string(1000)))
            .column(ColumnDef::new("category", ColumnType::string(50)))
            .column(ColumnDef::new("tags", ColumnType::array(ColumnType::string(50))))
            .column(ColumnDef::new("view_count", ColumnType::Int64).default_value(0i64))
            .column(ColumnDef::new("like_count", ColumnType::Int64).default_value(0i64))
            .column(ColumnDef::new("upload_date", ColumnType::Timestamp).not_null())
            .column(ColumnDef::new("status", ColumnType::string(20)).default_value("PROCESSING"))
            .column(ColumnDef::new("is_premium", ColumnType::Bool).default_value(false))
            .primary_key(&["video_id"]),
        TableSchema::new(WATCH_HISTORY)
            .column(ColumnDef::new("user_id", id()).not_null())
            .column(ColumnDef::new("video_id", id()).not_null())
            .column(ColumnDef::new("timestamp", ColumnType::Timestamp).not_null())
            .column(ColumnDef::new("watch_time", ColumnType::Int64).not_null())
            .column(ColumnDef::new("completion_rate", ColumnType::Float64))
            .column(ColumnDef::new("device_type", ColumnType::string(20)))
            .column(ColumnDef::new("session_id", id()))
            .primary_key(&["user_id", "video_id", "timestamp"]),
        TableSchema::new(SUBSCRIPTIONS)
            .column(ColumnDef::new("subscription_id", id()).not_null())
            .column(ColumnDef::new("user_id", id()).not_null())
            .column(ColumnDef::new("tier", ColumnType::string(20)).not_null())
            .column(ColumnDef::new("start_date", ColumnType::Timestamp).not_null())
            .column(ColumnDef::new("end_date", ColumnType::Timestamp))
            .column(ColumnDef::new("is_active", ColumnType::Bool).default_value(true))
            .column(ColumnDef::new("payment_method", ColumnType::string(50)))
            .primary_key(&["subscription_id"]),
    ]
}
