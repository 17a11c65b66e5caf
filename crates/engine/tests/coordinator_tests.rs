//! Storage Coordinator Integration Tests
//!
//! Drives the platform workflows across real in-process stores, with a
//! wide-column wrapper that can be switched off to simulate an outage:
//!
//! 1. **Bootstrap & users** - idempotent setup, profiles
//! 2. **Videos** - upload ordering, not-found semantics, segments
//! 3. **Watch events** - primary/secondary split, concurrent counters
//! 4. **Recommendations** - relational and content-based scores merged
//! 5. **Analytics & search**
//! 6. **Health** - per-store status and idempotence
//! 7. **Reconciliation** - orphaned blobs and dangling metadata

use bytes::Bytes;
use chrono::NaiveDate;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use streamvault_core::{Error, Result, Timestamp};
use streamvault_engine::{
    HealthStatus, NewUser, StorageCoordinator, VideoUpload, WideColumnBackend,
};
use streamvault_objects::{
    ChunkHolder, MemoryChunkHolder, ObjectStore, ObjectStoreConfig, RandomPlacement,
};
use streamvault_txn::{TransactionalConfig, TransactionalStore};
use streamvault_widecolumn::{Row, RowFilter, WideColumnConfig, WideColumnStats, WideColumnStore};

// ============================================================================
// Test Helpers
// ============================================================================

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Wide-column store that fails every call while `down` is set
struct SwitchableWide {
    inner: WideColumnStore,
    down: AtomicBool,
}

impl SwitchableWide {
    fn check(&self) -> Result<()> {
        if self.down.load(Ordering::SeqCst) {
            Err(Error::Unavailable("wide-column store down".into()))
        } else {
            Ok(())
        }
    }
}

impl WideColumnBackend for SwitchableWide {
    fn create_table(&self, name: &str, families: &[&str]) -> Result<()> {
        self.check()?;
        self.inner.create_table(name, families)
    }

    fn table_exists(&self, name: &str) -> bool {
        self.inner.table_exists(name)
    }

    fn put(
        &self,
        table: &str,
        row_key: &str,
        family: &str,
        column: &str,
        value: Bytes,
    ) -> Result<Timestamp> {
        self.check()?;
        self.inner.put(table, row_key, family, column, value, None)
    }

    fn get(&self, table: &str, row_key: &str, filter: Option<&RowFilter>) -> Result<Option<Row>> {
        self.check()?;
        self.inner.get(table, row_key, filter)
    }

    fn scan(
        &self,
        table: &str,
        start_key: &str,
        end_key: Option<&str>,
        filter: Option<&RowFilter>,
        limit: Option<usize>,
    ) -> Result<Vec<Row>> {
        self.check()?;
        self.inner.scan(table, start_key, end_key, filter, limit)
    }

    fn increment_counter(
        &self,
        table: &str,
        row_key: &str,
        family: &str,
        column: &str,
        delta: i64,
    ) -> Result<i64> {
        self.check()?;
        self.inner
            .increment_counter(table, row_key, family, column, delta)
    }

    fn stats(&self) -> Result<WideColumnStats> {
        self.check()?;
        Ok(self.inner.stats())
    }
}

struct Platform {
    wide: Arc<SwitchableWide>,
    txn: Arc<TransactionalStore>,
    objects: Arc<ObjectStore>,
    holders: Vec<Arc<MemoryChunkHolder>>,
    coordinator: StorageCoordinator,
}

impl Platform {
    fn set_wide_down(&self, down: bool) {
        self.wide.down.store(down, Ordering::SeqCst);
    }
}

fn platform_unbootstrapped() -> Platform {
    init_tracing();
    let wide = Arc::new(SwitchableWide {
        inner: WideColumnStore::new(WideColumnConfig::default()),
        down: AtomicBool::new(false),
    });
    let txn = Arc::new(TransactionalStore::new(
        TransactionalConfig::default().with_lock_timeout(Duration::from_millis(500)),
    ));
    let holders: Vec<Arc<MemoryChunkHolder>> = (0..4)
        .map(|i| {
            Arc::new(MemoryChunkHolder::new(
                format!("chunkserver-{}", i),
                format!("datacenter-{}", i % 2),
            ))
        })
        .collect();
    let objects = Arc::new(
        ObjectStore::with_holders(
            ObjectStoreConfig::default().with_chunk_size(16),
            holders
                .iter()
                .map(|h| Arc::clone(h) as Arc<dyn ChunkHolder>)
                .collect(),
            Box::new(RandomPlacement::seeded(3)),
        )
        .unwrap(),
    );
    let coordinator = StorageCoordinator::new(
        "streamflix",
        wide.clone(),
        txn.clone(),
        objects.clone(),
    );
    Platform {
        wide,
        txn,
        objects,
        holders,
        coordinator,
    }
}

fn platform() -> Platform {
    let p = platform_unbootstrapped();
    p.coordinator.bootstrap().unwrap();
    p
}

fn upload(id: &str, creator: &str, category: &str) -> VideoUpload {
    VideoUpload {
        video_id: id.to_string(),
        creator_id: creator.to_string(),
        title: format!("Video {}", id),
        description: "A test video".to_string(),
        duration: 120,
        category: category.to_string(),
        tags: vec!["test".to_string()],
        video: Bytes::from(vec![7u8; 40]),
        thumbnail: None,
    }
}

fn view_count(p: &Platform, video_id: &str) -> i64 {
    p.coordinator.get_video(video_id).unwrap().metadata.view_count
}

// ============================================================================
// Bootstrap & users
// ============================================================================

mod users {
    use super::*;

    #[test]
    fn bootstrap_is_idempotent() {
        let p = platform();
        p.coordinator.bootstrap().unwrap();
        assert_eq!(p.wide.inner.table_names().len(), 4);
        assert_eq!(p.txn.database_ids(), vec!["streamflix"]);
    }

    #[test]
    fn profile_round_trip() {
        let p = platform();
        let mut user = NewUser::new("u1", "ada@example.com", "ada", "hash");
        user.first_name = Some("Ada".into());
        let report = p.coordinator.create_user(user).unwrap();
        assert!(report.is_complete());

        let profile = p.coordinator.get_user_profile("u1").unwrap().unwrap();
        assert_eq!(profile.username, "ada");
        assert_eq!(profile.first_name.as_deref(), Some("Ada"));
        assert_eq!(profile.last_name, None);
        assert_eq!(profile.subscription_tier, "FREE");
        assert!(!profile.is_verified);

        let seeded = p.wide.inner.get("user_recommendations", "u1", None).unwrap();
        assert!(seeded.unwrap().latest("metadata", "created_at").is_some());
    }

    #[test]
    fn unknown_and_duplicate_users() {
        let p = platform();
        assert!(p.coordinator.get_user_profile("nobody").unwrap().is_none());
        p.coordinator
            .create_user(NewUser::new("u1", "a@x", "a", "h"))
            .unwrap();
        let err = p
            .coordinator
            .create_user(NewUser::new("u1", "b@x", "b", "h"))
            .unwrap_err();
        assert!(matches!(err, Error::RowExists { .. }));
    }
}

// ============================================================================
// Videos
// ============================================================================

mod videos {
    use super::*;

    #[test]
    fn upload_then_get() {
        let p = platform();
        let mut video = upload("v1", "u1", "music");
        video.thumbnail = Some(Bytes::from_static(b"jpeg"));
        let receipt = p.coordinator.upload_video(video).unwrap();
        assert_eq!(receipt.video_path, "/videos/v1.mp4");
        assert_eq!(receipt.thumbnail_path.as_deref(), Some("/thumbnails/v1.jpg"));
        assert!(receipt.secondary_failures.is_empty());

        let stored = p.coordinator.get_video("v1").unwrap();
        assert_eq!(stored.data, Bytes::from(vec![7u8; 40]));
        assert_eq!(stored.metadata.category.as_deref(), Some("music"));
        assert_eq!(stored.metadata.tags, vec!["test"]);
        assert_eq!(stored.metadata.status, "PROCESSING");

        let metrics = p.coordinator.get_video_metrics("v1").unwrap().unwrap();
        assert_eq!(metrics.views, 0);
    }

    #[test]
    fn blob_without_metadata_is_not_found() {
        let p = platform();
        p.objects.store_video("ghost", vec![1u8; 8]).unwrap();
        let err = p.coordinator.get_video("ghost").unwrap_err();
        assert!(matches!(err, Error::NotFound { entity: "video", .. }));
    }

    #[test]
    fn metadata_failure_fails_upload_and_orphans_blob() {
        let p = platform();
        let mut video = upload("v1", "u1", "music");
        video.title = "x".repeat(501);
        let err = p.coordinator.upload_video(video).unwrap_err();
        assert!(matches!(err, Error::SchemaViolation { .. }));
        assert!(p.objects.exists("/videos/v1.mp4"));
        assert!(p.coordinator.get_video("v1").unwrap_err().is_not_found());
    }

    #[test]
    fn duplicate_upload_leaves_original_untouched() {
        let p = platform();
        let mut first = upload("v1", "u1", "music");
        first.video = Bytes::from(vec![1u8; 10]);
        first.thumbnail = Some(Bytes::from(vec![3u8; 4]));
        p.coordinator.upload_video(first).unwrap();

        let mut second = upload("v1", "u2", "gaming");
        second.video = Bytes::from(vec![2u8; 10]);
        second.thumbnail = Some(Bytes::from(vec![4u8; 4]));
        let err = p.coordinator.upload_video(second).unwrap_err();
        assert!(matches!(err, Error::RowExists { .. }));

        // nothing was overwritten, so GC has nothing of the original to reap
        p.coordinator.reconcile().unwrap();
        let stored = p.coordinator.get_video("v1").unwrap();
        assert_eq!(stored.metadata.creator_id, "u1");
        assert_eq!(stored.data, Bytes::from(vec![1u8; 10]));
        assert_eq!(
            p.objects.read_file("/thumbnails/v1.jpg").unwrap(),
            Bytes::from(vec![3u8; 4])
        );
    }

    #[test]
    fn concurrent_uploads_of_one_id_keep_the_winner() {
        let p = Arc::new(platform());
        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = [("u1", 1u8), ("u2", 2u8)]
            .into_iter()
            .map(|(creator, byte)| {
                let p = Arc::clone(&p);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    let mut video = upload("v1", creator, "music");
                    video.video = Bytes::from(vec![byte; 10]);
                    barrier.wait();
                    p.coordinator.upload_video(video).is_ok()
                })
            })
            .collect();
        let succeeded = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(succeeded, 1);

        let stored = p.coordinator.get_video("v1").unwrap();
        let expected = if stored.metadata.creator_id == "u1" { 1u8 } else { 2u8 };
        assert_eq!(stored.data, Bytes::from(vec![expected; 10]));
    }

    #[test]
    fn metrics_seed_is_best_effort() {
        let p = platform();
        p.set_wide_down(true);
        let receipt = p.coordinator.upload_video(upload("v1", "u1", "music")).unwrap();
        assert_eq!(receipt.secondary_failures.len(), 1);
        p.set_wide_down(false);
        assert!(p.coordinator.get_video("v1").is_ok());
        assert!(p.coordinator.get_video_metrics("v1").unwrap().is_none());
    }

    #[test]
    fn segments_and_user_videos() {
        let p = platform();
        p.coordinator.upload_video(upload("v1", "u1", "music")).unwrap();
        p.coordinator.upload_video(upload("v2", "u1", "music")).unwrap();
        p.coordinator.upload_video(upload("v3", "u2", "music")).unwrap();

        let path = p.coordinator.store_video_segment("v1", 0, vec![9u8; 20]).unwrap();
        assert_eq!(path, "/videos/v1/segment_0.ts");
        assert_eq!(
            p.coordinator.get_video_segment("v1", 0).unwrap(),
            Bytes::from(vec![9u8; 20])
        );

        let mine: Vec<String> = p
            .coordinator
            .get_user_videos("u1")
            .unwrap()
            .into_iter()
            .map(|v| v.video_id)
            .collect();
        assert_eq!(mine, vec!["v2", "v1"]);
    }
}

// ============================================================================
// Watch events
// ============================================================================

mod watch_events {
    use super::*;

    #[test]
    fn event_updates_every_store() {
        let p = platform();
        p.coordinator.upload_video(upload("v1", "u9", "music")).unwrap();
        for watch_time in [100, 50, 30] {
            let report = p
                .coordinator
                .record_watch_event("u1", "v1", watch_time, "mobile")
                .unwrap();
            assert!(report.is_complete());
        }

        assert_eq!(view_count(&p, "v1"), 3);
        let metrics = p.coordinator.get_video_metrics("v1").unwrap().unwrap();
        assert_eq!(metrics.views, 3);
        assert_eq!(metrics.total_watch_time, 180);

        let history = p.coordinator.get_user_watch_history("u1", 10).unwrap();
        let times: Vec<i64> = history.iter().map(|h| h.watch_time).collect();
        assert_eq!(times, vec![30, 50, 100]);
        assert_eq!(history[0].device_type.as_deref(), Some("mobile"));

        let rows = p
            .wide
            .inner
            .scan("user_watch_history", "u1#", Some("u1$"), None, None)
            .unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2].latest_str("watch", "watch_time"), Some("30"));
    }

    #[test]
    fn unknown_video_fails_before_analytics() {
        let p = platform();
        let err = p
            .coordinator
            .record_watch_event("u1", "missing", 10, "tv")
            .unwrap_err();
        assert!(matches!(err, Error::RowNotFound { .. }));
        assert!(p.coordinator.get_user_watch_history("u1", 10).unwrap().is_empty());
        assert!(p.coordinator.get_video_metrics("missing").unwrap().is_none());
    }

    #[test]
    fn analytics_outage_is_reported_not_raised() {
        let p = platform();
        p.coordinator.upload_video(upload("v1", "u9", "music")).unwrap();
        p.set_wide_down(true);
        let report = p
            .coordinator
            .record_watch_event("u1", "v1", 10, "web")
            .unwrap();
        assert_eq!(report.secondary_failures.len(), 3);
        assert!(report.secondary_failures[0].starts_with("user_watch_history"));

        p.set_wide_down(false);
        assert_eq!(view_count(&p, "v1"), 1);
        assert_eq!(p.coordinator.get_video_metrics("v1").unwrap().unwrap().views, 0);
    }

    #[test]
    fn negative_watch_time_rejected() {
        let p = platform();
        let err = p.coordinator.record_watch_event("u1", "v1", -1, "tv").unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn concurrent_viewers_count_exactly() {
        let p = Arc::new(platform());
        p.coordinator.upload_video(upload("v1", "u9", "music")).unwrap();
        let barrier = Arc::new(Barrier::new(4));

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let p = Arc::clone(&p);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    for _ in 0..5 {
                        p.coordinator
                            .record_watch_event(&format!("u{}", t), "v1", 1, "web")
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(view_count(&p, "v1"), 20);
        assert_eq!(p.coordinator.get_video_metrics("v1").unwrap().unwrap().views, 20);
    }
}

// ============================================================================
// Recommendations
// ============================================================================

mod recommendations {
    use super::*;

    fn catalog() -> Platform {
        let p = platform();
        for (id, creator, category) in [
            ("m1", "c1", "music"),
            ("m2", "c1", "music"),
            ("m3", "u1", "music"),
            ("e1", "c2", "education"),
            ("s1", "c2", "sports"),
        ] {
            p.coordinator.upload_video(upload(id, creator, category)).unwrap();
        }
        for (user, video) in [
            ("u1", "m1"),
            ("u1", "m1"),
            ("u1", "e1"),
            ("u2", "m2"),
            ("u2", "m2"),
            ("u2", "m2"),
        ] {
            p.coordinator.record_watch_event(user, video, 60, "web").unwrap();
        }
        p
    }

    fn ids(recs: &[streamvault_engine::ScoredVideo]) -> Vec<&str> {
        recs.iter().map(|r| r.video_id.as_str()).collect()
    }

    #[test]
    fn relational_candidates_by_views() {
        let p = catalog();
        let recs = p.coordinator.get_user_recommendations("u1", 10).unwrap();
        // own upload m3 and the unwatched sports category are excluded
        assert_eq!(ids(&recs), vec!["m2", "m1", "e1"]);
        assert!((recs[0].score - 1.8).abs() < 1e-9);
        assert!((recs[2].score - 0.6).abs() < 1e-9);
    }

    #[test]
    fn content_scores_are_blended() {
        let p = catalog();
        p.coordinator.put_recommendation("u1", "s1", 5.0).unwrap();
        p.coordinator.put_recommendation("u1", "e1", 1.0).unwrap();
        p.coordinator.put_recommendation("u10", "m3", 100.0).unwrap();

        let recs = p.coordinator.get_user_recommendations("u1", 3).unwrap();
        assert_eq!(ids(&recs), vec!["s1", "m2", "m1"]);
        assert!((recs[0].score - 2.0).abs() < 1e-9);

        let all = p.coordinator.get_user_recommendations("u1", 10).unwrap();
        let e1 = all.iter().find(|r| r.video_id == "e1").unwrap();
        assert!((e1.score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn no_history_no_recommendations() {
        let p = catalog();
        assert!(p.coordinator.get_user_recommendations("u3", 10).unwrap().is_empty());
        assert!(p.coordinator.get_user_recommendations("u1", 0).unwrap().is_empty());
    }

    #[test]
    fn content_outage_falls_back_to_relational() {
        let p = catalog();
        p.coordinator.put_recommendation("u1", "s1", 5.0).unwrap();
        p.set_wide_down(true);
        let recs = p.coordinator.get_user_recommendations("u1", 10).unwrap();
        assert_eq!(ids(&recs), vec!["m2", "m1", "e1"]);
    }
}

// ============================================================================
// Analytics & search
// ============================================================================

mod analytics_and_search {
    use super::*;

    #[test]
    fn dashboard_for_today() {
        let p = platform();
        p.coordinator.upload_video(upload("v1", "c1", "music")).unwrap();
        p.coordinator.upload_video(upload("v2", "c1", "music")).unwrap();
        p.coordinator.record_watch_event("u1", "v1", 100, "web").unwrap();
        p.coordinator.record_watch_event("u1", "v2", 50, "web").unwrap();
        p.coordinator.record_watch_event("u2", "v1", 30, "tv").unwrap();

        let today = Timestamp::now().date();
        let dashboard = p.coordinator.get_analytics_dashboard(today, today).unwrap();
        assert_eq!(dashboard.daily.len(), 1);
        let day = &dashboard.daily[0];
        assert_eq!(day.date, today);
        assert_eq!(day.active_users, 2);
        assert_eq!(day.views, 3);
        assert_eq!(day.watch_time, 180);
        assert!((day.avg_watch_time - 60.0).abs() < 1e-9);
        assert_eq!(dashboard.unique_users, 2);
        assert_eq!(dashboard.total_views, 3);

        let top: Vec<(&str, i64)> = dashboard
            .top_videos
            .iter()
            .map(|m| (m.video_id.as_str(), m.views))
            .collect();
        assert_eq!(top, vec![("v1", 2), ("v2", 1)]);
        assert_eq!(dashboard.top_videos[0].total_watch_time, 130);
    }

    #[test]
    fn dashboard_survives_wide_column_outage() {
        let p = platform();
        p.coordinator.upload_video(upload("v1", "c1", "music")).unwrap();
        p.coordinator.record_watch_event("u1", "v1", 100, "web").unwrap();

        p.set_wide_down(true);
        let today = Timestamp::now().date();
        let dashboard = p.coordinator.get_analytics_dashboard(today, today).unwrap();
        assert_eq!(dashboard.total_views, 1);
        assert_eq!(dashboard.total_watch_time, 100);
        assert!(dashboard.top_videos.is_empty());
    }

    #[test]
    fn dashboard_outside_activity_is_empty() {
        let p = platform();
        p.coordinator.upload_video(upload("v1", "c1", "music")).unwrap();
        p.coordinator.record_watch_event("u1", "v1", 100, "web").unwrap();

        let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2020, 1, 31).unwrap();
        let dashboard = p.coordinator.get_analytics_dashboard(start, end).unwrap();
        assert!(dashboard.daily.is_empty());
        assert_eq!(dashboard.total_views, 0);
        assert_eq!(dashboard.total_watch_time, 0);

        let err = p.coordinator.get_analytics_dashboard(end, start).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn search_ranks_by_matched_terms() {
        let p = platform();
        let indexed = p.coordinator.index_video_for_search(
            "v1",
            "Rust ownership explained",
            "borrowing and lifetimes",
            &["rust".to_string()],
        );
        assert_eq!(indexed, 6);
        p.coordinator
            .index_video_for_search("v2", "Rust for beginners", "", &[]);
        p.coordinator
            .index_video_for_search("v3", "Gardening basics", "", &[]);

        let hits = p.coordinator.search_videos("rust ownership", 10).unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.video_id.as_str()).collect();
        assert_eq!(ids, vec!["v1", "v2"]);
        assert!((hits[0].score - 2.0).abs() < 1e-9);

        assert!(p.coordinator.search_videos("an of", 10).unwrap().is_empty());
        assert!(p.coordinator.search_videos("quantum", 10).unwrap().is_empty());
    }

    #[test]
    fn indexing_is_best_effort() {
        let p = platform();
        p.set_wide_down(true);
        assert_eq!(
            p.coordinator
                .index_video_for_search("v1", "Rust ownership", "", &[]),
            0
        );
    }
}

// ============================================================================
// Health
// ============================================================================

mod health {
    use super::*;

    #[test]
    fn healthy_and_idempotent() {
        let p = platform();
        p.coordinator.upload_video(upload("v1", "c1", "music")).unwrap();
        p.coordinator.record_watch_event("u1", "v1", 10, "web").unwrap();

        let first = p.coordinator.get_system_health();
        let second = p.coordinator.get_system_health();
        assert_eq!(first, second);
        assert_eq!(first.overall, HealthStatus::Healthy);
        assert_eq!(first.objects.stats.as_ref().unwrap().total_files, 1);
        assert_eq!(first.wide_column.stats.as_ref().unwrap().table_count, 4);
    }

    #[test]
    fn unreachable_store_is_unhealthy() {
        let p = platform();
        p.set_wide_down(true);
        let health = p.coordinator.get_system_health();
        assert_eq!(health.overall, HealthStatus::Unhealthy);
        assert_eq!(health.wide_column.status, HealthStatus::Unhealthy);
        assert!(health.wide_column.stats.is_none());
        assert_eq!(health.transactional.status, HealthStatus::Healthy);
        assert_eq!(health.objects.status, HealthStatus::Healthy);
    }

    #[test]
    fn partial_outages_degrade() {
        let p = platform();
        p.holders[0].set_online(false);
        let health = p.coordinator.get_system_health();
        assert_eq!(health.objects.status, HealthStatus::Degraded);
        assert_eq!(health.overall, HealthStatus::Degraded);

        p.wide.inner.set_shard_available(1, false).unwrap();
        let health = p.coordinator.get_system_health();
        assert_eq!(health.wide_column.status, HealthStatus::Degraded);

        for holder in &p.holders {
            holder.set_online(false);
        }
        assert_eq!(p.coordinator.get_system_health().overall, HealthStatus::Unhealthy);
    }

    #[test]
    fn missing_database_degrades() {
        let p = platform_unbootstrapped();
        let health = p.coordinator.get_system_health();
        assert_eq!(health.transactional.status, HealthStatus::Degraded);
    }
}

// ============================================================================
// Reconciliation
// ============================================================================

mod reconciliation {
    use super::*;

    #[test]
    fn reaps_orphans_from_failed_upload() {
        let p = platform();
        let mut video = upload("v1", "u1", "music");
        video.title = "x".repeat(501);
        video.thumbnail = Some(Bytes::from_static(b"jpeg"));
        assert!(p.coordinator.upload_video(video).is_err());
        p.coordinator.upload_video(upload("v2", "u1", "music")).unwrap();

        let spared = p
            .coordinator
            .reconcile_with_grace(Duration::from_secs(3600))
            .unwrap();
        assert!(spared.is_clean());

        let report = p.coordinator.reconcile().unwrap();
        assert_eq!(report.orphan_blobs, vec!["/videos/v1.mp4", "/thumbnails/v1.jpg"]);
        assert!(report.dangling_videos.is_empty());
        assert!(!p.objects.exists("/videos/v1.mp4"));
        assert!(p.coordinator.get_video("v2").is_ok());

        assert!(p.coordinator.reconcile().unwrap().is_clean());
    }

    #[test]
    fn removes_metadata_whose_blob_is_gone() {
        let p = platform();
        p.coordinator.upload_video(upload("v1", "u1", "music")).unwrap();
        p.objects.delete_file("/videos/v1.mp4").unwrap();

        let report = p.coordinator.reconcile().unwrap();
        assert_eq!(report.dangling_videos, vec!["v1"]);
        assert!(p.coordinator.get_video("v1").unwrap_err().is_not_found());
    }

    #[test]
    fn segments_follow_their_video() {
        let p = platform();
        p.coordinator.upload_video(upload("v1", "u1", "music")).unwrap();
        p.coordinator.store_video_segment("v1", 0, vec![1u8; 4]).unwrap();
        p.coordinator.store_video_segment("gone", 0, vec![1u8; 4]).unwrap();

        let report = p.coordinator.reconcile().unwrap();
        assert_eq!(report.orphan_blobs, vec!["/videos/gone/segment_0.ts"]);
        assert!(p.objects.exists("/videos/v1/segment_0.ts"));
    }
}
