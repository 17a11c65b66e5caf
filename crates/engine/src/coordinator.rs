//! Storage coordinator
//!
//! The single entry point the platform uses. Every workflow writes its
//! record of truth to the transactional store and surfaces any failure
//! there. Analytics and index writes to the wide-column store are
//! best-effort: failures are logged and listed in the returned
//! [`WriteReport`] instead of failing the call.
//!
//! Uploads write the blob before the metadata row. A failed metadata
//! insert leaves an orphaned blob until
//! [`reconcile`](StorageCoordinator::reconcile) reaps it. An id that
//! already has a row, or has an upload in flight, is rejected before any
//! blob is touched.

use bytes::Bytes;
use chrono::NaiveDate;
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::BTreeMap;
use std::sync::Arc;
use streamvault_core::{Error, GlobalClock, Result, Timestamp, Value};
use streamvault_objects::{segment_path, thumbnail_path, video_path, ObjectStore};
use streamvault_txn::{CompareOp, Mutation, Query, SortOrder, TransactionalStore, TxnId};
use streamvault_widecolumn::{Row, RowFilter, WideColumnStore};
use tracing::{debug, info, warn};

use crate::backend::{ObjectBackend, TransactionalBackend, WideColumnBackend};
use crate::config::StreamVaultConfig;
use crate::models::{
    optional_value, AnalyticsDashboard, DailyActivity, HealthStatus, NewUser, ScoredVideo,
    StoreHealth, StoredVideo, SystemHealth, UploadReceipt, UserProfile, VideoMetadata,
    VideoMetrics, VideoUpload, WatchHistoryEntry, WriteReport,
};
use crate::schemas::{
    platform_schemas, SEARCH_INDEX, USERS, USER_RECOMMENDATIONS, USER_WATCH_HISTORY, VIDEOS,
    VIDEO_METRICS, WATCH_HISTORY, WIDE_TABLES,
};

/// Attempts at a watch-event commit that hits a transient failure
const COMMIT_ATTEMPTS: usize = 3;
/// Most-watched categories considered for recommendations
const PREFERRED_CATEGORIES: usize = 3;
/// Candidates taken from each preferred category
const PER_CATEGORY: usize = 7;
const RELATIONAL_WEIGHT: f64 = 0.6;
const CONTENT_WEIGHT: f64 = 0.4;
/// Videos listed on the analytics dashboard
const TOP_VIDEOS: usize = 10;
/// Shortest indexed search term, in characters
const MIN_TERM_CHARS: usize = 3;

/// Composes the three stores into platform workflows
pub struct StorageCoordinator {
    pub(crate) database_id: String,
    pub(crate) wide: Arc<dyn WideColumnBackend>,
    pub(crate) txn: Arc<dyn TransactionalBackend>,
    pub(crate) objects: Arc<dyn ObjectBackend>,
    /// Issues watch-event timestamps; strictly increasing keeps
    /// `WatchHistory` keys unique for back-to-back events
    event_clock: GlobalClock,
    /// Video ids with an upload between blob write and metadata commit
    uploading: Mutex<FxHashSet<String>>,
}

impl std::fmt::Debug for StorageCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageCoordinator")
            .field("database_id", &self.database_id)
            .finish_non_exhaustive()
    }
}

impl StorageCoordinator {
    /// Coordinate the given stores
    pub fn new(
        database_id: &str,
        wide: Arc<dyn WideColumnBackend>,
        txn: Arc<dyn TransactionalBackend>,
        objects: Arc<dyn ObjectBackend>,
    ) -> Self {
        Self {
            database_id: database_id.to_string(),
            wide,
            txn,
            objects,
            event_clock: GlobalClock::default(),
            uploading: Mutex::new(FxHashSet::default()),
        }
    }

    /// Build in-process stores from configuration
    pub fn from_config(config: &StreamVaultConfig) -> Result<Self> {
        config.validate()?;
        let objects = ObjectStore::new(config.objects.clone())?;
        Ok(Self::new(
            &config.database_id,
            Arc::new(WideColumnStore::new(config.wide_column.clone())),
            Arc::new(TransactionalStore::new(config.transactional.clone())),
            Arc::new(objects),
        ))
    }

    /// Transactional database this coordinator writes to
    pub fn database_id(&self) -> &str {
        &self.database_id
    }

    /// Create every platform table that does not exist yet
    ///
    /// Safe to call repeatedly and concurrently.
    pub fn bootstrap(&self) -> Result<()> {
        for (table, families) in WIDE_TABLES {
            if self.wide.table_exists(table) {
                continue;
            }
            match self.wide.create_table(table, families) {
                Ok(()) | Err(Error::TableExists(_)) => {}
                Err(e) => return Err(e),
            }
        }
        if !self.txn.database_ids().contains(&self.database_id) {
            match self.txn.create_database(&self.database_id, platform_schemas()) {
                Ok(()) | Err(Error::DatabaseExists(_)) => {}
                Err(e) => return Err(e),
            }
        }
        info!(
            target: "streamvault::coordinator",
            database = %self.database_id,
            wide_tables = WIDE_TABLES.len(),
            "Storage bootstrapped"
        );
        Ok(())
    }

    // ========================================================================
    // Users
    // ========================================================================

    /// Insert a user profile and seed its recommendation bookkeeping row
    pub fn create_user(&self, user: NewUser) -> Result<WriteReport> {
        if user.user_id.is_empty() {
            return Err(Error::invalid_input("user_id must not be empty"));
        }
        let now = Timestamp::now();
        let row: Vec<(&str, Value)> = vec![
            ("user_id", user.user_id.as_str().into()),
            ("email", user.email.into()),
            ("username", user.username.into()),
            ("password_hash", user.password_hash.into()),
            ("first_name", optional_value(user.first_name)),
            ("last_name", optional_value(user.last_name)),
            ("created_at", now.into()),
            ("updated_at", now.into()),
        ];
        let commit_ts = self.commit_single(vec![Mutation::insert(USERS, row)])?;

        let mut failures = Vec::new();
        note_secondary(
            &mut failures,
            USER_RECOMMENDATIONS,
            self.wide.put(
                USER_RECOMMENDATIONS,
                &user.user_id,
                "metadata",
                "created_at",
                Bytes::from(now.as_micros().to_string()),
            ),
        );
        info!(target: "streamvault::coordinator", user_id = %user.user_id, "User created");
        Ok(WriteReport {
            commit_ts,
            secondary_failures: failures,
        })
    }

    /// Profile of `user_id`, `None` if no such user
    pub fn get_user_profile(&self, user_id: &str) -> Result<Option<UserProfile>> {
        let query = Query::table(USERS).where_eq("user_id", user_id).limit(1);
        let rows = self.txn.execute_query(&self.database_id, &query, None)?;
        rows.first().map(UserProfile::from_record).transpose()
    }

    // ========================================================================
    // Videos
    // ========================================================================

    /// Store the payload, then the metadata row, then seed the view counter
    ///
    /// # Errors
    ///
    /// `RowExists` when the id already has a `Videos` row or another
    /// upload of it is in flight; nothing is written in that case. Blob
    /// write failures and metadata insert failures are returned. In the
    /// latter case the blob has already been written and stays behind as
    /// an orphan.
    pub fn upload_video(&self, upload: VideoUpload) -> Result<UploadReceipt> {
        if upload.video_id.is_empty() {
            return Err(Error::invalid_input("video_id must not be empty"));
        }
        let _claim = UploadClaim::acquire(&self.uploading, &upload.video_id)?;
        if self.find_video(&upload.video_id)?.is_some() {
            return Err(duplicate_video(&upload.video_id));
        }
        let blob_path = video_path(&upload.video_id);
        self.objects.write_file(&blob_path, upload.video.clone())?;

        let thumb_path = match &upload.thumbnail {
            Some(image) => {
                let path = thumbnail_path(&upload.video_id);
                if let Err(e) = self.objects.write_file(&path, image.clone()) {
                    warn!(
                        target: "streamvault::coordinator",
                        video_id = %upload.video_id,
                        path = %blob_path,
                        error = %e,
                        "Thumbnail write failed, video blob left for reconciliation"
                    );
                    return Err(e);
                }
                Some(path)
            }
            None => None,
        };

        let size = upload.video.len();
        let row: Vec<(&str, Value)> = vec![
            ("video_id", upload.video_id.as_str().into()),
            ("creator_id", upload.creator_id.into()),
            ("title", upload.title.into()),
            ("description", upload.description.into()),
            ("duration", upload.duration.into()),
            ("file_path", blob_path.as_str().into()),
            ("thumbnail_path", optional_value(thumb_path.clone())),
            ("category", upload.category.into()),
            ("tags", upload.tags.into()),
            ("upload_date", Timestamp::now().into()),
        ];
        let commit_ts = match self.commit_single(vec![Mutation::insert(VIDEOS, row)]) {
            Ok(ts) => ts,
            Err(e) => {
                warn!(
                    target: "streamvault::coordinator",
                    video_id = %upload.video_id,
                    path = %blob_path,
                    error = %e,
                    "Video metadata insert failed, blob is orphaned until reconciliation"
                );
                return Err(e);
            }
        };

        let mut failures = Vec::new();
        note_secondary(
            &mut failures,
            VIDEO_METRICS,
            self.wide.put(
                VIDEO_METRICS,
                &upload.video_id,
                "metrics",
                "views",
                Bytes::from_static(b"0"),
            ),
        );
        info!(
            target: "streamvault::coordinator",
            video_id = %upload.video_id,
            bytes = size,
            "Video uploaded"
        );
        Ok(UploadReceipt {
            video_path: blob_path,
            thumbnail_path: thumb_path,
            commit_ts,
            secondary_failures: failures,
        })
    }

    /// Metadata joined with the payload
    ///
    /// # Errors
    ///
    /// `NotFound` when no metadata row exists, even if a blob does.
    pub fn get_video(&self, video_id: &str) -> Result<StoredVideo> {
        let metadata = self
            .find_video(video_id)?
            .ok_or_else(|| Error::not_found("video", video_id))?;
        let path = metadata
            .file_path
            .clone()
            .unwrap_or_else(|| video_path(video_id));
        let data = self.objects.read_file(&path)?;
        Ok(StoredVideo { metadata, data })
    }

    /// Videos uploaded by `creator_id`, newest first
    pub fn get_user_videos(&self, creator_id: &str) -> Result<Vec<VideoMetadata>> {
        let query = Query::table(VIDEOS)
            .where_eq("creator_id", creator_id)
            .order_by("upload_date", SortOrder::Desc);
        self.txn
            .execute_query(&self.database_id, &query, None)?
            .iter()
            .map(VideoMetadata::from_record)
            .collect()
    }

    /// Store one streaming segment of a video
    pub fn store_video_segment(
        &self,
        video_id: &str,
        segment: u32,
        data: impl Into<Bytes>,
    ) -> Result<String> {
        let path = segment_path(video_id, segment);
        self.objects.write_file(&path, data.into())?;
        debug!(target: "streamvault::coordinator", video_id, segment, "Segment stored");
        Ok(path)
    }

    /// Read one streaming segment
    pub fn get_video_segment(&self, video_id: &str, segment: u32) -> Result<Bytes> {
        self.objects.read_file(&segment_path(video_id, segment))
    }

    fn find_video(&self, video_id: &str) -> Result<Option<VideoMetadata>> {
        let query = Query::table(VIDEOS).where_eq("video_id", video_id).limit(1);
        let rows = self.txn.execute_query(&self.database_id, &query, None)?;
        rows.first().map(VideoMetadata::from_record).transpose()
    }

    // ========================================================================
    // Watch events
    // ========================================================================

    /// Record that `user_id` watched `video_id` for `watch_time` seconds
    ///
    /// The `WatchHistory` insert and the `Videos.view_count` increment
    /// commit in one transaction; its failure is returned. The analytics
    /// row and counters follow as best-effort writes.
    pub fn record_watch_event(
        &self,
        user_id: &str,
        video_id: &str,
        watch_time: i64,
        device_type: &str,
    ) -> Result<WriteReport> {
        if watch_time < 0 {
            return Err(Error::invalid_input("watch_time must not be negative"));
        }
        let ts = self.event_clock.tick();
        let commit_ts = self.commit_watch(user_id, video_id, watch_time, device_type, ts)?;

        let mut failures = Vec::new();
        let row_key = format!("{}#{:020}#{}", user_id, ts.as_micros(), video_id);
        let analytics = || -> Result<()> {
            for (column, value) in [
                ("video_id", video_id.to_string()),
                ("watch_time", watch_time.to_string()),
                ("device_type", device_type.to_string()),
                ("timestamp", ts.as_micros().to_string()),
            ] {
                self.wide
                    .put(USER_WATCH_HISTORY, &row_key, "watch", column, Bytes::from(value))?;
            }
            Ok(())
        };
        note_secondary(&mut failures, USER_WATCH_HISTORY, analytics());
        note_secondary(
            &mut failures,
            VIDEO_METRICS,
            self.wide
                .increment_counter(VIDEO_METRICS, video_id, "metrics", "views", 1),
        );
        note_secondary(
            &mut failures,
            VIDEO_METRICS,
            self.wide.increment_counter(
                VIDEO_METRICS,
                video_id,
                "metrics",
                "total_watch_time",
                watch_time,
            ),
        );

        debug!(
            target: "streamvault::coordinator",
            user_id,
            video_id,
            watch_time,
            failures = failures.len(),
            "Watch event recorded"
        );
        Ok(WriteReport {
            commit_ts,
            secondary_failures: failures,
        })
    }

    /// Most recent watch events of `user_id`
    pub fn get_user_watch_history(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<WatchHistoryEntry>> {
        let query = Query::table(WATCH_HISTORY)
            .where_eq("user_id", user_id)
            .order_by("timestamp", SortOrder::Desc)
            .limit(limit);
        self.txn
            .execute_query(&self.database_id, &query, None)?
            .iter()
            .map(WatchHistoryEntry::from_record)
            .collect()
    }

    /// View and watch-time counters of a video, `None` if never seeded
    pub fn get_video_metrics(&self, video_id: &str) -> Result<Option<VideoMetrics>> {
        Ok(self
            .wide
            .get(VIDEO_METRICS, video_id, Some(&RowFilter::latest()))?
            .map(|row| metrics_of(&row)))
    }

    fn commit_watch(
        &self,
        user_id: &str,
        video_id: &str,
        watch_time: i64,
        device_type: &str,
        ts: Timestamp,
    ) -> Result<Timestamp> {
        let mut attempt = 1;
        loop {
            let event: Vec<(&str, Value)> = vec![
                ("user_id", user_id.into()),
                ("video_id", video_id.into()),
                ("timestamp", ts.into()),
                ("watch_time", watch_time.into()),
                ("device_type", device_type.into()),
            ];
            let mutations = vec![
                Mutation::insert(WATCH_HISTORY, event),
                Mutation::update(VIDEOS, video_id).increment("view_count", 1),
            ];
            match self.run_transaction(mutations) {
                Err(e) if e.is_retryable() && attempt < COMMIT_ATTEMPTS => {
                    debug!(
                        target: "streamvault::coordinator",
                        video_id,
                        attempt,
                        error = %e,
                        "Retrying watch event commit"
                    );
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    // ========================================================================
    // Recommendations
    // ========================================================================

    /// Ranked recommendations for `user_id`
    ///
    /// Relational candidates (the most-viewed videos of the user's three
    /// most-watched categories, excluding their own uploads) score
    /// `(n - rank) * 0.6`; stored content-based scores add `score * 0.4`.
    pub fn get_user_recommendations(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<ScoredVideo>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let candidates = self.relational_candidates(user_id, limit)?;
        let n = candidates.len();
        let mut scores: FxHashMap<String, f64> = FxHashMap::default();
        for (index, video_id) in candidates.into_iter().enumerate() {
            scores.insert(video_id, (n - index) as f64 * RELATIONAL_WEIGHT);
        }

        let (start, end) = prefix_range(user_id);
        let filter = RowFilter::new().family("recommendations");
        match self
            .wide
            .scan(USER_RECOMMENDATIONS, &start, Some(&end), Some(&filter), Some(limit))
        {
            Ok(rows) => {
                for row in rows {
                    if let Some(video_id) = row.latest_str("recommendations", "video_id") {
                        let score = parse_f64(row.latest_str("recommendations", "score"));
                        *scores.entry(video_id.to_string()).or_insert(0.0) +=
                            score * CONTENT_WEIGHT;
                    }
                }
            }
            Err(e) => warn!(
                target: "streamvault::coordinator",
                user_id,
                error = %e,
                "Content-based recommendations unavailable"
            ),
        }
        Ok(rank(scores, limit))
    }

    /// Store a content-based recommendation score
    pub fn put_recommendation(&self, user_id: &str, video_id: &str, score: f64) -> Result<()> {
        let row_key = format!("{}#{}", user_id, video_id);
        self.wide.put(
            USER_RECOMMENDATIONS,
            &row_key,
            "recommendations",
            "video_id",
            Bytes::copy_from_slice(video_id.as_bytes()),
        )?;
        self.wide.put(
            USER_RECOMMENDATIONS,
            &row_key,
            "recommendations",
            "score",
            Bytes::from(score.to_string()),
        )?;
        Ok(())
    }

    fn relational_candidates(&self, user_id: &str, limit: usize) -> Result<Vec<String>> {
        let txn_id = self.txn.begin_transaction(&self.database_id, true)?;
        match self.preference_candidates(user_id, limit, txn_id) {
            Ok(candidates) => {
                self.txn.commit_transaction(txn_id)?;
                Ok(candidates)
            }
            Err(e) => {
                self.abandon(txn_id);
                Err(e)
            }
        }
    }

    fn preference_candidates(
        &self,
        user_id: &str,
        limit: usize,
        txn_id: TxnId,
    ) -> Result<Vec<String>> {
        let watched = self.txn.execute_query(
            &self.database_id,
            &Query::table(WATCH_HISTORY)
                .where_eq("user_id", user_id)
                .select(&["video_id"]),
            Some(txn_id),
        )?;
        if watched.is_empty() {
            return Ok(Vec::new());
        }
        let videos = self.txn.execute_query(
            &self.database_id,
            &Query::table(VIDEOS).select(&["video_id", "creator_id", "category", "view_count"]),
            Some(txn_id),
        )?;

        let category_of: FxHashMap<&str, &str> = videos
            .iter()
            .filter_map(|v| Some((v.get("video_id")?.as_str()?, v.get("category")?.as_str()?)))
            .collect();
        let mut watch_counts: FxHashMap<&str, usize> = FxHashMap::default();
        for row in &watched {
            let category = row
                .get("video_id")
                .and_then(Value::as_str)
                .and_then(|id| category_of.get(id));
            if let Some(category) = category {
                *watch_counts.entry(*category).or_insert(0) += 1;
            }
        }
        let mut preferred: Vec<(&str, usize)> = watch_counts.into_iter().collect();
        preferred.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        preferred.truncate(PREFERRED_CATEGORIES);

        let mut per_category: FxHashMap<&str, Vec<(&str, i64)>> = FxHashMap::default();
        for video in &videos {
            let id = video.get("video_id").and_then(Value::as_str);
            let category = video.get("category").and_then(Value::as_str);
            let (Some(id), Some(category)) = (id, category) else {
                continue;
            };
            if video.get("creator_id").and_then(Value::as_str) == Some(user_id)
                || !preferred.iter().any(|(c, _)| *c == category)
            {
                continue;
            }
            let views = video.get("view_count").and_then(Value::as_int).unwrap_or(0);
            per_category.entry(category).or_default().push((id, views));
        }

        let by_views = |a: &(&str, i64), b: &(&str, i64)| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0));
        let mut candidates = Vec::new();
        for (_, mut group) in per_category {
            group.sort_by(by_views);
            group.truncate(PER_CATEGORY);
            candidates.extend(group);
        }
        candidates.sort_by(by_views);
        candidates.truncate(limit);
        Ok(candidates.into_iter().map(|(id, _)| id.to_string()).collect())
    }

    // ========================================================================
    // Analytics
    // ========================================================================

    /// Daily activity between `start` and `end` (inclusive, UTC days)
    /// and the most-viewed videos
    ///
    /// Top videos come from the wide-column store and are left empty when
    /// it cannot be read.
    pub fn get_analytics_dashboard(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<AnalyticsDashboard> {
        if start > end {
            return Err(Error::invalid_input(format!(
                "analytics range starts after it ends: {} > {}",
                start, end
            )));
        }
        let from = Timestamp::start_of_day(start);
        let until = end
            .succ_opt()
            .map(Timestamp::start_of_day)
            .unwrap_or(Timestamp::MAX);
        let query = Query::table(WATCH_HISTORY)
            .filter("timestamp", CompareOp::Ge, from)
            .filter("timestamp", CompareOp::Lt, until);
        let rows = self.txn.execute_query(&self.database_id, &query, None)?;

        let mut days: BTreeMap<NaiveDate, (FxHashSet<&str>, usize, i64)> = BTreeMap::new();
        let mut viewers = FxHashSet::default();
        for row in &rows {
            let user = row.get("user_id").and_then(Value::as_str);
            let ts = row.get("timestamp").and_then(Value::as_timestamp);
            let (Some(user), Some(ts)) = (user, ts) else {
                continue;
            };
            let watch_time = row.get("watch_time").and_then(Value::as_int).unwrap_or(0);
            let day = days
                .entry(ts.date())
                .or_insert_with(|| (FxHashSet::default(), 0, 0));
            day.0.insert(user);
            day.1 += 1;
            day.2 += watch_time;
            viewers.insert(user);
        }
        let daily: Vec<DailyActivity> = days
            .into_iter()
            .map(|(date, (users, views, watch_time))| DailyActivity {
                date,
                active_users: users.len(),
                views,
                watch_time,
                avg_watch_time: watch_time as f64 / views as f64,
            })
            .collect();

        let metrics = match self.wide.scan(
            VIDEO_METRICS,
            "",
            None,
            Some(&RowFilter::new().family("metrics")),
            None,
        ) {
            Ok(rows) => rows,
            Err(e) => {
                warn!(
                    target: "streamvault::coordinator",
                    error = %e,
                    "Video metrics unavailable, dashboard has no top videos"
                );
                Vec::new()
            }
        };
        let mut top_videos: Vec<VideoMetrics> = metrics.iter().map(metrics_of).collect();
        top_videos.sort_by(|a, b| b.views.cmp(&a.views).then_with(|| a.video_id.cmp(&b.video_id)));
        top_videos.truncate(TOP_VIDEOS);

        Ok(AnalyticsDashboard {
            start,
            end,
            unique_users: viewers.len(),
            total_views: daily.iter().map(|d| d.views).sum(),
            total_watch_time: daily.iter().map(|d| d.watch_time).sum(),
            daily,
            top_videos,
        })
    }

    // ========================================================================
    // Search
    // ========================================================================

    /// Index title, description and tag terms of a video
    ///
    /// Best-effort: returns how many terms were indexed; failures are
    /// logged.
    pub fn index_video_for_search(
        &self,
        video_id: &str,
        title: &str,
        description: &str,
        tags: &[String],
    ) -> usize {
        let words = title
            .split_whitespace()
            .chain(description.split_whitespace())
            .chain(tags.iter().flat_map(|tag| tag.split_whitespace()));
        let mut indexed = 0;
        for term in search_terms(words) {
            let row_key = format!("{}#{}", term, video_id);
            let result = self
                .wide
                .put(
                    SEARCH_INDEX,
                    &row_key,
                    "terms",
                    "video_id",
                    Bytes::copy_from_slice(video_id.as_bytes()),
                )
                .and_then(|_| {
                    self.wide.put(
                        SEARCH_INDEX,
                        &row_key,
                        "scores",
                        "relevance",
                        Bytes::from_static(b"1.0"),
                    )
                });
            match result {
                Ok(_) => indexed += 1,
                Err(e) => warn!(
                    target: "streamvault::coordinator",
                    video_id,
                    term = %term,
                    error = %e,
                    "Search index write failed"
                ),
            }
        }
        debug!(target: "streamvault::coordinator", video_id, terms = indexed, "Video indexed");
        indexed
    }

    /// Videos matching any term of `query`, by summed relevance
    pub fn search_videos(&self, query: &str, limit: usize) -> Result<Vec<ScoredVideo>> {
        let mut scores: FxHashMap<String, f64> = FxHashMap::default();
        for term in search_terms(query.split_whitespace()) {
            let (start, end) = prefix_range(&term);
            for row in self.wide.scan(SEARCH_INDEX, &start, Some(&end), None, None)? {
                if let Some(video_id) = row.latest_str("terms", "video_id") {
                    let relevance = parse_f64(row.latest_str("scores", "relevance"));
                    *scores.entry(video_id.to_string()).or_insert(0.0) += relevance;
                }
            }
        }
        Ok(rank(scores, limit))
    }

    // ========================================================================
    // Health
    // ========================================================================

    /// Status and statistics of every store
    ///
    /// Reads only self-reported statistics, so repeated calls without
    /// intervening writes return identical reports.
    pub fn get_system_health(&self) -> SystemHealth {
        let wide_column = match self.wide.stats() {
            Ok(stats) => {
                let degraded = (!stats.unavailable_shards.is_empty())
                    .then(|| format!("shards unavailable: {:?}", stats.unavailable_shards));
                StoreHealth::reporting(stats, degraded)
            }
            Err(e) => StoreHealth::unreachable(&e),
        };
        let transactional = match self.txn.stats() {
            Ok(stats) => {
                let degraded = (!self.txn.database_ids().contains(&self.database_id))
                    .then(|| format!("database {} is not bootstrapped", self.database_id));
                StoreHealth::reporting(stats, degraded)
            }
            Err(e) => StoreHealth::unreachable(&e),
        };
        let objects = match self.objects.storage_stats() {
            Ok(stats) if stats.online_holders == 0 => StoreHealth {
                status: HealthStatus::Unhealthy,
                detail: Some("no chunk holder online".to_string()),
                stats: Some(stats),
            },
            Ok(stats) => {
                let degraded = (stats.online_holders < stats.chunk_holders).then(|| {
                    format!(
                        "{} of {} chunk holders online",
                        stats.online_holders, stats.chunk_holders
                    )
                });
                StoreHealth::reporting(stats, degraded)
            }
            Err(e) => StoreHealth::unreachable(&e),
        };

        let health = SystemHealth::new(wide_column, transactional, objects);
        if health.overall == HealthStatus::Healthy {
            debug!(target: "streamvault::coordinator", "System healthy");
        } else {
            warn!(
                target: "streamvault::coordinator",
                overall = %health.overall,
                wide_column = %health.wide_column.status,
                transactional = %health.transactional.status,
                objects = %health.objects.status,
                "System not healthy"
            );
        }
        health
    }

    // ========================================================================
    // Transaction helpers
    // ========================================================================

    fn commit_single(&self, mutations: Vec<Mutation>) -> Result<Timestamp> {
        self.txn
            .execute_mutation(&self.database_id, mutations, None)?
            .ok_or_else(|| Error::internal("single-use mutation returned no commit timestamp"))
    }

    fn run_transaction(&self, mutations: Vec<Mutation>) -> Result<Timestamp> {
        let txn_id = self.txn.begin_transaction(&self.database_id, false)?;
        if let Err(e) = self
            .txn
            .execute_mutation(&self.database_id, mutations, Some(txn_id))
        {
            self.abandon(txn_id);
            return Err(e);
        }
        self.txn.commit_transaction(txn_id)
    }

    fn abandon(&self, txn_id: TxnId) {
        if let Err(e) = self.txn.abort_transaction(txn_id) {
            debug!(target: "streamvault::coordinator", txn_id, error = %e, "Abort failed");
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn note_secondary<T>(failures: &mut Vec<String>, table: &str, result: Result<T>) {
    if let Err(e) = result {
        warn!(
            target: "streamvault::coordinator",
            table,
            error = %e,
            "Secondary write failed"
        );
        failures.push(format!("{}: {}", table, e));
    }
}

/// Exclusive claim on a video id for the length of one upload
struct UploadClaim<'a> {
    uploading: &'a Mutex<FxHashSet<String>>,
    video_id: String,
}

impl<'a> UploadClaim<'a> {
    fn acquire(uploading: &'a Mutex<FxHashSet<String>>, video_id: &str) -> Result<Self> {
        if !uploading.lock().insert(video_id.to_string()) {
            return Err(duplicate_video(video_id));
        }
        Ok(Self {
            uploading,
            video_id: video_id.to_string(),
        })
    }
}

impl Drop for UploadClaim<'_> {
    fn drop(&mut self) {
        self.uploading.lock().remove(&self.video_id);
    }
}

fn duplicate_video(video_id: &str) -> Error {
    Error::RowExists {
        table: VIDEOS.to_string(),
        key: video_id.to_string(),
    }
}

/// Key range `[{prefix}#, {prefix}$)` covering every `{prefix}#...` key
fn prefix_range(prefix: &str) -> (String, String) {
    (format!("{}#", prefix), format!("{}$", prefix))
}

fn parse_f64(value: Option<&str>) -> f64 {
    value.and_then(|s| s.parse().ok()).unwrap_or(0.0)
}

fn parse_counter(row: &Row, column: &str) -> i64 {
    row.latest_str("metrics", column)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}

fn metrics_of(row: &Row) -> VideoMetrics {
    VideoMetrics {
        video_id: row.key.clone(),
        views: parse_counter(row, "views"),
        total_watch_time: parse_counter(row, "total_watch_time"),
    }
}

fn rank(scores: FxHashMap<String, f64>, limit: usize) -> Vec<ScoredVideo> {
    let mut ranked: Vec<ScoredVideo> = scores
        .into_iter()
        .map(|(video_id, score)| ScoredVideo { video_id, score })
        .collect();
    ranked.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.video_id.cmp(&b.video_id))
    });
    ranked.truncate(limit);
    ranked
}

/// Lowercased, punctuation-trimmed, deduplicated terms of at least
/// three characters; `#` is reserved as the index key separator
fn search_terms<'a>(words: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut seen = FxHashSet::default();
    words
        .into_iter()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|t| t.chars().count() >= MIN_TERM_CHARS && !t.contains('#'))
        .filter(|t| seen.insert(t.clone()))
        .collect()
}
