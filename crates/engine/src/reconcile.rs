//! Cross-store reconciliation
//!
//! Uploads and watch events write to several stores without a shared
//! transaction. A reconciliation pass repairs what an interrupted upload
//! can leave behind:
//!
//! - video and thumbnail blobs whose video has no `Videos` row are deleted
//! - `Videos` rows whose payload blob is gone are deleted
//!
//! and then reclaims unreferenced chunks with the object store's garbage
//! collector.

use rustc_hash::FxHashSet;
use std::time::Duration;
use streamvault_core::{Error, Result, Timestamp, Value};
use streamvault_txn::{Mutation, Query};
use tracing::{info, warn};

use crate::coordinator::StorageCoordinator;
use crate::models::ReconciliationReport;
use crate::schemas::VIDEOS;

/// Video id a payload, segment or thumbnail path belongs to
fn owner_of(path: &str) -> Option<&str> {
    if let Some(rest) = path.strip_prefix("/videos/") {
        return match rest.split_once('/') {
            Some((id, _segment)) => Some(id),
            None => rest.strip_suffix(".mp4"),
        };
    }
    path.strip_prefix("/thumbnails/")
        .and_then(|rest| rest.strip_suffix(".jpg"))
}

impl StorageCoordinator {
    /// Reconcile the stores, treating every blob as settled
    pub fn reconcile(&self) -> Result<ReconciliationReport> {
        self.reconcile_with_grace(Duration::ZERO)
    }

    /// Reconcile the stores, sparing blobs modified within `grace`
    ///
    /// An upload in flight has written its blob but not yet its metadata
    /// row. A grace period longer than an upload keeps such blobs alive.
    pub fn reconcile_with_grace(&self, grace: Duration) -> Result<ReconciliationReport> {
        let rows = self.txn.execute_query(
            &self.database_id,
            &Query::table(VIDEOS).select(&["video_id", "file_path"]),
            None,
        )?;
        let known: FxHashSet<&str> = rows
            .iter()
            .filter_map(|row| row.get("video_id").and_then(Value::as_str))
            .collect();
        let cutoff = Timestamp::now().saturating_sub(grace);

        let mut report = ReconciliationReport::default();
        let mut blobs = self.objects.list_files("/videos/");
        blobs.extend(self.objects.list_files("/thumbnails/"));
        for path in blobs {
            let Some(owner) = owner_of(&path) else {
                continue;
            };
            if known.contains(owner) {
                continue;
            }
            let settled = self
                .objects
                .modified_at(&path)
                .map_or(false, |modified| modified <= cutoff);
            if !settled {
                continue;
            }
            match self.objects.delete_file(&path) {
                Ok(()) => report.orphan_blobs.push(path),
                Err(Error::FileNotFound(_)) => {}
                Err(e) => warn!(
                    target: "streamvault::coordinator",
                    path = %path,
                    error = %e,
                    "Orphan blob delete failed"
                ),
            }
        }

        for row in &rows {
            let id = row.get("video_id").and_then(Value::as_str);
            let path = row.get("file_path").and_then(Value::as_str);
            let (Some(id), Some(path)) = (id, path) else {
                continue;
            };
            if self.objects.exists(path) {
                continue;
            }
            self.txn.execute_mutation(
                &self.database_id,
                vec![Mutation::delete(VIDEOS, id)],
                None,
            )?;
            report.dangling_videos.push(id.to_string());
        }

        report.gc = self.objects.collect_garbage()?;
        info!(
            target: "streamvault::coordinator",
            orphan_blobs = report.orphan_blobs.len(),
            dangling_videos = report.dangling_videos.len(),
            chunks_removed = report.gc.chunks_removed,
            "Reconciliation finished"
        );
        Ok(report)
    }
}
