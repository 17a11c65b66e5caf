//! Chunked, replicated object store
//!
//! Files are split into `chunk_size` pieces. Each chunk is written to a
//! primary holder (the first candidate from the placement policy that
//! accepts it) and then copied best-effort to secondaries until the file's
//! replication factor is met or the replication budget runs out.
//!
//! Reads walk a chunk's Active replicas in order and return the first copy
//! whose SHA-256 matches; copies that fail verification are marked
//! Corrupted and skipped from then on.

use crate::checksum::{compute_checksum, verify_checksum};
use crate::config::ObjectStoreConfig;
use crate::holder::{ChunkHolder, HolderStats, MemoryChunkHolder};
use crate::metadata::{ChunkMeta, FileInfo, FileMeta, Replica, ReplicaStatus};
use crate::placement::PlacementPolicy;
use bytes::{Bytes, BytesMut};
use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;
use streamvault_core::{Deadline, Error, Result, Timestamp};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Object path of a full video
pub fn video_path(video_id: &str) -> String {
    format!("/videos/{}.mp4", video_id)
}

/// Object path of one streaming segment
pub fn segment_path(video_id: &str, segment: u32) -> String {
    format!("/videos/{}/segment_{}.ts", video_id, segment)
}

/// Object path of a thumbnail
pub fn thumbnail_path(video_id: &str) -> String {
    format!("/thumbnails/{}.jpg", video_id)
}

/// Number of chunks a payload of `len` bytes occupies
pub fn chunk_count(len: u64, chunk_size: usize) -> u64 {
    let chunk_size = chunk_size.max(1) as u64;
    (len + chunk_size - 1) / chunk_size
}

/// Store-wide counters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageStats {
    /// Files with metadata
    pub total_files: usize,
    /// Sum of logical file sizes
    pub total_size: u64,
    /// Chunks referenced by files
    pub total_chunks: usize,
    /// Chunks with metadata, including ones awaiting GC
    pub stored_chunks: usize,
    /// Default replication factor
    pub replication_factor: usize,
    /// Registered chunk holders
    pub chunk_holders: usize,
    /// Holders currently online
    pub online_holders: usize,
    /// Placement policy name
    pub placement: &'static str,
}

/// Result of a garbage-collection pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GcReport {
    /// Chunk metadata entries dropped
    pub chunks_removed: usize,
    /// Replicas deleted from holders
    pub replicas_deleted: usize,
}

/// Result of a replica repair pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairReport {
    /// Chunks examined
    pub chunks_checked: usize,
    /// Chunks that gained replicas or lost corrupted ones
    pub chunks_repaired: usize,
    /// New replicas written
    pub replicas_created: usize,
    /// Corrupted replicas dropped
    pub corrupted_removed: usize,
    /// Chunks with no verifiable copy left
    pub unrecoverable: Vec<String>,
}

/// Chunked object store over a set of chunk holders
#[derive(Debug)]
pub struct ObjectStore {
    config: ObjectStoreConfig,
    holders: Vec<Arc<dyn ChunkHolder>>,
    placement: Box<dyn PlacementPolicy>,
    files: RwLock<FxHashMap<String, FileMeta>>,
    chunks: RwLock<FxHashMap<String, ChunkMeta>>,
    /// Writers share it; garbage collection takes it exclusively so chunks
    /// written but not yet linked to a file are never reaped
    gc_gate: RwLock<()>,
}

impl ObjectStore {
    /// Create a store with `holder_count` in-memory holders
    ///
    /// Holders are named `chunkserver-{i}` and spread round-robin over
    /// `datacenter-{i % zone_count}`.
    pub fn new(config: ObjectStoreConfig) -> Result<Self> {
        config.validate()?;
        let holders = (0..config.holder_count)
            .map(|i| {
                Arc::new(MemoryChunkHolder::new(
                    format!("chunkserver-{}", i),
                    format!("datacenter-{}", i % config.zone_count),
                )) as Arc<dyn ChunkHolder>
            })
            .collect();
        let placement = config.placement.build();
        Self::with_holders(config, holders, placement)
    }

    /// Create a store over caller-provided holders and placement
    pub fn with_holders(
        config: ObjectStoreConfig,
        holders: Vec<Arc<dyn ChunkHolder>>,
        placement: Box<dyn PlacementPolicy>,
    ) -> Result<Self> {
        config.validate()?;
        if holders.is_empty() {
            return Err(Error::Config("object store needs at least one holder".into()));
        }
        info!(
            target: "streamvault::objects",
            holders = holders.len(),
            placement = placement.name(),
            chunk_size = config.chunk_size,
            "Object store ready"
        );
        Ok(Self {
            config,
            holders,
            placement,
            files: RwLock::new(FxHashMap::default()),
            chunks: RwLock::new(FxHashMap::default()),
            gc_gate: RwLock::new(()),
        })
    }

    /// Store configuration
    pub fn config(&self) -> &ObjectStoreConfig {
        &self.config
    }

    fn holder(&self, holder_id: &str) -> Option<&Arc<dyn ChunkHolder>> {
        self.holders.iter().find(|h| h.id() == holder_id)
    }

    // ========================================================================
    // Files
    // ========================================================================

    /// Register an empty file
    pub fn create_file(&self, path: &str, replication_factor: usize) -> Result<()> {
        validate_path(path)?;
        if replication_factor == 0 {
            return Err(Error::invalid_input("replication factor must be at least 1"));
        }
        let mut files = self.files.write();
        if files.contains_key(path) {
            return Err(Error::FileExists(path.to_string()));
        }
        files.insert(path.to_string(), FileMeta::new(path, replication_factor));
        debug!(target: "streamvault::objects", path, replication_factor, "Created file");
        Ok(())
    }

    /// Replace a file's content, creating the file if needed
    ///
    /// The previous chunks stay on their holders until the next
    /// [`collect_garbage`](Self::collect_garbage).
    pub fn write_file(&self, path: &str, data: impl Into<Bytes>) -> Result<FileMeta> {
        validate_path(path)?;
        let data = data.into();
        let _gate = self.gc_gate.read();
        let factor = self
            .files
            .read()
            .get(path)
            .map_or(self.config.replication_factor, |f| f.replication_factor);

        let chunk_ids = self.write_chunks(path, &data, factor)?;

        let mut files = self.files.write();
        let file = files
            .entry(path.to_string())
            .or_insert_with(|| FileMeta::new(path, factor));
        file.chunks = chunk_ids;
        file.size = data.len() as u64;
        file.modified_at = Timestamp::now();
        info!(
            target: "streamvault::objects",
            path,
            size = file.size,
            chunks = file.chunks.len(),
            "Wrote file"
        );
        Ok(file.clone())
    }

    /// Append to an existing file
    pub fn append_file(&self, path: &str, data: impl Into<Bytes>) -> Result<FileMeta> {
        let data = data.into();
        let _gate = self.gc_gate.read();
        let factor = self
            .files
            .read()
            .get(path)
            .map(|f| f.replication_factor)
            .ok_or_else(|| Error::FileNotFound(path.to_string()))?;

        let chunk_ids = self.write_chunks(path, &data, factor)?;

        let mut files = self.files.write();
        let file = files
            .get_mut(path)
            .ok_or_else(|| Error::FileNotFound(path.to_string()))?;
        file.chunks.extend(chunk_ids);
        file.size += data.len() as u64;
        file.modified_at = Timestamp::now();
        debug!(target: "streamvault::objects", path, size = file.size, "Appended to file");
        Ok(file.clone())
    }

    /// Read a whole file, verifying every chunk
    pub fn read_file(&self, path: &str) -> Result<Bytes> {
        let (chunk_ids, size) = self
            .files
            .read()
            .get(path)
            .map(|f| (f.chunks.clone(), f.size))
            .ok_or_else(|| Error::FileNotFound(path.to_string()))?;

        if let [only] = chunk_ids.as_slice() {
            return self.read_chunk(only);
        }
        let mut out = BytesMut::with_capacity(size as usize);
        for chunk_id in &chunk_ids {
            out.extend_from_slice(&self.read_chunk(chunk_id)?);
        }
        Ok(out.freeze())
    }

    /// Delete a file and every replica of its chunks
    pub fn delete_file(&self, path: &str) -> Result<()> {
        let chunk_ids = self
            .files
            .read()
            .get(path)
            .map(|f| f.chunks.clone())
            .ok_or_else(|| Error::FileNotFound(path.to_string()))?;

        let replicas: usize = chunk_ids.iter().map(|id| self.delete_chunk(id)).sum();
        self.files.write().remove(path);
        info!(
            target: "streamvault::objects",
            path,
            chunks = chunk_ids.len(),
            replicas,
            "Deleted file"
        );
        Ok(())
    }

    /// True if the file has metadata
    pub fn exists(&self, path: &str) -> bool {
        self.files.read().contains_key(path)
    }

    /// File and chunk metadata
    pub fn file_info(&self, path: &str) -> Option<FileInfo> {
        let file = self.files.read().get(path).cloned()?;
        let chunks = self.chunks.read();
        let chunks = file
            .chunks
            .iter()
            .filter_map(|id| chunks.get(id).cloned())
            .collect();
        Some(FileInfo { file, chunks })
    }

    /// Paths starting with `prefix`, sorted
    pub fn list_files(&self, prefix: &str) -> Vec<String> {
        let mut paths: Vec<String> = self
            .files
            .read()
            .keys()
            .filter(|p| p.starts_with(prefix))
            .cloned()
            .collect();
        paths.sort();
        paths
    }

    // ========================================================================
    // Chunks
    // ========================================================================

    fn write_chunks(&self, path: &str, data: &Bytes, factor: usize) -> Result<Vec<String>> {
        let chunk_size = self.config.chunk_size;
        let mut ids = Vec::with_capacity(chunk_count(data.len() as u64, chunk_size) as usize);
        let mut offset = 0;
        while offset < data.len() {
            let end = (offset + chunk_size).min(data.len());
            match self.write_chunk(data.slice(offset..end), factor) {
                Ok(meta) => ids.push(meta.id),
                Err(e) => {
                    warn!(
                        target: "streamvault::objects",
                        path,
                        offset,
                        error = %e,
                        "Chunk write failed; written chunks left for GC"
                    );
                    return Err(e);
                }
            }
            offset = end;
        }
        Ok(ids)
    }

    fn write_chunk(&self, data: Bytes, factor: usize) -> Result<ChunkMeta> {
        let chunk_id = format!("chunk_{}", Uuid::new_v4().simple());
        let checksum = compute_checksum(&data);
        let order = self.placement.order(&self.holders);
        let mut candidates = order.into_iter().map(|i| &self.holders[i]);
        let mut replicas = Vec::with_capacity(factor);

        for holder in candidates.by_ref() {
            match holder.write_chunk(&chunk_id, data.clone(), &checksum) {
                Ok(()) => {
                    replicas.push(active_replica(holder.as_ref()));
                    break;
                }
                Err(e) => warn!(
                    target: "streamvault::objects",
                    chunk_id = %chunk_id,
                    holder = holder.id(),
                    error = %e,
                    "Primary write failed, trying next holder"
                ),
            }
        }
        if replicas.is_empty() {
            return Err(Error::HolderUnavailable(format!(
                "no holder accepted chunk {}",
                chunk_id
            )));
        }

        let deadline = Deadline::after(self.config.replication_timeout());
        for holder in candidates.take(factor - 1) {
            if deadline.expired() {
                warn!(
                    target: "streamvault::objects",
                    chunk_id = %chunk_id,
                    holder = holder.id(),
                    "Replication budget exhausted, skipping secondary"
                );
                break;
            }
            match holder.write_chunk(&chunk_id, data.clone(), &checksum) {
                Ok(()) => replicas.push(active_replica(holder.as_ref())),
                Err(e) => warn!(
                    target: "streamvault::objects",
                    chunk_id = %chunk_id,
                    holder = holder.id(),
                    error = %e,
                    "Replica write failed"
                ),
            }
        }
        if replicas.len() < factor {
            debug!(
                target: "streamvault::objects",
                chunk_id = %chunk_id,
                replicas = replicas.len(),
                wanted = factor,
                "Chunk under-replicated"
            );
        }

        let meta = ChunkMeta {
            id: chunk_id.clone(),
            size: data.len(),
            checksum,
            replicas,
        };
        self.chunks.write().insert(chunk_id, meta.clone());
        Ok(meta)
    }

    fn read_chunk(&self, chunk_id: &str) -> Result<Bytes> {
        let meta = self
            .chunks
            .read()
            .get(chunk_id)
            .cloned()
            .ok_or_else(|| Error::NoValidReplica {
                chunk_id: chunk_id.to_string(),
            })?;

        for replica in meta.active_replicas() {
            let Some(holder) = self.holder(&replica.holder_id) else {
                continue;
            };
            match holder.read_chunk(chunk_id) {
                Ok(data) => match verify_checksum(chunk_id, &data, &meta.checksum) {
                    Ok(()) => return Ok(data),
                    Err(e) => {
                        warn!(
                            target: "streamvault::objects",
                            chunk_id,
                            holder = holder.id(),
                            error = %e,
                            "Checksum mismatch, marking replica corrupted"
                        );
                        self.mark_replica(chunk_id, holder.id(), ReplicaStatus::Corrupted);
                    }
                },
                Err(e) => warn!(
                    target: "streamvault::objects",
                    chunk_id,
                    holder = holder.id(),
                    error = %e,
                    "Replica read failed, trying next"
                ),
            }
        }
        Err(Error::NoValidReplica {
            chunk_id: chunk_id.to_string(),
        })
    }

    fn mark_replica(&self, chunk_id: &str, holder_id: &str, status: ReplicaStatus) {
        if let Some(meta) = self.chunks.write().get_mut(chunk_id) {
            meta.mark(holder_id, status);
        }
    }

    /// Drop chunk metadata and its replicas; returns replicas deleted
    fn delete_chunk(&self, chunk_id: &str) -> usize {
        let Some(meta) = self.chunks.write().remove(chunk_id) else {
            return 0;
        };
        let mut deleted = 0;
        for replica in &meta.replicas {
            let Some(holder) = self.holder(&replica.holder_id) else {
                continue;
            };
            match holder.delete_chunk(chunk_id) {
                Ok(true) => deleted += 1,
                Ok(false) => {}
                Err(e) => warn!(
                    target: "streamvault::objects",
                    chunk_id,
                    holder = holder.id(),
                    error = %e,
                    "Replica delete failed; left for GC"
                ),
            }
        }
        deleted
    }

    // ========================================================================
    // Platform paths
    // ========================================================================

    /// Store a full video; returns its path
    pub fn store_video(&self, video_id: &str, data: impl Into<Bytes>) -> Result<String> {
        let path = video_path(video_id);
        self.write_file(&path, data)?;
        Ok(path)
    }

    /// Read a full video
    pub fn get_video(&self, video_id: &str) -> Result<Bytes> {
        self.read_file(&video_path(video_id))
    }

    /// Store one streaming segment; returns its path
    pub fn store_video_segment(
        &self,
        video_id: &str,
        segment: u32,
        data: impl Into<Bytes>,
    ) -> Result<String> {
        let path = segment_path(video_id, segment);
        self.write_file(&path, data)?;
        Ok(path)
    }

    /// Read one streaming segment
    pub fn get_video_segment(&self, video_id: &str, segment: u32) -> Result<Bytes> {
        self.read_file(&segment_path(video_id, segment))
    }

    /// Store a thumbnail; returns its path
    pub fn store_thumbnail(&self, video_id: &str, data: impl Into<Bytes>) -> Result<String> {
        let path = thumbnail_path(video_id);
        self.write_file(&path, data)?;
        Ok(path)
    }

    /// Read a thumbnail
    pub fn get_thumbnail(&self, video_id: &str) -> Result<Bytes> {
        self.read_file(&thumbnail_path(video_id))
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Store-wide counters
    pub fn storage_stats(&self) -> StorageStats {
        let files = self.files.read();
        StorageStats {
            total_files: files.len(),
            total_size: files.values().map(|f| f.size).sum(),
            total_chunks: files.values().map(|f| f.chunks.len()).sum(),
            stored_chunks: self.chunks.read().len(),
            replication_factor: self.config.replication_factor,
            chunk_holders: self.holders.len(),
            online_holders: self.holders.iter().filter(|h| h.is_online()).count(),
            placement: self.placement.name(),
        }
    }

    /// Per-holder counters
    pub fn holder_stats(&self) -> Vec<HolderStats> {
        self.holders.iter().map(|h| h.stats()).collect()
    }

    /// Delete every chunk no file references
    ///
    /// Covers chunk metadata left behind by overwrites and failed writes, and
    /// replicas on online holders that no metadata mentions.
    pub fn collect_garbage(&self) -> GcReport {
        let _gate = self.gc_gate.write();
        let referenced: FxHashSet<String> = self
            .files
            .read()
            .values()
            .flat_map(|f| f.chunks.iter().cloned())
            .collect();
        let orphaned: Vec<String> = self
            .chunks
            .read()
            .keys()
            .filter(|id| !referenced.contains(*id))
            .cloned()
            .collect();

        let mut report = GcReport::default();
        for chunk_id in &orphaned {
            report.replicas_deleted += self.delete_chunk(chunk_id);
            report.chunks_removed += 1;
        }
        for holder in self.holders.iter().filter(|h| h.is_online()) {
            for chunk_id in holder.chunk_ids() {
                if !referenced.contains(&chunk_id) && matches!(holder.delete_chunk(&chunk_id), Ok(true)) {
                    report.replicas_deleted += 1;
                }
            }
        }

        info!(
            target: "streamvault::objects",
            chunks_removed = report.chunks_removed,
            replicas_deleted = report.replicas_deleted,
            "Garbage collection finished"
        );
        report
    }

    /// Verify every referenced chunk and restore its replication factor
    ///
    /// Each replica is read and checked. Corrupted copies are deleted, or
    /// kept as Corrupted when the delete fails, and unreachable ones become
    /// Stale. Chunks with fewer Active replicas than their file's factor
    /// are copied from a verified replica onto holders that do not hold a
    /// healthy copy.
    pub fn repair_replicas(&self) -> RepairReport {
        let _gate = self.gc_gate.read();
        let targets: Vec<(String, usize)> = self
            .files
            .read()
            .values()
            .flat_map(|f| {
                f.chunks
                    .iter()
                    .map(move |c| (c.clone(), f.replication_factor))
            })
            .collect();

        let mut report = RepairReport::default();
        for (chunk_id, factor) in targets {
            let Some(meta) = self.chunks.read().get(&chunk_id).cloned() else {
                continue;
            };
            report.chunks_checked += 1;
            let repaired = self.repair_chunk(meta, factor, &mut report);
            if let Some(slot) = self.chunks.write().get_mut(&chunk_id) {
                *slot = repaired;
            }
        }

        info!(
            target: "streamvault::objects",
            checked = report.chunks_checked,
            repaired = report.chunks_repaired,
            created = report.replicas_created,
            unrecoverable = report.unrecoverable.len(),
            "Replica repair finished"
        );
        report
    }

    fn repair_chunk(&self, mut meta: ChunkMeta, factor: usize, report: &mut RepairReport) -> ChunkMeta {
        let mut verified: Option<Bytes> = None;
        for replica in &mut meta.replicas {
            replica.status = match self.holder(&replica.holder_id) {
                None => ReplicaStatus::Stale,
                Some(holder) => match holder.read_chunk(&meta.id) {
                    Ok(data) if compute_checksum(&data) == meta.checksum => {
                        verified.get_or_insert(data);
                        ReplicaStatus::Active
                    }
                    Ok(_) | Err(Error::ChunkNotFound { .. }) => ReplicaStatus::Corrupted,
                    Err(_) => ReplicaStatus::Stale,
                },
            };
        }

        let Some(data) = verified else {
            warn!(target: "streamvault::objects", chunk_id = %meta.id, "No verifiable replica left");
            report.unrecoverable.push(meta.id.clone());
            return meta;
        };

        let mut changed = false;
        let mut kept = Vec::with_capacity(meta.replicas.len());
        for replica in std::mem::take(&mut meta.replicas) {
            if replica.status != ReplicaStatus::Corrupted {
                kept.push(replica);
                continue;
            }
            if let Some(holder) = self.holder(&replica.holder_id) {
                if let Err(e) = holder.delete_chunk(&meta.id) {
                    warn!(
                        target: "streamvault::objects",
                        chunk_id = %meta.id,
                        holder = holder.id(),
                        error = %e,
                        "Corrupted replica delete failed; kept for the next repair"
                    );
                    kept.push(replica);
                    continue;
                }
            }
            report.corrupted_removed += 1;
            changed = true;
        }
        meta.replicas = kept;

        let mut active = meta.active_replicas().count();
        if active < factor {
            for idx in self.placement.order(&self.holders) {
                if active >= factor {
                    break;
                }
                let holder = &self.holders[idx];
                let healthy_here = meta
                    .replicas
                    .iter()
                    .any(|r| r.holder_id == holder.id() && r.status == ReplicaStatus::Active);
                if healthy_here || !holder.is_online() {
                    continue;
                }
                match holder.write_chunk(&meta.id, data.clone(), &meta.checksum) {
                    Ok(()) => {
                        meta.replicas.retain(|r| r.holder_id != holder.id());
                        meta.replicas.push(active_replica(holder.as_ref()));
                        active += 1;
                        report.replicas_created += 1;
                        changed = true;
                        debug!(
                            target: "streamvault::objects",
                            chunk_id = %meta.id,
                            holder = holder.id(),
                            "Re-replicated chunk"
                        );
                    }
                    Err(e) => warn!(
                        target: "streamvault::objects",
                        chunk_id = %meta.id,
                        holder = holder.id(),
                        error = %e,
                        "Repair write failed"
                    ),
                }
            }
        }
        if changed {
            report.chunks_repaired += 1;
        }
        meta
    }
}

fn active_replica(holder: &dyn ChunkHolder) -> Replica {
    Replica {
        holder_id: holder.id().to_string(),
        zone: holder.zone().to_string(),
        status: ReplicaStatus::Active,
    }
}

fn validate_path(path: &str) -> Result<()> {
    if !path.starts_with('/') || path.len() < 2 {
        return Err(Error::invalid_input(format!(
            "object path must be absolute: '{}'",
            path
        )));
    }
    Ok(())
}
