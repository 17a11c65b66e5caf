//! File and chunk metadata kept by the object store

use serde::{Deserialize, Serialize};
use std::fmt;
use streamvault_core::Timestamp;

/// Health of one replica as last observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReplicaStatus {
    /// Served verified bytes or has not been checked since written
    Active,
    /// Holder could not be reached during the last check
    Stale,
    /// Bytes failed checksum verification
    Corrupted,
}

impl fmt::Display for ReplicaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplicaStatus::Active => write!(f, "ACTIVE"),
            ReplicaStatus::Stale => write!(f, "STALE"),
            ReplicaStatus::Corrupted => write!(f, "CORRUPTED"),
        }
    }
}

/// One copy of a chunk on one holder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replica {
    /// Holder storing the copy
    pub holder_id: String,
    /// Holder zone at write time
    pub zone: String,
    /// Last observed status
    pub status: ReplicaStatus,
}

/// A chunk: a contiguous piece of a file with its replicas
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMeta {
    /// Chunk id
    pub id: String,
    /// Size in bytes
    pub size: usize,
    /// Hex SHA-256 of the content
    pub checksum: String,
    /// Replicas, primary first
    pub replicas: Vec<Replica>,
}

impl ChunkMeta {
    /// Replicas currently marked Active
    pub fn active_replicas(&self) -> impl Iterator<Item = &Replica> {
        self.replicas
            .iter()
            .filter(|r| r.status == ReplicaStatus::Active)
    }

    /// Set the status of the replica on `holder_id`
    pub fn mark(&mut self, holder_id: &str, status: ReplicaStatus) -> bool {
        match self.replicas.iter_mut().find(|r| r.holder_id == holder_id) {
            Some(replica) => {
                replica.status = status;
                true
            }
            None => false,
        }
    }
}

/// A file: ordered chunk ids plus bookkeeping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMeta {
    /// Absolute path
    pub path: String,
    /// Logical size in bytes
    pub size: u64,
    /// Chunk ids in content order
    pub chunks: Vec<String>,
    /// Replicas per chunk
    pub replication_factor: usize,
    /// Creation time
    pub created_at: Timestamp,
    /// Last write or append
    pub modified_at: Timestamp,
}

impl FileMeta {
    /// Empty file
    pub fn new(path: &str, replication_factor: usize) -> Self {
        let now = Timestamp::now();
        Self {
            path: path.to_string(),
            size: 0,
            chunks: Vec::new(),
            replication_factor,
            created_at: now,
            modified_at: now,
        }
    }
}

/// File metadata joined with its chunk metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// File metadata
    pub file: FileMeta,
    /// Chunk metadata in content order
    pub chunks: Vec<ChunkMeta>,
}

impl FileInfo {
    /// Total replicas across chunks
    pub fn replica_count(&self) -> usize {
        self.chunks.iter().map(|c| c.replicas.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_replica() {
        let mut chunk = ChunkMeta {
            id: "c".into(),
            size: 1,
            checksum: String::new(),
            replicas: vec![
                Replica {
                    holder_id: "a".into(),
                    zone: "z".into(),
                    status: ReplicaStatus::Active,
                },
                Replica {
                    holder_id: "b".into(),
                    zone: "z".into(),
                    status: ReplicaStatus::Active,
                },
            ],
        };
        assert!(chunk.mark("a", ReplicaStatus::Corrupted));
        assert!(!chunk.mark("x", ReplicaStatus::Stale));
        assert_eq!(chunk.active_replicas().count(), 1);
        assert_eq!(ReplicaStatus::Corrupted.to_string(), "CORRUPTED");
    }
}
