//! Chunk holders: the machines that store chunk replicas
//!
//! The object store only talks to holders through [`ChunkHolder`], so a
//! holder may be in-process memory, a local directory or a remote server.
//! [`MemoryChunkHolder`] is the in-process implementation and supports
//! fault injection for tests.

use crate::checksum::verify_checksum;
use bytes::Bytes;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use streamvault_core::{Error, Result};
use tracing::debug;

/// Storage counters of one holder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HolderStats {
    /// Holder id
    pub holder_id: String,
    /// Failure domain
    pub zone: String,
    /// Whether the holder currently answers requests
    pub online: bool,
    /// Chunk replicas stored
    pub chunk_count: usize,
    /// Bytes stored across replicas
    pub bytes_stored: u64,
}

/// A node that stores chunk replicas
pub trait ChunkHolder: Send + Sync + Debug {
    /// Stable holder id
    fn id(&self) -> &str;

    /// Failure domain (datacenter, rack)
    fn zone(&self) -> &str;

    /// Whether the holder currently answers requests
    fn is_online(&self) -> bool;

    /// Store a replica; the holder verifies `checksum` before accepting
    fn write_chunk(&self, chunk_id: &str, data: Bytes, checksum: &str) -> Result<()>;

    /// Return the stored bytes, unverified
    fn read_chunk(&self, chunk_id: &str) -> Result<Bytes>;

    /// Drop a replica; returns whether it existed
    fn delete_chunk(&self, chunk_id: &str) -> Result<bool>;

    /// Ids of every stored replica
    fn chunk_ids(&self) -> Vec<String>;

    /// Current counters
    fn stats(&self) -> HolderStats;
}

/// In-memory chunk holder with fault injection
#[derive(Debug)]
pub struct MemoryChunkHolder {
    id: String,
    zone: String,
    chunks: RwLock<FxHashMap<String, Bytes>>,
    online: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryChunkHolder {
    /// Create an online holder in `zone`
    pub fn new(id: impl Into<String>, zone: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            zone: zone.into(),
            chunks: RwLock::new(FxHashMap::default()),
            online: AtomicBool::new(true),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Take the holder offline or bring it back
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::Release);
    }

    /// Make every subsequent write and delete fail while reads keep working
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Release);
    }

    /// Flip the first byte of a stored replica; returns whether it existed
    pub fn corrupt_chunk(&self, chunk_id: &str) -> bool {
        let mut chunks = self.chunks.write();
        let Some(data) = chunks.get_mut(chunk_id) else {
            return false;
        };
        let mut bytes = data.to_vec();
        match bytes.first_mut() {
            Some(first) => *first ^= 0xFF,
            None => bytes.push(0),
        }
        *data = Bytes::from(bytes);
        true
    }

    fn ensure_online(&self) -> Result<()> {
        if self.online.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(Error::HolderUnavailable(self.id.clone()))
        }
    }
}

impl ChunkHolder for MemoryChunkHolder {
    fn id(&self) -> &str {
        &self.id
    }

    fn zone(&self) -> &str {
        &self.zone
    }

    fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    fn write_chunk(&self, chunk_id: &str, data: Bytes, checksum: &str) -> Result<()> {
        self.ensure_online()?;
        if self.fail_writes.load(Ordering::Acquire) {
            return Err(Error::HolderUnavailable(format!(
                "{} rejected write of {}",
                self.id, chunk_id
            )));
        }
        verify_checksum(chunk_id, &data, checksum)?;
        debug!(
            target: "streamvault::objects",
            holder = %self.id,
            chunk_id,
            size = data.len(),
            "Stored replica"
        );
        self.chunks.write().insert(chunk_id.to_string(), data);
        Ok(())
    }

    fn read_chunk(&self, chunk_id: &str) -> Result<Bytes> {
        self.ensure_online()?;
        self.chunks
            .read()
            .get(chunk_id)
            .cloned()
            .ok_or_else(|| Error::ChunkNotFound {
                chunk_id: chunk_id.to_string(),
                holder: self.id.clone(),
            })
    }

    fn delete_chunk(&self, chunk_id: &str) -> Result<bool> {
        self.ensure_online()?;
        if self.fail_writes.load(Ordering::Acquire) {
            return Err(Error::HolderUnavailable(format!(
                "{} rejected delete of {}",
                self.id, chunk_id
            )));
        }
        Ok(self.chunks.write().remove(chunk_id).is_some())
    }

    fn chunk_ids(&self) -> Vec<String> {
        self.chunks.read().keys().cloned().collect()
    }

    fn stats(&self) -> HolderStats {
        let chunks = self.chunks.read();
        HolderStats {
            holder_id: self.id.clone(),
            zone: self.zone.clone(),
            online: self.is_online(),
            chunk_count: chunks.len(),
            bytes_stored: chunks.values().map(|c| c.len() as u64).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::compute_checksum;

    fn put(holder: &MemoryChunkHolder, id: &str, data: &'static [u8]) -> Result<()> {
        holder.write_chunk(id, Bytes::from_static(data), &compute_checksum(data))
    }

    #[test]
    fn test_write_read_delete() {
        let holder = MemoryChunkHolder::new("chunkserver-0", "datacenter-0");
        put(&holder, "c1", b"hello").unwrap();
        assert_eq!(holder.read_chunk("c1").unwrap(), Bytes::from_static(b"hello"));
        assert_eq!(holder.stats().bytes_stored, 5);
        assert!(holder.delete_chunk("c1").unwrap());
        assert!(!holder.delete_chunk("c1").unwrap());
        assert!(matches!(
            holder.read_chunk("c1"),
            Err(Error::ChunkNotFound { .. })
        ));
    }

    #[test]
    fn test_rejects_bad_checksum() {
        let holder = MemoryChunkHolder::new("h", "z");
        let err = holder
            .write_chunk("c1", Bytes::from_static(b"a"), &compute_checksum(b"b"))
            .unwrap_err();
        assert!(matches!(err, Error::ChecksumMismatch { .. }));
        assert!(holder.chunk_ids().is_empty());
    }

    #[test]
    fn test_fault_injection() {
        let holder = MemoryChunkHolder::new("h", "z");
        put(&holder, "c1", b"data").unwrap();

        holder.fail_writes(true);
        assert!(put(&holder, "c2", b"more").is_err());
        assert!(holder.delete_chunk("c1").is_err());
        assert!(holder.read_chunk("c1").is_ok());
        holder.fail_writes(false);

        holder.set_online(false);
        assert!(matches!(
            holder.read_chunk("c1"),
            Err(Error::HolderUnavailable(_))
        ));
        assert!(!holder.stats().online);
        holder.set_online(true);

        assert!(holder.corrupt_chunk("c1"));
        assert_ne!(holder.read_chunk("c1").unwrap(), Bytes::from_static(b"data"));
        assert!(!holder.corrupt_chunk("missing"));
    }
}
