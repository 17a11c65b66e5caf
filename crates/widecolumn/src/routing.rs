//! Row-key → shard routing
//!
//! A router is fixed when the store is built. Keys never move between
//! shards; what changes at runtime is which server owns a shard
//! (see `WideColumnStore::reassign_shard`).

use std::ops::Range;
use xxhash_rust::xxh3::xxh3_64;

/// Maps row keys onto a fixed set of shards
pub trait ShardRouter: Send + Sync + std::fmt::Debug {
    /// Number of shards this router distributes over
    fn shard_count(&self) -> usize;

    /// Owning shard of `row_key`, always `< shard_count()`
    fn route(&self, row_key: &str) -> usize;

    /// Shards that may hold keys in `[start, end)`
    ///
    /// `None` for `end` means unbounded. Hash routing cannot prune, so the
    /// default returns every shard.
    fn shards_for_range(&self, _start: &str, _end: Option<&str>) -> Vec<usize> {
        (0..self.shard_count()).collect()
    }

    /// Short name for logs and stats
    fn name(&self) -> &'static str;
}

/// `xxh3(key) mod shard_count`
#[derive(Debug, Clone)]
pub struct HashRouter {
    shard_count: usize,
}

impl HashRouter {
    /// Create a hash router; a zero shard count is clamped to one
    pub fn new(shard_count: usize) -> Self {
        Self {
            shard_count: shard_count.max(1),
        }
    }
}

impl ShardRouter for HashRouter {
    fn shard_count(&self) -> usize {
        self.shard_count
    }

    #[inline]
    fn route(&self, row_key: &str) -> usize {
        (xxh3_64(row_key.as_bytes()) % self.shard_count as u64) as usize
    }

    fn name(&self) -> &'static str {
        "hash"
    }
}

/// Ordered split points: shard `i` owns `[split[i-1], split[i])`
///
/// With split points `["g", "p"]` there are three shards:
/// `[.., "g")`, `["g", "p")`, `["p", ..)`.
#[derive(Debug, Clone)]
pub struct RangeRouter {
    splits: Vec<String>,
}

impl RangeRouter {
    /// Create a range router; split points are sorted and deduplicated
    pub fn new(mut splits: Vec<String>) -> Self {
        splits.sort();
        splits.dedup();
        Self { splits }
    }

    /// Split points in order
    pub fn splits(&self) -> &[String] {
        &self.splits
    }

    fn key_range(&self, shard: usize) -> Range<Option<&str>> {
        let start = shard
            .checked_sub(1)
            .and_then(|i| self.splits.get(i))
            .map(String::as_str);
        let end = self.splits.get(shard).map(String::as_str);
        start..end
    }
}

impl ShardRouter for RangeRouter {
    fn shard_count(&self) -> usize {
        self.splits.len() + 1
    }

    fn route(&self, row_key: &str) -> usize {
        self.splits.partition_point(|split| split.as_str() <= row_key)
    }

    fn shards_for_range(&self, start: &str, end: Option<&str>) -> Vec<usize> {
        (0..self.shard_count())
            .filter(|&shard| {
                let owned = self.key_range(shard);
                // owned.end is exclusive; a shard intersects if it starts
                // before the scan ends and ends after the scan starts
                let starts_before_end = match (owned.start, end) {
                    (Some(s), Some(e)) => s < e,
                    _ => true,
                };
                let ends_after_start = owned.end.map_or(true, |e| e > start);
                starts_before_end && ends_after_start
            })
            .collect()
    }

    fn name(&self) -> &'static str {
        "range"
    }
}
