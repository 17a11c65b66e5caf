//! Exclusive row locks taken during prepare
//!
//! One lock table per database, keyed by (table, row key). A waiter blocks
//! on a condition variable for at most the configured timeout; if the lock
//! is still held when the timeout expires the acquisition fails with
//! `LockConflict` naming the holder.

use crate::schema::RowKey;
use crate::transaction::TxnId;
use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashMap;
use std::time::{Duration, Instant};
use streamvault_core::{Error, Result};

/// (table, key) address of a lock
pub type LockKey = (String, RowKey);

/// Row lock table
#[derive(Debug, Default)]
pub struct LockTable {
    held: Mutex<FxHashMap<LockKey, TxnId>>,
    released: Condvar,
}

impl LockTable {
    /// Create an empty lock table
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire `key` for `txn_id`, waiting at most `timeout`
    ///
    /// Re-acquiring a lock the transaction already holds succeeds
    /// immediately.
    pub fn acquire(&self, key: &LockKey, txn_id: TxnId, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut held = self.held.lock();
        loop {
            match held.get(key) {
                None => {
                    held.insert(key.clone(), txn_id);
                    return Ok(());
                }
                Some(&holder) if holder == txn_id => return Ok(()),
                Some(_) => {
                    if self.released.wait_until(&mut held, deadline).timed_out() {
                        // one last look: the release may have raced the timeout
                        match held.get(key) {
                            None => {
                                held.insert(key.clone(), txn_id);
                                return Ok(());
                            }
                            Some(&current) if current == txn_id => return Ok(()),
                            Some(&current) => {
                                return Err(Error::LockConflict {
                                    table: key.0.clone(),
                                    key: key.1.to_string(),
                                    holder: current,
                                })
                            }
                        }
                    }
                }
            }
        }
    }

    /// Acquire every key in a stable order; on failure nothing stays held
    pub fn acquire_all(&self, keys: &[LockKey], txn_id: TxnId, timeout: Duration) -> Result<()> {
        let mut sorted: Vec<&LockKey> = keys.iter().collect();
        sorted.sort();
        sorted.dedup();
        let mut taken: Vec<LockKey> = Vec::with_capacity(sorted.len());
        for key in sorted {
            if let Err(e) = self.acquire(key, txn_id, timeout) {
                self.release_all(&taken, txn_id);
                return Err(e);
            }
            taken.push(key.clone());
        }
        Ok(())
    }

    /// Release the given keys if `txn_id` holds them and wake waiters
    pub fn release_all(&self, keys: &[LockKey], txn_id: TxnId) {
        if keys.is_empty() {
            return;
        }
        {
            let mut held = self.held.lock();
            for key in keys {
                if held.get(key) == Some(&txn_id) {
                    held.remove(key);
                }
            }
        }
        self.released.notify_all();
    }

    /// Current holder of `key`
    pub fn holder(&self, key: &LockKey) -> Option<TxnId> {
        self.held.lock().get(key).copied()
    }

    /// Number of locks currently held
    pub fn held_count(&self) -> usize {
        self.held.lock().len()
    }
}
