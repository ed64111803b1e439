//! Line deduplication
//!
//! Every modification event re-reads a file from the start, so the pipeline
//! remembers the hashes of lines it already handled. The set is bounded: once
//! it grows past its capacity it is cleared in one go. After a clear, or on a
//! hash collision, an old line can be emitted again; callers must tolerate
//! the occasional duplicate record.

use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::info;

/// Maximum number of remembered hashes before the set is reset
pub const DEFAULT_DEDUP_CAPACITY: usize = 100_000;

/// Content hash of a raw line, as read from the file
pub fn hash_line(line: &str) -> u64 {
    let digest = Sha256::digest(line.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

/// Process-lifetime set of processed line hashes
#[derive(Debug)]
pub struct LineDeduplicator {
    hashes: Mutex<HashSet<u64>>,
    capacity: usize,
}

impl Default for LineDeduplicator {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_CAPACITY)
    }
}

impl LineDeduplicator {
    /// Create a deduplicator that resets after `capacity` entries
    pub fn new(capacity: usize) -> Self {
        Self {
            hashes: Mutex::new(HashSet::new()),
            capacity,
        }
    }

    pub fn seen(&self, hash: u64) -> bool {
        self.lock().contains(&hash)
    }

    /// Remember `hash`, clearing the whole set if it is now over capacity
    pub fn mark_seen(&self, hash: u64) {
        let mut hashes = self.lock();
        hashes.insert(hash);
        if hashes.len() > self.capacity {
            info!("Dedup set exceeded {} entries, clearing it", self.capacity);
            hashes.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<u64>> {
        self.hashes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
