//! Cache Engine Module
//!
//! Process-local key-value engine combining HashMap storage with LRU tracking,
//! TTL expiration and a byte memory cap. It plays the role Redis plays for the
//! networked backend: eviction policy lives here, not in the cache layer.

use std::collections::HashMap;
use std::time::Duration;

use crate::cache::{CacheEntry, CacheStats, LruTracker, MAX_KEY_LENGTH};
use crate::error::CacheError;

// == Cache Engine ==
/// Key-value storage with LRU eviction under a memory ceiling.
#[derive(Debug)]
pub struct CacheEngine {
    /// Key-value storage
    entries: HashMap<String, CacheEntry>,
    /// LRU access tracker
    lru: LruTracker,
    /// Performance statistics
    stats: CacheStats,
    /// Sum of entry footprints
    used_bytes: usize,
    /// Memory ceiling in bytes
    max_bytes: usize,
}

impl CacheEngine {
    // == Constructor ==
    /// Creates an engine that keeps at most `max_bytes` of keys and values.
    pub fn new(max_bytes: usize) -> Self {
        Self {
            entries: HashMap::new(),
            lru: LruTracker::new(),
            stats: CacheStats::new(),
            used_bytes: 0,
            max_bytes,
        }
    }

    // == Set ==
    /// Stores a value under `key`, replacing any existing entry and its TTL.
    ///
    /// Least recently used entries are evicted until the new entry fits.
    /// An entry larger than the whole cap is rejected.
    pub fn set(&mut self, key: String, value: String, ttl: Duration) -> Result<(), CacheError> {
        if key.is_empty() || key.len() > MAX_KEY_LENGTH {
            return Err(CacheError::Rejected(format!(
                "key length must be between 1 and {} bytes",
                MAX_KEY_LENGTH
            )));
        }

        let entry = CacheEntry::new(value, ttl);
        let footprint = entry.footprint(&key);
        if footprint > self.max_bytes {
            return Err(CacheError::Rejected(format!(
                "entry of {} bytes exceeds memory cap of {} bytes",
                footprint, self.max_bytes
            )));
        }

        // Overwrite releases the old footprint first
        self.remove_entry(&key);

        while self.used_bytes + footprint > self.max_bytes {
            match self.lru.evict_oldest() {
                Some(evicted) => {
                    if let Some(old) = self.entries.remove(&evicted) {
                        self.used_bytes -= old.footprint(&evicted);
                    }
                    self.stats.record_eviction();
                }
                None => break,
            }
        }

        self.used_bytes += footprint;
        self.lru.touch(&key);
        self.entries.insert(key, entry);

        Ok(())
    }

    // == Get ==
    /// Returns the live value under `key`, or None when absent or expired.
    ///
    /// Expired entries are dropped on access.
    pub fn get(&mut self, key: &str) -> Option<String> {
        let expired = match self.entries.get(key) {
            Some(entry) => entry.is_expired(),
            None => {
                self.stats.record_miss();
                return None;
            }
        };

        if expired {
            self.remove_entry(key);
            self.stats.record_miss();
            return None;
        }

        self.stats.record_hit();
        self.lru.touch(key);
        self.entries.get(key).map(|entry| entry.value.clone())
    }

    // == Stats ==
    /// Returns current engine statistics.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.total_entries = self.entries.len();
        stats.used_bytes = self.used_bytes;
        stats
    }

    // == Cleanup Expired ==
    /// Removes all expired entries, returning how many were dropped.
    pub fn cleanup_expired(&mut self) -> usize {
        let expired_keys: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired())
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired_keys {
            self.remove_entry(key);
        }

        expired_keys.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn used_bytes(&self) -> usize {
        self.used_bytes
    }

    fn remove_entry(&mut self, key: &str) {
        if let Some(old) = self.entries.remove(key) {
            self.used_bytes -= old.footprint(key);
            self.lru.remove(key);
        }
    }
}
