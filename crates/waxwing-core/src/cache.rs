//! TTL memoization of decoded key records.
//!
//! Sans-IO: callers pass the current instant. Reads extend an entry's
//! lifetime; [`KeyCache::sweep`] evicts entries idle for longer than the TTL.

use std::{collections::HashMap, time::Duration};

use waxwing_crypto::KeyRecord;

struct CacheEntry<I> {
    record: KeyRecord,
    touched: I,
}

/// Decoded records keyed by rendered storage name.
pub struct KeyCache<I> {
    ttl: Duration,
    entries: HashMap<String, CacheEntry<I>>,
}

impl<I> KeyCache<I>
where
    I: Copy + Ord + std::ops::Sub<Output = Duration>,
{
    /// Empty cache with the given entry lifetime.
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entries: HashMap::new() }
    }

    /// Cached record, if present and not expired. Extends the entry's
    /// lifetime.
    pub fn get(&mut self, name: &str, now: I) -> Option<KeyRecord> {
        let expired = match self.entries.get_mut(name) {
            None => return None,
            Some(entry) if now - entry.touched >= self.ttl => true,
            Some(entry) => {
                entry.touched = now;
                false
            },
        };

        if expired {
            self.entries.remove(name);
            return None;
        }
        self.entries.get(name).map(|entry| entry.record.clone())
    }

    /// Insert or replace.
    pub fn insert(&mut self, name: String, record: KeyRecord, now: I) {
        self.entries.insert(name, CacheEntry { record, touched: now });
    }

    /// Drop one entry.
    pub fn remove(&mut self, name: &str) {
        self.entries.remove(name);
    }

    /// Evict every entry idle for at least the TTL. Returns the number
    /// evicted.
    pub fn sweep(&mut self, now: I) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries.retain(|_, entry| now - entry.touched < ttl);
        before - self.entries.len()
    }

    /// Number of live and not-yet-swept entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds nothing.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
