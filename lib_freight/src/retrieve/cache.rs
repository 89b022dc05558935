//! # Response Cache
//!
//! A string-keyed map of values with a per-entry time-to-live. Expiry is
//! checked on every read and expired entries are evicted lazily at that
//! point; there is no background sweep.
//!
//! The cache is unbounded by default. [`ResponseCache::bounded`] caps the
//! entry count, evicting the entry stored earliest when a new key arrives
//! at capacity.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

/// TTL applied by [`ResponseCache::set_default`].
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    stored_at: Instant,
    ttl: Duration,
}

impl<V> CacheEntry<V> {
    fn is_live(&self, now: Instant) -> bool {
        now.duration_since(self.stored_at) < self.ttl
    }
}

/// # TTL Cache
///
/// Owned by a single `RequestClient`; callers wanting a shared cache wrap
/// it themselves.
#[derive(Debug)]
pub struct ResponseCache<V> {
    entries: HashMap<String, CacheEntry<V>>,
    max_entries: Option<usize>,
}

impl<V: Clone> Default for ResponseCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone> ResponseCache<V> {
    /// Creates an unbounded cache.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            max_entries: None,
        }
    }

    /// Creates a cache holding at most `max_entries` entries.
    pub fn bounded(max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            max_entries: Some(max_entries.max(1)),
        }
    }

    /// Stores `value` under `key` for `ttl`, replacing any previous entry.
    pub fn set(&mut self, key: impl Into<String>, value: V, ttl: Duration) {
        let key = key.into();
        if let Some(max) = self.max_entries {
            if !self.entries.contains_key(&key) && self.entries.len() >= max {
                self.evict_oldest();
            }
        }
        self.entries.insert(
            key,
            CacheEntry {
                value,
                stored_at: Instant::now(),
                ttl,
            },
        );
    }

    /// Stores `value` with the five minute default TTL.
    pub fn set_default(&mut self, key: impl Into<String>, value: V) {
        self.set(key, value, DEFAULT_TTL);
    }

    /// Returns a live value, evicting the entry if it has expired.
    pub fn get(&mut self, key: &str) -> Option<V> {
        let now = Instant::now();
        match self.entries.get(key) {
            Some(entry) if entry.is_live(now) => Some(entry.value.clone()),
            Some(_) => {
                log::trace!("Cache entry '{}' expired", key);
                self.entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Drops a single entry.
    pub fn remove(&mut self, key: &str) -> Option<V> {
        self.entries.remove(key).map(|e| e.value)
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of stored entries, expired ones included until they are read.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, e)| e.stored_at)
            .map(|(k, _)| k.clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }
}
