//! LRU Cache Module
//!
//! Thread-safe cache engine combining HashMap storage with LRU tracking, TTL
//! expiration and an optional JSON file mirror.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::{
    current_timestamp, CacheEntry, CachePersistence, CacheStats, LruTracker, MemoryUsage,
    PersistMode,
};

// == Cache Inner ==
/// State guarded by the cache lock.
#[derive(Debug)]
struct CacheInner {
    /// Key-value storage
    entries: HashMap<String, CacheEntry>,
    /// LRU access tracker
    lru: LruTracker,
    /// Performance counters
    stats: CacheStats,
    /// Maximum number of entries allowed
    max_size: usize,
    /// Unsaved mutations pending for a deferred mirror
    dirty: bool,
}

impl CacheInner {
    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let removed = self.entries.remove(key);
        if removed.is_some() {
            self.lru.remove(key);
        }
        removed
    }

    /// Evicts LRU entries until there is room for `reserve` more.
    fn evict_to_fit(&mut self, reserve: usize) {
        while !self.entries.is_empty() && self.entries.len() + reserve > self.max_size {
            let Some(oldest) = self.lru.evict_oldest() else {
                break;
            };
            self.entries.remove(&oldest);
            self.stats.record_eviction();
            debug!(key = %oldest, "Evicted least recently used entry");
        }
    }
}

// == LRU Cache ==
/// Fixed-capacity cache with LRU eviction and TTL support.
///
/// Every operation holds the cache lock for its full duration, so operations
/// on one cache are linearized. Persistence failures never surface to callers.
#[derive(Debug)]
pub struct LruCache {
    inner: Mutex<CacheInner>,
    /// Default TTL for entries stored without an explicit TTL
    default_ttl: Duration,
    /// Optional JSON mirror
    persistence: Option<CachePersistence>,
}

impl LruCache {
    // == Constructor ==
    /// Creates an in-memory cache with the given capacity and default TTL.
    ///
    /// A capacity of zero is raised to one.
    pub fn new(max_size: usize, default_ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                lru: LruTracker::new(),
                stats: CacheStats::new(),
                max_size: max_size.max(1),
                dirty: false,
            }),
            default_ttl,
            persistence: None,
        }
    }

    /// Creates a cache mirrored to a JSON file, loading any live entries it
    /// already holds.
    pub fn with_persistence(
        max_size: usize,
        default_ttl: Duration,
        persistence: CachePersistence,
    ) -> Self {
        let mut cache = Self::new(max_size, default_ttl);
        let loaded = persistence.load(current_timestamp());
        {
            let inner = cache.inner.get_mut().unwrap_or_else(|e| e.into_inner());
            for (key, entry) in loaded {
                inner.evict_to_fit(1);
                inner.lru.touch(&key);
                inner.entries.insert(key, entry);
            }
            inner.stats.reset_counters();
        }
        cache.persistence = Some(persistence);
        cache
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Records a mutation, writing the mirror immediately in write-through mode.
    fn persist(&self, inner: &mut CacheInner) {
        let Some(persistence) = &self.persistence else {
            return;
        };
        match persistence.mode() {
            PersistMode::WriteThrough => {
                Self::write_snapshot(persistence, inner);
            }
            PersistMode::Deferred => inner.dirty = true,
        }
    }

    fn write_snapshot(persistence: &CachePersistence, inner: &mut CacheInner) {
        let ordered = inner
            .lru
            .iter_oldest_first()
            .filter_map(|key| inner.entries.get_key_value(key));
        if persistence.save(ordered, current_timestamp()) {
            inner.dirty = false;
        } else {
            inner.dirty = true;
        }
    }

    // == Get ==
    /// Retrieves a value by key.
    ///
    /// Absent and expired keys return None and count as misses; expired
    /// entries are removed as a side effect.
    pub fn get(&self, key: &str) -> Option<Value> {
        let mut guard = self.lock();
        let inner = &mut *guard;

        let expired = match inner.entries.get(key) {
            None => {
                inner.stats.record_miss();
                return None;
            }
            Some(entry) => entry.is_expired(),
        };

        if expired {
            inner.remove(key);
            inner.stats.record_expires(1);
            inner.stats.record_miss();
            return None;
        }

        let value = inner.entries.get_mut(key).map(|entry| {
            entry.access();
            entry.value.clone()
        });
        inner.lru.touch(key);
        inner.stats.record_hit();
        value
    }

    /// Retrieves and deserializes a value, treating a shape mismatch as absent.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(key)?;
        match serde_json::from_value(value) {
            Ok(typed) => Some(typed),
            Err(e) => {
                debug!(key = %key, error = %e, "Cached value has unexpected shape");
                None
            }
        }
    }

    /// Checks for a live entry without touching LRU order or counters.
    pub fn contains(&self, key: &str) -> bool {
        self.lock()
            .entries
            .get(key)
            .is_some_and(|entry| !entry.is_expired())
    }

    // == Set ==
    /// Stores a value, using the default TTL when none is given.
    ///
    /// Overwriting an existing key resets its timestamps and counters. A new
    /// key evicts least recently used entries while the cache is full.
    pub fn set(&self, key: &str, value: Value, ttl: Option<Duration>) {
        let ttl = ttl.unwrap_or(self.default_ttl);
        let mut guard = self.lock();
        let inner = &mut *guard;

        if !inner.entries.contains_key(key) {
            inner.evict_to_fit(1);
        }

        inner.entries.insert(key.to_string(), CacheEntry::new(value, ttl));
        inner.lru.touch(key);
        self.persist(inner);
    }

    /// Serializes and stores a value; unserializable values are skipped.
    pub fn set_as<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) {
        match serde_json::to_value(value) {
            Ok(value) => self.set(key, value, ttl),
            Err(e) => warn!(key = %key, error = %e, "Value not cacheable"),
        }
    }

    // == Delete ==
    /// Removes an entry by key, returning whether it was present.
    pub fn delete(&self, key: &str) -> bool {
        let mut guard = self.lock();
        let inner = &mut *guard;
        if inner.remove(key).is_some() {
            self.persist(inner);
            true
        } else {
            false
        }
    }

    // == Clear ==
    /// Empties the cache and resets every counter.
    pub fn clear(&self) {
        let mut guard = self.lock();
        let inner = &mut *guard;
        inner.entries.clear();
        inner.lru.clear();
        inner.stats.reset_counters();
        self.persist(inner);
    }

    // == Cleanup Expired ==
    /// Removes all expired entries, returning how many were dropped.
    pub fn cleanup_expired(&self) -> usize {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let now = current_timestamp();

        let expired_keys: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired_keys {
            inner.remove(key);
        }
        inner.stats.record_expires(expired_keys.len());

        if !expired_keys.is_empty() {
            self.persist(inner);
        }
        expired_keys.len()
    }

    // == Invalidate Matching ==
    /// Deletes every key containing `pattern`; an empty pattern matches all.
    pub fn invalidate_matching(&self, pattern: &str) -> usize {
        let mut guard = self.lock();
        let inner = &mut *guard;

        let matching: Vec<String> = inner
            .entries
            .keys()
            .filter(|key| key.contains(pattern))
            .cloned()
            .collect();

        for key in &matching {
            inner.remove(key);
        }

        if !matching.is_empty() {
            self.persist(inner);
        }
        matching.len()
    }

    // == Stats ==
    /// Returns a snapshot of counters and size.
    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        let mut stats = inner.stats.clone();
        stats.size = inner.entries.len();
        stats.max_size = inner.max_size;
        stats
    }

    /// Estimates memory held by keys and serialized values.
    pub fn memory_usage(&self) -> MemoryUsage {
        let inner = self.lock();
        let estimated_bytes = inner
            .entries
            .iter()
            .map(|(key, entry)| key.len() + entry.value.to_string().len())
            .sum();

        MemoryUsage {
            estimated_bytes,
            entries_count: inner.entries.len(),
        }
    }

    // == Capacity ==
    pub fn max_size(&self) -> usize {
        self.lock().max_size
    }

    /// Changes capacity, evicting LRU entries if the cache is now over it.
    pub fn set_max_size(&self, max_size: usize) {
        let mut guard = self.lock();
        let inner = &mut *guard;
        inner.max_size = max_size.max(1);
        let before = inner.entries.len();
        inner.evict_to_fit(0);
        if inner.entries.len() != before {
            self.persist(inner);
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Keys from least to most recently used.
    pub fn keys(&self) -> Vec<String> {
        self.lock().lru.iter_oldest_first().cloned().collect()
    }

    // == Flush ==
    /// Writes the mirror if mutations are pending. Returns whether a write
    /// happened.
    pub fn flush(&self) -> bool {
        let Some(persistence) = &self.persistence else {
            return false;
        };
        let mut guard = self.lock();
        let inner = &mut *guard;
        if !inner.dirty {
            return false;
        }
        Self::write_snapshot(persistence, inner);
        true
    }

    pub fn is_dirty(&self) -> bool {
        self.lock().dirty
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }
}
