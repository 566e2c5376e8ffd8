//! Query-result cache with least-recently-used eviction.
//!
//! Keys are opaque strings (see `lingocache_core::cache::query_key`). Recency is
//! kept by the `lru` crate's linked list, so finding the eviction victim is O(1)
//! instead of a scan for the oldest `last_accessed_at`.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use lru::LruCache;
use regex::Regex;
use serde_json::Value;
use tokio::time::Instant;

use lingocache_core::cache::{CacheError, QueryCacheStats, Result};

use crate::sync::lock;

/// A cached query result.
#[derive(Debug, Clone)]
struct QueryCacheEntry {
    result: Value,
    stored_at: Instant,
    access_count: u64,
    last_accessed_at: Instant,
}

impl QueryCacheEntry {
    fn new(result: Value) -> Self {
        let now = Instant::now();
        Self {
            result,
            stored_at: now,
            access_count: 0,
            last_accessed_at: now,
        }
    }

    fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.stored_at) > ttl
    }
}

#[derive(Debug)]
struct Inner {
    entries: LruCache<String, QueryCacheEntry>,
    epochs: HashMap<String, u64>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

/// Thread-safe LRU cache for query results.
#[derive(Debug)]
pub struct LruQueryCache {
    inner: Mutex<Inner>,
    max_entries: usize,
    default_ttl: Duration,
}

impl LruQueryCache {
    /// Creates a cache holding at most `max_entries` results (at least one).
    pub fn new(max_entries: usize, default_ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::unbounded(),
                epochs: HashMap::new(),
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
            max_entries: max_entries.max(1),
            default_ttl,
        }
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Looks up a result, aging it out after `ttl_override` or the default TTL.
    ///
    /// A hit marks the entry as most recently used.
    pub fn get(&self, key: &str, ttl_override: Option<Duration>) -> Option<Value> {
        let ttl = ttl_override.unwrap_or(self.default_ttl);
        let now = Instant::now();
        let mut inner = self.lock_inner();

        match inner.entries.peek(key).map(|entry| entry.is_expired(now, ttl)) {
            None => {
                inner.misses += 1;
                tracing::trace!(%key, "Query cache miss");
                return None;
            }
            Some(true) => {
                inner.entries.pop(key);
                inner.misses += 1;
                tracing::trace!(%key, "Query cache entry expired");
                return None;
            }
            Some(false) => {}
        }

        let result = inner.entries.get_mut(key).map(|entry| {
            entry.access_count += 1;
            entry.last_accessed_at = now;
            entry.result.clone()
        });
        inner.hits += 1;
        tracing::trace!(%key, "Query cache hit");
        result
    }

    /// Stores a result, evicting the least recently used entry when full.
    pub fn set(&self, key: &str, result: Value) {
        self.put(&mut self.lock_inner(), key, result);
    }

    /// Stores a result only if `collection` was not written to since `epoch` was
    /// read from [`write_epoch`](Self::write_epoch). Returns whether it was stored.
    pub fn set_if_current(&self, key: &str, result: Value, collection: &str, epoch: u64) -> bool {
        let mut inner = self.lock_inner();

        if inner.epochs.get(collection).copied().unwrap_or(0) != epoch {
            tracing::trace!(%key, %collection, "Skipped caching a query result read before a write");
            return false;
        }
        self.put(&mut inner, key, result);
        true
    }

    /// Current write epoch of `collection`. Starts at 0.
    pub fn write_epoch(&self, collection: &str) -> u64 {
        self.lock_inner()
            .epochs
            .get(collection)
            .copied()
            .unwrap_or(0)
    }

    /// Marks a write to `collection`. Results read before it are then refused by
    /// [`set_if_current`](Self::set_if_current).
    pub fn advance_epoch(&self, collection: &str) {
        *self
            .lock_inner()
            .epochs
            .entry(collection.to_string())
            .or_insert(0) += 1;
    }

    /// Returns whether a fresh entry exists, without touching its recency.
    pub fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        self.lock_inner()
            .entries
            .peek(key)
            .is_some_and(|entry| !entry.is_expired(now, self.default_ttl))
    }

    /// Removes every key matching the regular expression. Returns the number removed.
    pub fn invalidate_pattern(&self, pattern: &str) -> Result<usize> {
        let regex = Regex::new(pattern).map_err(|e| CacheError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        Ok(self.invalidate_regex(&regex))
    }

    /// Removes every key matching a precompiled regular expression.
    pub fn invalidate_regex(&self, regex: &Regex) -> usize {
        let mut inner = self.lock_inner();

        let keys: Vec<String> = inner
            .entries
            .iter()
            .filter(|(key, _)| regex.is_match(key))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &keys {
            inner.entries.pop(key);
        }

        tracing::debug!(pattern = %regex, removed = keys.len(), "Invalidated query cache entries");
        keys.len()
    }

    pub fn size(&self) -> usize {
        self.lock_inner().entries.len()
    }

    pub fn clear(&self) {
        self.lock_inner().entries.clear();
    }

    pub fn stats(&self) -> QueryCacheStats {
        let inner = self.lock_inner();
        QueryCacheStats {
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
            size: inner.entries.len(),
            max_entries: self.max_entries,
        }
    }

    fn lock_inner(&self) -> MutexGuard<'_, Inner> {
        lock(&self.inner)
    }

    fn put(&self, inner: &mut Inner, key: &str, result: Value) {
        if !inner.entries.contains(key) && inner.entries.len() >= self.max_entries {
            if let Some((evicted, entry)) = inner.entries.pop_lru() {
                inner.evictions += 1;
                tracing::trace!(
                    key = %evicted,
                    access_count = entry.access_count,
                    idle_ms = entry.last_accessed_at.elapsed().as_millis() as u64,
                    "Evicted least recently used query"
                );
            }
        }
        inner
            .entries
            .put(key.to_string(), QueryCacheEntry::new(result));
    }
}
