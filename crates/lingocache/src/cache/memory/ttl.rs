//! Key-value cache with per-entry TTL.
//!
//! Entries are keyed by `(collection, params)` through the canonical key from
//! `lingocache_core::cache::entity_key`, so equivalent params objects always hit
//! the same entry. When full, the oldest inserted entry is evicted; reads never
//! change the eviction order.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use lru::LruCache;
use serde_json::Value;
use tokio::time::Instant;

use lingocache_core::cache::{collection_prefix, entity_key, hit_rate, CacheStats};

use super::sweeper::Sweeper;
use crate::sync::lock;

/// A single cache entry.
#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    stored_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn new(value: Value, ttl: Duration) -> Self {
        Self {
            value,
            stored_at: Instant::now(),
            ttl,
        }
    }

    /// An entry is fresh while `now - stored_at <= ttl`.
    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) > self.ttl
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    hits: u64,
    misses: u64,
    sets: u64,
    invalidations: u64,
    evictions: u64,
    expirations: u64,
}

#[derive(Debug)]
struct Inner {
    /// Used as an insertion-ordered map: only `peek`/`peek_mut`/`pop_lru` are
    /// called on it, so the "least recently used" end is the oldest insert.
    entries: LruCache<String, CacheEntry>,
    /// Per-collection write counter, see [`TtlCache::write_epoch`].
    epochs: HashMap<String, u64>,
    counters: Counters,
}

impl Inner {
    fn epoch(&self, collection: &str) -> u64 {
        self.epochs.get(collection).copied().unwrap_or(0)
    }

    fn advance_epoch(&mut self, collection: &str) {
        *self.epochs.entry(collection.to_string()).or_insert(0) += 1;
    }
}

/// Thread-safe key-value cache with per-entry TTL and bounded size.
#[derive(Debug)]
pub struct TtlCache {
    inner: Mutex<Inner>,
    max_size: usize,
    default_ttl: Duration,
    sweeper: Mutex<Option<Sweeper>>,
}

impl TtlCache {
    /// Creates a cache holding at most `max_size` entries (at least one).
    pub fn new(max_size: usize, default_ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::unbounded(),
                epochs: HashMap::new(),
                counters: Counters::default(),
            }),
            max_size: max_size.max(1),
            default_ttl,
            sweeper: Mutex::new(None),
        }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Number of entries currently held, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.lock_inner().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Looks up a value. Expired entries are removed and count as a miss.
    pub fn get(&self, collection: &str, params: &Value) -> Option<Value> {
        let key = entity_key(collection, params);
        let now = Instant::now();
        let mut inner = self.lock_inner();

        let lookup = inner
            .entries
            .peek(&key)
            .map(|entry| (!entry.is_expired(now)).then(|| entry.value.clone()));

        match lookup {
            Some(Some(value)) => {
                inner.counters.hits += 1;
                tracing::trace!(%collection, %key, "TTL cache hit");
                Some(value)
            }
            Some(None) => {
                inner.entries.pop(&key);
                inner.counters.misses += 1;
                inner.counters.expirations += 1;
                tracing::trace!(%collection, %key, "TTL cache entry expired");
                None
            }
            None => {
                inner.counters.misses += 1;
                tracing::trace!(%collection, %key, "TTL cache miss");
                None
            }
        }
    }

    /// Stores a value for `ttl`.
    ///
    /// Overwriting an existing key keeps its place in the eviction order. A new
    /// key on a full cache first evicts the oldest inserted entry.
    pub fn set(&self, collection: &str, params: &Value, value: Value, ttl: Duration) {
        let key = entity_key(collection, params);
        let entry = CacheEntry::new(value, ttl);
        self.put(&mut self.lock_inner(), key, entry);
    }

    /// Stores a value only if no write to `collection` happened since `epoch`
    /// was read from [`write_epoch`](Self::write_epoch). Returns whether it was stored.
    ///
    /// Read paths use this to populate the cache with what they fetched, without
    /// overwriting the result of a write that committed while they were fetching.
    pub fn set_if_current(
        &self,
        collection: &str,
        params: &Value,
        value: Value,
        ttl: Duration,
        epoch: u64,
    ) -> bool {
        let key = entity_key(collection, params);
        let mut inner = self.lock_inner();

        if inner.epoch(collection) != epoch {
            tracing::trace!(%collection, %key, "Skipped caching a value read before a write");
            return false;
        }
        self.put(&mut inner, key, CacheEntry::new(value, ttl));
        true
    }

    /// Current write epoch of `collection`. Starts at 0.
    pub fn write_epoch(&self, collection: &str) -> u64 {
        self.lock_inner().epoch(collection)
    }

    /// Marks a write to `collection`, so values read before it are no longer cached
    /// by [`set_if_current`](Self::set_if_current).
    pub fn advance_epoch(&self, collection: &str) {
        self.lock_inner().advance_epoch(collection);
    }

    /// Stores a value for the cache's default TTL.
    pub fn set_default(&self, collection: &str, params: &Value, value: Value) {
        self.set(collection, params, value, self.default_ttl);
    }

    /// Read-through lookup: on a miss, awaits `fetch` and caches a `Some` result.
    ///
    /// The lock is not held while `fetch` runs. Errors from `fetch` are returned
    /// as-is and nothing is cached. Nor is the fetched value if the collection
    /// was written to while `fetch` ran.
    pub async fn get_or_fetch<F, Fut, E>(
        &self,
        collection: &str,
        params: &Value,
        ttl: Duration,
        fetch: F,
    ) -> Result<Option<Value>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<Value>, E>>,
    {
        if let Some(value) = self.get(collection, params) {
            return Ok(Some(value));
        }

        let epoch = self.write_epoch(collection);
        let fetched = fetch().await?;
        if let Some(ref value) = fetched {
            self.set_if_current(collection, params, value.clone(), ttl, epoch);
        }
        Ok(fetched)
    }

    /// Removes every entry of a collection. Returns the number removed.
    ///
    /// Also advances the collection's write epoch.
    pub fn invalidate(&self, collection: &str) -> usize {
        let prefix = collection_prefix(collection);
        let mut inner = self.lock_inner();
        inner.advance_epoch(collection);

        let keys: Vec<String> = inner
            .entries
            .iter()
            .filter(|(key, _)| key.starts_with(&prefix))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &keys {
            inner.entries.pop(key);
        }
        inner.counters.invalidations += keys.len() as u64;

        tracing::debug!(%collection, removed = keys.len(), "Invalidated TTL cache collection");
        keys.len()
    }

    /// Removes a single entry. Returns whether it was present.
    pub fn invalidate_key(&self, collection: &str, params: &Value) -> bool {
        let key = entity_key(collection, params);
        let mut inner = self.lock_inner();

        let removed = inner.entries.pop(&key).is_some();
        if removed {
            inner.counters.invalidations += 1;
        }
        removed
    }

    /// Purges every expired entry. Returns the number removed.
    pub fn cleanup(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.lock_inner();

        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            inner.entries.pop(key);
        }
        inner.counters.expirations += expired.len() as u64;

        if !expired.is_empty() {
            tracing::debug!(removed = expired.len(), "Purged expired TTL cache entries");
        }
        expired.len()
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.lock_inner();
        let c = inner.counters;
        CacheStats {
            hits: c.hits,
            misses: c.misses,
            sets: c.sets,
            invalidations: c.invalidations,
            evictions: c.evictions,
            expirations: c.expirations,
            size: inner.entries.len(),
            max_size: self.max_size,
            hit_rate: hit_rate(c.hits, c.misses),
        }
    }

    pub fn reset_stats(&self) {
        self.lock_inner().counters = Counters::default();
    }

    /// Removes every entry. Counters are kept.
    pub fn clear(&self) {
        self.lock_inner().entries.clear();
    }

    /// Starts purging expired entries every `every` in the background.
    ///
    /// Calling it while a sweeper is already running does nothing.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) {
        let mut slot = lock(&self.sweeper);
        if slot.as_ref().is_some_and(|sweeper| !sweeper.is_finished()) {
            return;
        }
        *slot = Some(Sweeper::spawn(Arc::downgrade(self), every));
    }

    pub fn is_sweeping(&self) -> bool {
        lock(&self.sweeper)
            .as_ref()
            .is_some_and(|sweeper| !sweeper.is_finished())
    }

    /// Stops the sweeper and releases every entry.
    pub fn destroy(&self) {
        if let Some(sweeper) = lock(&self.sweeper).take() {
            sweeper.stop();
        }
        self.clear();
    }

    fn lock_inner(&self) -> MutexGuard<'_, Inner> {
        lock(&self.inner)
    }

    fn put(&self, inner: &mut Inner, key: String, entry: CacheEntry) {
        if let Some(existing) = inner.entries.peek_mut(&key) {
            *existing = entry;
        } else {
            if inner.entries.len() >= self.max_size {
                if let Some((evicted, _)) = inner.entries.pop_lru() {
                    inner.counters.evictions += 1;
                    tracing::trace!(key = %evicted, "Evicted oldest TTL cache entry");
                }
            }
            inner.entries.put(key, entry);
        }

        inner.counters.sets += 1;
    }
}

impl Drop for TtlCache {
    fn drop(&mut self) {
        if let Some(sweeper) = lock(&self.sweeper).take() {
            sweeper.stop();
        }
    }
}
