use serde::Serialize;

/// Returns `hits / (hits + misses)`, or `0.0` when nothing was looked up yet.
pub fn hit_rate(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64
    }
}

/// Snapshot of the key-value TTL cache counters.
///
/// Counters only grow until the owning cache resets them; `size` is the number
/// of entries held at the time of the snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub invalidations: u64,
    /// Entries dropped to make room for a new one.
    pub evictions: u64,
    /// Entries dropped because their TTL elapsed (on read or by the sweeper).
    pub expirations: u64,
    pub size: usize,
    pub max_size: usize,
    pub hit_rate: f64,
}

impl CacheStats {
    /// Total number of lookups recorded.
    pub fn lookups(&self) -> u64 {
        self.hits + self.misses
    }

    /// Fraction of `max_size` currently in use.
    pub fn fill_ratio(&self) -> f64 {
        if self.max_size == 0 {
            0.0
        } else {
            self.size as f64 / self.max_size as f64
        }
    }
}

/// Snapshot of the query-result cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct QueryCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub size: usize,
    pub max_entries: usize,
}

impl QueryCacheStats {
    pub fn hit_rate(&self) -> f64 {
        hit_rate(self.hits, self.misses)
    }
}
