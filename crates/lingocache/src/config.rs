use std::{env, str::FromStr, time::Duration};

use lingocache_core::health::HealthThresholds;

/// Caching layer configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Maximum number of TTL cache entries (default: 1,000)
    pub cache_max_size: usize,
    /// Default TTL of the TTL cache in seconds (default: 300)
    pub cache_default_ttl_seconds: u64,
    /// Seconds between background sweeps of the TTL cache (default: 60, minimum: 1)
    pub cache_cleanup_interval_seconds: u64,
    /// Maximum number of cached query results (default: 500)
    pub query_cache_max_entries: usize,
    /// Default TTL of cached query results in seconds (default: 300)
    pub query_cache_ttl_seconds: u64,
    /// Operations slower than this are reported as slow (default: 1,000)
    pub slow_query_threshold_ms: u64,
    /// Size of the performance monitor's sample ring (default: 1,000)
    pub performance_max_metrics: usize,
    /// Health verdict thresholds (not read from the environment)
    pub health: HealthThresholds,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `CACHE_MAX_SIZE` - Maximum TTL cache entries (default: 1,000)
    /// - `CACHE_DEFAULT_TTL_SECONDS` - TTL cache default TTL (default: 300)
    /// - `CACHE_CLEANUP_INTERVAL_SECONDS` - Sweeper period (default: 60)
    /// - `QUERY_CACHE_MAX_ENTRIES` - Maximum cached queries (default: 500)
    /// - `QUERY_CACHE_TTL_SECONDS` - Query cache default TTL (default: 300)
    /// - `SLOW_QUERY_THRESHOLD_MS` - Slow query threshold (default: 1,000)
    /// - `PERFORMANCE_MAX_METRICS` - Retained performance samples (default: 1,000)
    ///
    /// Missing or unparsable values fall back to their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::defaults();
        Self {
            cache_max_size: parse_or(&lookup, "CACHE_MAX_SIZE", defaults.cache_max_size),
            cache_default_ttl_seconds: parse_or(
                &lookup,
                "CACHE_DEFAULT_TTL_SECONDS",
                defaults.cache_default_ttl_seconds,
            ),
            cache_cleanup_interval_seconds: parse_or(
                &lookup,
                "CACHE_CLEANUP_INTERVAL_SECONDS",
                defaults.cache_cleanup_interval_seconds,
            ),
            query_cache_max_entries: parse_or(
                &lookup,
                "QUERY_CACHE_MAX_ENTRIES",
                defaults.query_cache_max_entries,
            ),
            query_cache_ttl_seconds: parse_or(
                &lookup,
                "QUERY_CACHE_TTL_SECONDS",
                defaults.query_cache_ttl_seconds,
            ),
            slow_query_threshold_ms: parse_or(
                &lookup,
                "SLOW_QUERY_THRESHOLD_MS",
                defaults.slow_query_threshold_ms,
            ),
            performance_max_metrics: parse_or(
                &lookup,
                "PERFORMANCE_MAX_METRICS",
                defaults.performance_max_metrics,
            ),
            health: defaults.health,
        }
    }

    /// Built-in defaults, ignoring the environment.
    pub fn defaults() -> Self {
        Self {
            cache_max_size: 1_000,
            cache_default_ttl_seconds: 300,
            cache_cleanup_interval_seconds: 60,
            query_cache_max_entries: 500,
            query_cache_ttl_seconds: 300,
            slow_query_threshold_ms: 1_000,
            performance_max_metrics: 1_000,
            health: HealthThresholds::default(),
        }
    }

    /// Get the TTL cache default TTL as a Duration.
    pub fn cache_default_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_default_ttl_seconds)
    }

    /// Get the sweeper period as a Duration. Zero is raised to one second.
    pub fn cache_cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cache_cleanup_interval_seconds.max(1))
    }

    /// Get the query cache TTL as a Duration.
    pub fn query_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.query_cache_ttl_seconds)
    }

    /// Get the slow query threshold as a Duration.
    pub fn slow_query_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_query_threshold_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

fn parse_or<F, V>(lookup: &F, key: &str, default: V) -> V
where
    F: Fn(&str) -> Option<String>,
    V: FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(%key, value = %raw, "Ignoring unparsable configuration value");
            default
        }),
        None => default,
    }
}
