//! Read-only stats and health reporting over the caches and the monitor.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use lingocache_core::cache::{CacheStats, QueryCacheStats};
use lingocache_core::health::{
    evaluate, HealthInputs, HealthReport, HealthStatus, HealthThresholds,
};
use lingocache_core::metrics::{PerformanceSummary, QueryMetric};

use crate::cache::{LruQueryCache, TtlCache};
use crate::monitor::PerformanceMonitor;

/// Number of slow queries included in a [`CacheReport`].
pub const TOP_SLOW_QUERIES: usize = 5;

/// Point-in-time snapshot of every component.
#[derive(Debug, Clone, Serialize)]
pub struct CacheReport {
    pub generated_at: DateTime<Utc>,
    pub entity_cache: CacheStats,
    pub query_cache_size: usize,
    pub query_cache: QueryCacheStats,
    pub performance: PerformanceSummary,
    pub slow_queries: Vec<QueryMetric>,
}

/// Stats and health facade. Never mutates what it observes.
#[derive(Debug, Clone)]
pub struct CacheDiagnostics {
    entity_cache: Arc<TtlCache>,
    query_cache: Arc<LruQueryCache>,
    monitor: Arc<PerformanceMonitor>,
    thresholds: HealthThresholds,
}

impl CacheDiagnostics {
    pub fn new(
        entity_cache: Arc<TtlCache>,
        query_cache: Arc<LruQueryCache>,
        monitor: Arc<PerformanceMonitor>,
    ) -> Self {
        Self {
            entity_cache,
            query_cache,
            monitor,
            thresholds: HealthThresholds::default(),
        }
    }

    pub fn with_thresholds(mut self, thresholds: HealthThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn all_stats(&self) -> CacheReport {
        let query_cache = self.query_cache.stats();
        CacheReport {
            generated_at: Utc::now(),
            entity_cache: self.entity_cache.stats(),
            query_cache_size: query_cache.size,
            query_cache,
            performance: self.monitor.metrics(),
            slow_queries: self.monitor.slow_queries(TOP_SLOW_QUERIES),
        }
    }

    /// Rule-based verdict over the entity cache and the monitor.
    pub fn analyze_cache_health(&self) -> HealthReport {
        let cache = self.entity_cache.stats();
        let performance = self.monitor.metrics();

        let inputs = HealthInputs {
            hits: cache.hits,
            misses: cache.misses,
            size: cache.size,
            max_size: cache.max_size,
            total_queries: performance.total_queries,
            slow_queries: performance.slow_queries,
            average_query_time_ms: performance.average_query_time_ms,
        };

        evaluate(&inputs, &self.thresholds)
    }

    /// Evaluates health and logs the verdict.
    pub fn log_report(&self) -> HealthReport {
        let report = self.analyze_cache_health();

        if report.status == HealthStatus::Healthy {
            tracing::info!(status = %report.status, "Cache health check passed");
        } else {
            tracing::warn!(
                status = %report.status,
                issues = ?report.issues,
                recommendations = ?report.recommendations,
                "Cache health check found issues"
            );
        }

        report
    }
}
