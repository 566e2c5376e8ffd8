//! Opt-in operation timing.
//!
//! Nothing in the caches calls the monitor. Callers time what they care about
//! with [`PerformanceMonitor::start_operation`], [`PerformanceMonitor::measure`]
//! or by wrapping a repository in
//! [`MonitoredRepository`](crate::storage::monitored::MonitoredRepository).

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;

use lingocache_core::metrics::{
    recent_queries, slowest_queries, summarize, PerformanceSummary, QueryMetric,
};

use crate::sync::lock;

/// Everything the monitor holds, ready to be shipped elsewhere.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsExport {
    pub exported_at: DateTime<Utc>,
    pub summary: PerformanceSummary,
    pub metrics: Vec<QueryMetric>,
}

/// Bounded FIFO of timing samples.
///
/// Once `max_metrics` samples are held, each new sample drops the oldest one.
/// Aggregates are recomputed from the retained samples on every call.
#[derive(Debug)]
pub struct PerformanceMonitor {
    samples: Mutex<VecDeque<QueryMetric>>,
    slow_query_threshold: Duration,
    max_metrics: usize,
}

impl PerformanceMonitor {
    /// Creates a monitor retaining at most `max_metrics` samples (at least one).
    pub fn new(slow_query_threshold: Duration, max_metrics: usize) -> Self {
        let max_metrics = max_metrics.max(1);
        Self {
            samples: Mutex::new(VecDeque::with_capacity(max_metrics.min(1_024))),
            slow_query_threshold,
            max_metrics,
        }
    }

    pub fn slow_query_threshold(&self) -> Duration {
        self.slow_query_threshold
    }

    pub fn max_metrics(&self) -> usize {
        self.max_metrics
    }

    /// Whether `duration` exceeds the slow query threshold.
    pub fn is_slow(&self, duration: Duration) -> bool {
        duration > self.slow_query_threshold
    }

    /// Starts timing an operation. The sample is recorded by [`OperationTimer::stop`].
    pub fn start_operation(
        &self,
        collection: impl Into<String>,
        operation: impl Into<String>,
        params: Option<Value>,
    ) -> OperationTimer<'_> {
        OperationTimer {
            monitor: self,
            collection: collection.into(),
            operation: operation.into(),
            params,
            started_at: Instant::now(),
        }
    }

    /// Awaits `future` and records how long it took, whatever it resolved to.
    pub async fn measure<F>(
        &self,
        collection: &str,
        operation: &str,
        params: Option<Value>,
        future: F,
    ) -> F::Output
    where
        F: Future,
    {
        let timer = self.start_operation(collection, operation, params);
        let output = future.await;
        timer.stop();
        output
    }

    /// Appends a sample, dropping the oldest when the buffer is full.
    pub fn record(&self, metric: QueryMetric) {
        let mut samples = self.lock_samples();
        while samples.len() >= self.max_metrics {
            samples.pop_front();
        }
        samples.push_back(metric);
    }

    /// Aggregates over every retained sample.
    pub fn metrics(&self) -> PerformanceSummary {
        summarize(self.lock_samples().iter(), self.threshold_ms())
    }

    /// Up to `limit` slow samples, slowest first.
    pub fn slow_queries(&self, limit: usize) -> Vec<QueryMetric> {
        slowest_queries(self.lock_samples().iter(), self.threshold_ms(), limit)
    }

    /// The last `limit` samples in recording order.
    pub fn recent_queries(&self, limit: usize) -> Vec<QueryMetric> {
        recent_queries(self.lock_samples().iter(), limit)
    }

    pub fn len(&self) -> usize {
        self.lock_samples().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn reset(&self) {
        self.lock_samples().clear();
        tracing::debug!("Performance metrics reset");
    }

    pub fn export(&self) -> MetricsExport {
        let samples = self.lock_samples();
        MetricsExport {
            exported_at: Utc::now(),
            summary: summarize(samples.iter(), self.threshold_ms()),
            metrics: samples.iter().cloned().collect(),
        }
    }

    fn threshold_ms(&self) -> f64 {
        as_millis_f64(self.slow_query_threshold)
    }

    fn lock_samples(&self) -> MutexGuard<'_, VecDeque<QueryMetric>> {
        lock(&self.samples)
    }
}

/// A running measurement. Dropping it without calling [`stop`](Self::stop)
/// records nothing.
#[must_use = "the operation is only recorded when `stop` is called"]
#[derive(Debug)]
pub struct OperationTimer<'a> {
    monitor: &'a PerformanceMonitor,
    collection: String,
    operation: String,
    params: Option<Value>,
    started_at: Instant,
}

impl OperationTimer<'_> {
    /// Records the sample and returns the elapsed time.
    pub fn stop(self) -> Duration {
        let elapsed = self.started_at.elapsed();
        let duration_ms = as_millis_f64(elapsed);

        if self.monitor.is_slow(elapsed) {
            tracing::warn!(
                collection = %self.collection,
                operation = %self.operation,
                duration_ms,
                threshold_ms = self.monitor.threshold_ms(),
                "Slow query detected"
            );
        } else {
            tracing::trace!(
                collection = %self.collection,
                operation = %self.operation,
                duration_ms,
                "Operation timed"
            );
        }

        self.monitor.record(QueryMetric {
            operation: self.operation,
            collection: self.collection,
            duration_ms,
            timestamp: Utc::now(),
            params: self.params,
        });

        elapsed
    }
}

fn as_millis_f64(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1_000.0
}
