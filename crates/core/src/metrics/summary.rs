//! Pure aggregation over recorded query metrics.
//!
//! The summary is recomputed from the full sample on every call.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use super::{OperationStats, PerformanceSummary, QueryMetric};

fn record(stats: &mut OperationStats, duration_ms: f64, slow: bool) {
    stats.count += 1;
    stats.total_ms += duration_ms;
    if slow {
        stats.slow += 1;
    }
}

fn finish(groups: &mut BTreeMap<String, OperationStats>) {
    for stats in groups.values_mut() {
        stats.average_ms = stats.total_ms / stats.count as f64;
    }
}

fn by_duration(a: &QueryMetric, b: &QueryMetric) -> Ordering {
    a.duration_ms
        .partial_cmp(&b.duration_ms)
        .unwrap_or(Ordering::Equal)
}

/// Summarizes the samples. A sample is slow when it took longer than `slow_threshold_ms`.
pub fn summarize<'a, I>(metrics: I, slow_threshold_ms: f64) -> PerformanceSummary
where
    I: IntoIterator<Item = &'a QueryMetric>,
{
    let mut summary = PerformanceSummary::default();
    let mut total_ms = 0.0;

    for metric in metrics {
        let slow = metric.duration_ms > slow_threshold_ms;

        summary.total_queries += 1;
        total_ms += metric.duration_ms;
        if slow {
            summary.slow_queries += 1;
        }

        record(
            summary
                .by_collection
                .entry(metric.collection.clone())
                .or_default(),
            metric.duration_ms,
            slow,
        );
        record(
            summary
                .by_operation
                .entry(metric.operation.clone())
                .or_default(),
            metric.duration_ms,
            slow,
        );

        // Ties keep the earliest sample.
        if summary
            .fastest_query
            .as_ref()
            .is_none_or(|fastest| by_duration(metric, fastest) == Ordering::Less)
        {
            summary.fastest_query = Some(metric.clone());
        }
        if summary
            .slowest_query
            .as_ref()
            .is_none_or(|slowest| by_duration(metric, slowest) == Ordering::Greater)
        {
            summary.slowest_query = Some(metric.clone());
        }
    }

    if summary.total_queries > 0 {
        summary.average_query_time_ms = total_ms / summary.total_queries as f64;
    }
    finish(&mut summary.by_collection);
    finish(&mut summary.by_operation);

    summary
}

/// Returns up to `limit` samples slower than the threshold, slowest first.
pub fn slowest_queries<'a, I>(metrics: I, slow_threshold_ms: f64, limit: usize) -> Vec<QueryMetric>
where
    I: IntoIterator<Item = &'a QueryMetric>,
{
    let mut slow: Vec<QueryMetric> = metrics
        .into_iter()
        .filter(|metric| metric.duration_ms > slow_threshold_ms)
        .cloned()
        .collect();
    slow.sort_by(|a, b| by_duration(b, a));
    slow.truncate(limit);
    slow
}

/// Returns the last `limit` samples in recording order.
pub fn recent_queries<'a, I>(metrics: I, limit: usize) -> Vec<QueryMetric>
where
    I: IntoIterator<Item = &'a QueryMetric>,
    I::IntoIter: DoubleEndedIterator,
{
    let mut recent: Vec<QueryMetric> = metrics.into_iter().rev().take(limit).cloned().collect();
    recent.reverse();
    recent
}
