//! Rule-based cache health verdicts.
//!
//! The rules only read snapshots; nothing here touches the live caches.

use serde::Serialize;

/// Verdict severity. Ordered so that `max` picks the most severe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    #[default]
    Healthy,
    Warning,
    Critical,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Warning => "warning",
            HealthStatus::Critical => "critical",
        };
        f.write_str(label)
    }
}

/// Thresholds used by [`evaluate`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthThresholds {
    /// Hit rate below this is a warning.
    pub warning_hit_rate: f64,
    /// Hit rate below this is critical.
    pub critical_hit_rate: f64,
    /// Share of slow queries above this is a warning.
    pub max_slow_query_rate: f64,
    /// Average query time above this (milliseconds) is a warning.
    pub max_average_query_ms: f64,
    /// Cache fill ratio above this produces a sizing recommendation.
    pub max_fill_ratio: f64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            warning_hit_rate: 0.5,
            critical_hit_rate: 0.3,
            max_slow_query_rate: 0.2,
            max_average_query_ms: 500.0,
            max_fill_ratio: 0.9,
        }
    }
}

/// Snapshot values the rules look at.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HealthInputs {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
    pub max_size: usize,
    pub total_queries: u64,
    pub slow_queries: u64,
    pub average_query_time_ms: f64,
}

impl HealthInputs {
    fn lookups(&self) -> u64 {
        self.hits + self.misses
    }

    fn hit_rate(&self) -> f64 {
        crate::cache::hit_rate(self.hits, self.misses)
    }

    fn slow_query_rate(&self) -> f64 {
        if self.total_queries == 0 {
            0.0
        } else {
            self.slow_queries as f64 / self.total_queries as f64
        }
    }
}

/// Verdict with the reasons behind it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
}

impl HealthReport {
    fn raise(&mut self, status: HealthStatus, issue: String, recommendation: &str) {
        self.status = self.status.max(status);
        self.issues.push(issue);
        self.recommendations.push(recommendation.to_string());
    }
}

/// Applies the health rules. The verdict is the most severe triggered rule.
///
/// Hit-rate rules need at least one lookup and the slow-query rule at least one
/// recorded query, so a freshly started process reports healthy.
pub fn evaluate(inputs: &HealthInputs, thresholds: &HealthThresholds) -> HealthReport {
    let mut report = HealthReport::default();

    if inputs.lookups() > 0 {
        let hit_rate = inputs.hit_rate();
        if hit_rate < thresholds.critical_hit_rate {
            report.raise(
                HealthStatus::Critical,
                format!("Cache hit rate is critically low ({:.1}%)", hit_rate * 100.0),
                "Review cache keys and TTLs: most reads are going to the backing store",
            );
        } else if hit_rate < thresholds.warning_hit_rate {
            report.raise(
                HealthStatus::Warning,
                format!("Cache hit rate is low ({:.1}%)", hit_rate * 100.0),
                "Consider longer TTLs for data that changes rarely",
            );
        }
    }

    if inputs.total_queries > 0 {
        let slow_rate = inputs.slow_query_rate();
        if slow_rate > thresholds.max_slow_query_rate {
            report.raise(
                HealthStatus::Warning,
                format!("{:.1}% of queries are slow", slow_rate * 100.0),
                "Add indexes or cache the slowest queries",
            );
        }
    }

    if inputs.average_query_time_ms > thresholds.max_average_query_ms {
        report.raise(
            HealthStatus::Warning,
            format!(
                "Average query time is {:.0}ms",
                inputs.average_query_time_ms
            ),
            "Investigate the slowest collections and operations",
        );
    }

    if inputs.max_size > 0
        && inputs.size as f64 / inputs.max_size as f64 > thresholds.max_fill_ratio
    {
        report.issues.push(format!(
            "Cache is at {} of {} entries",
            inputs.size, inputs.max_size
        ));
        report
            .recommendations
            .push("Consider increasing the cache max size".to_string());
    }

    if report.recommendations.is_empty() {
        report
            .recommendations
            .push("Cache is healthy; no action needed".to_string());
    }

    report
}
