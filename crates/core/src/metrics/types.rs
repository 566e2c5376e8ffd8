use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One timed repository or cache operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryMetric {
    pub operation: String,
    pub collection: String,
    pub duration_ms: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// Count and timing of the samples sharing a collection or operation name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct OperationStats {
    pub count: u64,
    pub total_ms: f64,
    pub average_ms: f64,
    pub slow: u64,
}

/// Aggregate view over the recorded samples.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PerformanceSummary {
    pub total_queries: u64,
    pub average_query_time_ms: f64,
    pub slow_queries: u64,
    pub fastest_query: Option<QueryMetric>,
    pub slowest_query: Option<QueryMetric>,
    pub by_collection: BTreeMap<String, OperationStats>,
    pub by_operation: BTreeMap<String, OperationStats>,
}

impl PerformanceSummary {
    /// Fraction of samples slower than the threshold, `0.0` without samples.
    pub fn slow_query_rate(&self) -> f64 {
        if self.total_queries == 0 {
            0.0
        } else {
            self.slow_queries as f64 / self.total_queries as f64
        }
    }
}
