mod summary;
mod types;

pub use summary::{recent_queries, slowest_queries, summarize};
pub use types::{OperationStats, PerformanceSummary, QueryMetric};
