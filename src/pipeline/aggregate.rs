//! Aggregate shapes produced by the chunk processor and the merger
//!
//! A partial aggregate (one chunk) and a merged aggregate share the same shape.
//! The final aggregate handed to callers additionally carries pagination
//! metadata, which only the orchestrator attaches.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::pagination::Pagination;

/// Maximum number of error correlations kept in an aggregate
pub const MAX_CORRELATIONS: usize = 5;

/// Summed record values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    pub total: f64,
    pub error: f64,
    pub navigation: f64,
    /// Sum per category tag
    #[serde(default)]
    pub by_category: BTreeMap<String, f64>,
}

/// Recurring error pattern ranked by mean impact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correlation {
    /// `category:action[:type]`
    pub pattern: String,
    pub count: u64,
    /// Mean severity per occurrence
    pub impact: f64,
}

/// Error count for one calendar day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendPoint {
    /// `YYYY-MM-DD`
    pub date: String,
    #[serde(alias = "errorCount")]
    pub errors: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorPatterns {
    pub correlations: Vec<Correlation>,
    /// Ascending by date
    pub trends: Vec<TrendPoint>,
}

/// Failed auto-update attempts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateErrors {
    pub total: u64,
    pub by_type: BTreeMap<String, u64>,
    pub average_retries: f64,
    /// Records that reported an attempt number
    #[serde(default)]
    pub retry_samples: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceSummary {
    /// Mean `metadata.responseTime`
    pub avg_response_time: f64,
    /// Error-or-crash records as a percentage of all records
    pub error_rate: f64,
    pub total_crashes: u64,
    #[serde(default)]
    pub response_samples: u64,
    #[serde(default)]
    pub record_count: u64,
    #[serde(default)]
    pub error_events: u64,
}

/// One response-time sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailedMetric {
    pub timestamp: i64,
    pub response_time: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemMetrics {
    pub by_platform: BTreeMap<String, u64>,
    pub by_version: BTreeMap<String, u64>,
    pub by_arch: BTreeMap<String, u64>,
    pub performance: PerformanceSummary,
    /// Ascending by timestamp
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub detailed_metrics: Vec<DetailedMetric>,
}

/// Statistical summary of a set of records
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Aggregate {
    pub metrics: Metrics,
    pub error_patterns: ErrorPatterns,
    pub update_errors: UpdateErrors,
    pub system_metrics: SystemMetrics,
}

/// Aggregate of a single chunk
pub type PartialAggregate = Aggregate;

/// Merged aggregate for one request, as returned to callers and cached
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinalAggregate {
    #[serde(flatten)]
    pub aggregate: Aggregate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
}

impl FinalAggregate {
    pub fn new(aggregate: Aggregate, pagination: Pagination) -> Self {
        Self {
            aggregate,
            pagination: Some(pagination),
        }
    }
}

impl PerformanceSummary {
    /// Error rate recomputed from the carried counters
    pub fn weighted_error_rate(&self) -> f64 {
        if self.record_count == 0 {
            0.0
        } else {
            self.error_events as f64 / self.record_count as f64 * 100.0
        }
    }
}

impl Aggregate {
    /// Number of records the aggregate was computed from
    pub fn record_count(&self) -> u64 {
        self.system_metrics.performance.record_count
    }

    /// Error count for a day, zero when absent
    pub fn errors_on(&self, date: &str) -> u64 {
        self.error_patterns
            .trends
            .iter()
            .find(|t| t.date == date)
            .map_or(0, |t| t.errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_trend_accepts_error_count_alias() {
        let point: TrendPoint =
            serde_json::from_value(json!({"date": "2024-01-01", "errorCount": 4})).unwrap();
        assert_eq!(point.errors, 4);
    }

    #[test]
    fn test_final_aggregate_flattens_shape() {
        let pagination = Pagination::compute(95, 5, 20).unwrap();
        let final_aggregate = FinalAggregate::new(Aggregate::default(), pagination);
        let value = serde_json::to_value(&final_aggregate).unwrap();

        assert!(value.get("metrics").is_some());
        assert!(value.get("errorPatterns").is_some());
        assert_eq!(value["pagination"]["totalPages"], 5);

        let back: FinalAggregate = serde_json::from_value(value).unwrap();
        assert_eq!(back, final_aggregate);
    }
}
