//! Deterministic merge of partial aggregates
//!
//! Partials are folded left-to-right in chunk order, seeded with the first one.
//! Sums, keyed counts, trends and detailed metrics merge associatively, so the
//! result does not depend on where chunk boundaries fall. Averaged fields follow
//! the configured [`AverageStrategy`].

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use thiserror::Error;

use super::aggregate::{
    Aggregate, Correlation, ErrorPatterns, Metrics, PerformanceSummary, SystemMetrics, TrendPoint,
    UpdateErrors, MAX_CORRELATIONS,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MergeError {
    #[error("no partial aggregates to merge")]
    NoPartials,
}

/// How averaged fields (`averageRetries`, `avgResponseTime`, `errorRate`) combine
///
/// `Pairwise` halves the sum of the accumulator and the next partial on every
/// fold step. It matches the dashboards the editor shipped with, but the result
/// depends on chunk count and grouping. `Weighted` uses the sample counters
/// carried in each aggregate and is associative.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AverageStrategy {
    #[default]
    Pairwise,
    Weighted,
}

impl AverageStrategy {
    fn combine(self, left: f64, left_samples: u64, right: f64, right_samples: u64) -> f64 {
        match self {
            Self::Pairwise => (left + right) / 2.0,
            Self::Weighted => {
                let samples = left_samples + right_samples;
                if samples == 0 {
                    0.0
                } else {
                    (left * left_samples as f64 + right * right_samples as f64) / samples as f64
                }
            }
        }
    }
}

/// Folds partial aggregates into one
#[derive(Debug, Clone, Copy, Default)]
pub struct AggregateMerger {
    strategy: AverageStrategy,
}

impl AggregateMerger {
    pub fn new(strategy: AverageStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> AverageStrategy {
        self.strategy
    }

    /// Merge partials in the order given
    pub fn merge<I>(&self, partials: I) -> Result<Aggregate, MergeError>
    where
        I: IntoIterator<Item = Aggregate>,
    {
        let mut partials = partials.into_iter();
        let seed = partials.next().ok_or(MergeError::NoPartials)?;
        Ok(partials.fold(seed, |acc, next| self.merge_pair(acc, next)))
    }

    /// Merge `next` into the accumulator
    pub fn merge_pair(&self, acc: Aggregate, next: Aggregate) -> Aggregate {
        Aggregate {
            metrics: merge_metrics(acc.metrics, next.metrics),
            error_patterns: merge_error_patterns(acc.error_patterns, next.error_patterns),
            update_errors: self.merge_update_errors(acc.update_errors, next.update_errors),
            system_metrics: self.merge_system_metrics(acc.system_metrics, next.system_metrics),
        }
    }

    fn merge_update_errors(&self, acc: UpdateErrors, next: UpdateErrors) -> UpdateErrors {
        UpdateErrors {
            total: acc.total + next.total,
            average_retries: self.strategy.combine(
                acc.average_retries,
                acc.retry_samples,
                next.average_retries,
                next.retry_samples,
            ),
            retry_samples: acc.retry_samples + next.retry_samples,
            by_type: union_sum(acc.by_type, next.by_type),
        }
    }

    fn merge_system_metrics(&self, acc: SystemMetrics, next: SystemMetrics) -> SystemMetrics {
        let mut detailed_metrics = acc.detailed_metrics;
        detailed_metrics.extend(next.detailed_metrics);
        detailed_metrics.sort_by_key(|m| m.timestamp);

        SystemMetrics {
            by_platform: union_sum(acc.by_platform, next.by_platform),
            by_version: union_sum(acc.by_version, next.by_version),
            by_arch: union_sum(acc.by_arch, next.by_arch),
            performance: self.merge_performance(acc.performance, next.performance),
            detailed_metrics,
        }
    }

    fn merge_performance(&self, acc: PerformanceSummary, next: PerformanceSummary) -> PerformanceSummary {
        let mut merged = PerformanceSummary {
            avg_response_time: self.strategy.combine(
                acc.avg_response_time,
                acc.response_samples,
                next.avg_response_time,
                next.response_samples,
            ),
            error_rate: 0.0,
            total_crashes: acc.total_crashes + next.total_crashes,
            response_samples: acc.response_samples + next.response_samples,
            record_count: acc.record_count + next.record_count,
            error_events: acc.error_events + next.error_events,
        };
        merged.error_rate = match self.strategy {
            AverageStrategy::Pairwise => (acc.error_rate + next.error_rate) / 2.0,
            AverageStrategy::Weighted => merged.weighted_error_rate(),
        };
        merged
    }
}

fn merge_metrics(acc: Metrics, next: Metrics) -> Metrics {
    Metrics {
        total: acc.total + next.total,
        error: acc.error + next.error,
        navigation: acc.navigation + next.navigation,
        by_category: union_sum(acc.by_category, next.by_category),
    }
}

fn merge_error_patterns(acc: ErrorPatterns, next: ErrorPatterns) -> ErrorPatterns {
    ErrorPatterns {
        correlations: rerank_correlations(acc.correlations, next.correlations),
        trends: merge_trends(acc.trends, next.trends),
    }
}

/// Concatenate, fold duplicate patterns together, re-rank by impact, keep the top entries
fn rerank_correlations(acc: Vec<Correlation>, next: Vec<Correlation>) -> Vec<Correlation> {
    let mut combined: Vec<Correlation> = Vec::with_capacity(acc.len() + next.len());
    for item in acc.into_iter().chain(next) {
        match combined.iter_mut().find(|c| c.pattern == item.pattern) {
            Some(existing) => {
                let count = existing.count + item.count;
                if count > 0 {
                    existing.impact = (existing.impact * existing.count as f64
                        + item.impact * item.count as f64)
                        / count as f64;
                }
                existing.count = count;
            }
            None => combined.push(item),
        }
    }

    combined.sort_by(|a, b| b.impact.partial_cmp(&a.impact).unwrap_or(Ordering::Equal));
    combined.truncate(MAX_CORRELATIONS);
    combined
}

fn merge_trends(acc: Vec<TrendPoint>, next: Vec<TrendPoint>) -> Vec<TrendPoint> {
    let mut by_date: BTreeMap<String, u64> = BTreeMap::new();
    for point in acc.into_iter().chain(next) {
        *by_date.entry(point.date).or_insert(0) += point.errors;
    }
    by_date
        .into_iter()
        .map(|(date, errors)| TrendPoint { date, errors })
        .collect()
}

fn union_sum<V>(mut acc: BTreeMap<String, V>, next: BTreeMap<String, V>) -> BTreeMap<String, V>
where
    V: Copy + Default + std::ops::AddAssign,
{
    for (key, value) in next {
        *acc.entry(key).or_default() += value;
    }
    acc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::processor::process;
    use crate::telemetry::{CategoryFilter, EventRecord};

    // 2024-01-01T08:00:00Z
    const JAN_1: i64 = 1_704_096_000_000;
    const DAY_MS: i64 = 86_400_000;

    fn dataset() -> Vec<EventRecord> {
        let mut events = Vec::new();
        for i in 0..12i64 {
            let category = ["error", "navigation", "editing", "auto-update"][(i % 4) as usize];
            let action = if i % 4 == 3 { "error" } else { "click" };
            events.push(
                EventRecord::new(category, action, JAN_1 + (i % 3) * DAY_MS)
                    .with_value(i as f64)
                    .with_host(["linux", "darwin"][(i % 2) as usize], "1.0.0", "x64")
                    .with_meta("severity", 1 + i % 3)
                    .with_meta("responseTime", 10 * (i + 1))
                    .with_meta("attemptNumber", 1 + i % 2),
            );
        }
        events
    }

    fn partials(events: &[EventRecord], chunk_size: usize) -> Vec<Aggregate> {
        let categories = CategoryFilter::with_active(["error", "navigation", "editing", "auto-update"]);
        events
            .chunks(chunk_size)
            .map(|chunk| process(chunk, &categories, None).unwrap())
            .collect()
    }

    /// Fields that merge associatively regardless of strategy
    fn additive_view(a: &Aggregate) -> (Metrics, Vec<TrendPoint>, u64, BTreeMap<String, u64>, SystemMetrics) {
        let mut system = a.system_metrics.clone();
        system.performance.avg_response_time = 0.0;
        system.performance.error_rate = 0.0;
        (
            a.metrics.clone(),
            a.error_patterns.trends.clone(),
            a.update_errors.total,
            a.update_errors.by_type.clone(),
            system,
        )
    }

    #[test]
    fn test_merge_of_nothing_fails() {
        let merger = AggregateMerger::default();
        assert_eq!(merger.merge(Vec::new()), Err(MergeError::NoPartials));
    }

    #[test]
    fn test_single_partial_is_returned_unchanged() {
        let parts = partials(&dataset(), 100);
        let merged = AggregateMerger::default().merge(parts.clone()).unwrap();
        assert_eq!(merged, parts[0]);
    }

    #[test]
    fn test_additive_fields_independent_of_chunking() {
        let events = dataset();
        let merger = AggregateMerger::new(AverageStrategy::Pairwise);
        let whole = merger.merge(partials(&events, 12)).unwrap();

        for size in [1, 2, 3, 5, 7] {
            let merged = merger.merge(partials(&events, size)).unwrap();
            assert_eq!(additive_view(&merged), additive_view(&whole), "chunk size {size}");
        }
    }

    #[test]
    fn test_grouping_does_not_change_additive_fields() {
        let parts = partials(&dataset(), 4);
        let merger = AggregateMerger::default();
        let (a, b, c) = (parts[0].clone(), parts[1].clone(), parts[2].clone());

        let flat = merger.merge(vec![a.clone(), b.clone(), c.clone()]).unwrap();
        let right = merger
            .merge(vec![a.clone(), merger.merge(vec![b.clone(), c.clone()]).unwrap()])
            .unwrap();
        let left = merger
            .merge(vec![merger.merge(vec![a, b]).unwrap(), c])
            .unwrap();

        assert_eq!(additive_view(&flat), additive_view(&right));
        assert_eq!(additive_view(&flat), additive_view(&left));
    }

    #[test]
    fn test_weighted_averages_match_single_chunk() {
        let events = dataset();
        let merger = AggregateMerger::new(AverageStrategy::Weighted);
        let whole = merger.merge(partials(&events, 12)).unwrap();
        let chunked = merger.merge(partials(&events, 5)).unwrap();

        let close = |a: f64, b: f64| (a - b).abs() < 1e-9;
        assert!(close(
            chunked.update_errors.average_retries,
            whole.update_errors.average_retries
        ));
        assert!(close(
            chunked.system_metrics.performance.avg_response_time,
            whole.system_metrics.performance.avg_response_time
        ));
        assert!(close(
            chunked.system_metrics.performance.error_rate,
            whole.system_metrics.performance.error_rate
        ));
    }

    #[test]
    fn test_pairwise_averages_depend_on_grouping() {
        // Averages of 10, 20, 60 fold to ((10 + 20) / 2 + 60) / 2 = 37.5,
        // while the true mean is 30.
        let part = |avg: f64| {
            let mut a = Aggregate::default();
            a.system_metrics.performance.avg_response_time = avg;
            a.system_metrics.performance.response_samples = 1;
            a
        };
        let parts = vec![part(10.0), part(20.0), part(60.0)];

        let pairwise = AggregateMerger::new(AverageStrategy::Pairwise)
            .merge(parts.clone())
            .unwrap();
        let weighted = AggregateMerger::new(AverageStrategy::Weighted)
            .merge(parts)
            .unwrap();

        assert_eq!(pairwise.system_metrics.performance.avg_response_time, 37.5);
        assert_eq!(weighted.system_metrics.performance.avg_response_time, 30.0);
    }

    #[test]
    fn test_trends_sum_by_date_and_sort() {
        let merged = merge_trends(
            vec![TrendPoint { date: "2024-01-02".into(), errors: 1 }],
            vec![
                TrendPoint { date: "2024-01-01".into(), errors: 2 },
                TrendPoint { date: "2024-01-02".into(), errors: 3 },
            ],
        );
        assert_eq!(
            merged,
            vec![
                TrendPoint { date: "2024-01-01".into(), errors: 2 },
                TrendPoint { date: "2024-01-02".into(), errors: 4 },
            ]
        );
    }

    #[test]
    fn test_correlations_rerank_after_concatenation() {
        let c = |pattern: &str, count: u64, impact: f64| Correlation {
            pattern: pattern.into(),
            count,
            impact,
        };
        let acc = vec![c("a", 1, 2.0), c("b", 1, 1.5), c("c", 1, 1.4), c("d", 1, 1.3), c("e", 1, 1.2)];
        let next = vec![c("f", 1, 9.0), c("a", 3, 6.0)];

        let merged = rerank_correlations(acc, next);
        let order: Vec<&str> = merged.iter().map(|c| c.pattern.as_str()).collect();

        assert_eq!(order, vec!["f", "a", "b", "c", "d"]);
        assert_eq!(merged[1].count, 4);
        assert_eq!(merged[1].impact, 5.0);
    }

    #[test]
    fn test_keyed_counts_union() {
        let mut left = BTreeMap::new();
        left.insert("linux".to_string(), 2u64);
        let mut right = BTreeMap::new();
        right.insert("linux".to_string(), 1u64);
        right.insert("win32".to_string(), 4u64);

        let merged = union_sum(left, right);
        assert_eq!(merged.get("linux"), Some(&3));
        assert_eq!(merged.get("win32"), Some(&4));
    }
}
