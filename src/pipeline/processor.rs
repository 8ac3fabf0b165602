//! Chunk processor
//!
//! Pure computation of a partial [`Aggregate`] from one chunk of records. The
//! processor holds no shared state, so any number of chunks can be processed
//! concurrently on different workers.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use tracing::trace;

use super::aggregate::{
    Aggregate, Correlation, DetailedMetric, ErrorPatterns, FinalAggregate, Metrics,
    SystemMetrics, TrendPoint, UpdateErrors, MAX_CORRELATIONS,
};
use super::chunk::ProcessDataPayload;
use super::pagination::{Pagination, PaginationError};
use crate::telemetry::event::{ERROR_CATEGORY, NAVIGATION_CATEGORY};
use crate::telemetry::filter::{self, CategoryFilter, DateRange, InvalidDateRange};
use crate::telemetry::EventRecord;

/// Error raised while processing a single chunk
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProcessingError {
    #[error(transparent)]
    InvalidDateRange(#[from] InvalidDateRange),

    #[error(transparent)]
    Pagination(#[from] PaginationError),

    #[error("chunk rejected: {0}")]
    Rejected(String),
}

/// Work executed by pool workers for each task
pub trait ChunkHandler: Send + Sync + 'static {
    fn handle(&self, payload: ProcessDataPayload) -> Result<Aggregate, ProcessingError>;
}

/// The standard chunk processor
#[derive(Debug, Clone, Copy, Default)]
pub struct ChunkProcessor;

impl ChunkHandler for ChunkProcessor {
    fn handle(&self, payload: ProcessDataPayload) -> Result<Aggregate, ProcessingError> {
        process(&payload.data, &payload.categories, payload.date_range.as_ref())
    }
}

impl<F> ChunkHandler for F
where
    F: Fn(ProcessDataPayload) -> Result<Aggregate, ProcessingError> + Send + Sync + 'static,
{
    fn handle(&self, payload: ProcessDataPayload) -> Result<Aggregate, ProcessingError> {
        self(payload)
    }
}

/// Process a whole request in one chunk
///
/// With `pagination` set, only the requested page of the filtered records is
/// aggregated and the page metadata is attached; otherwise every record is
/// aggregated and no pagination is reported.
pub fn process_payload(payload: &ProcessDataPayload) -> Result<FinalAggregate, ProcessingError> {
    let Some(page) = payload.pagination else {
        let aggregate = process(&payload.data, &payload.categories, payload.date_range.as_ref())?;
        return Ok(FinalAggregate {
            aggregate,
            pagination: None,
        });
    };

    if let Some(range) = &payload.date_range {
        range.validate()?;
    }
    let filtered = filter::filter_events(
        &payload.data,
        &payload.categories,
        payload.date_range.as_ref(),
    );
    let pagination = Pagination::for_request(filtered.len(), &page)?;
    let window = &filtered[page.window(filtered.len())];

    let aggregate = process(window, &payload.categories, payload.date_range.as_ref())?;
    Ok(FinalAggregate::new(aggregate, pagination))
}

/// Compute the partial aggregate of one chunk
///
/// Records are filtered by date range and category first. With no active
/// category every record is kept and only `metrics.total` is reported.
pub fn process(
    chunk: &[EventRecord],
    categories: &CategoryFilter,
    date_range: Option<&DateRange>,
) -> Result<Aggregate, ProcessingError> {
    if let Some(range) = date_range {
        range.validate()?;
    }

    let total_only = !categories.any_active();
    let records: Vec<&EventRecord> = chunk
        .iter()
        .filter(|e| filter::admits(e, categories, date_range))
        .collect();

    trace!(
        "Processing chunk: {} of {} records kept (total-only: {})",
        records.len(),
        chunk.len(),
        total_only
    );

    Ok(Aggregate {
        metrics: compute_metrics(&records, total_only),
        error_patterns: compute_error_patterns(&records),
        update_errors: compute_update_errors(&records),
        system_metrics: compute_system_metrics(&records),
    })
}

fn compute_metrics(records: &[&EventRecord], total_only: bool) -> Metrics {
    let mut metrics = Metrics::default();

    for record in records {
        let amount = record.amount();
        metrics.total += amount;
        if total_only {
            continue;
        }

        match record.category.as_str() {
            ERROR_CATEGORY => metrics.error += amount,
            NAVIGATION_CATEGORY => metrics.navigation += amount,
            _ => {}
        }
        *metrics
            .by_category
            .entry(record.category.clone())
            .or_insert(0.0) += amount;
    }

    metrics
}

/// Running pattern statistics, in first-appearance order
struct PatternStat {
    pattern: String,
    count: u64,
    impact: f64,
}

impl PatternStat {
    fn mean_impact(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.impact / self.count as f64
        }
    }
}

fn compute_error_patterns(records: &[&EventRecord]) -> ErrorPatterns {
    let mut trends: BTreeMap<String, u64> = BTreeMap::new();
    let mut patterns: Vec<PatternStat> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for record in records.iter().filter(|r| r.is_error()) {
        if let Some(day) = record.day_key() {
            *trends.entry(day).or_insert(0) += 1;
        }

        let key = record.pattern_key();
        let severity = record.meta_f64("severity").unwrap_or(1.0);
        let slot = *index.entry(key.clone()).or_insert_with(|| {
            patterns.push(PatternStat {
                pattern: key,
                count: 0,
                impact: 0.0,
            });
            patterns.len() - 1
        });
        patterns[slot].count += 1;
        patterns[slot].impact += severity;
    }

    // sort_by is stable, so equal impacts keep first-appearance order
    patterns.sort_by(|a, b| {
        b.mean_impact()
            .partial_cmp(&a.mean_impact())
            .unwrap_or(Ordering::Equal)
    });

    ErrorPatterns {
        correlations: patterns
            .into_iter()
            .take(MAX_CORRELATIONS)
            .map(|p| Correlation {
                impact: p.mean_impact(),
                pattern: p.pattern,
                count: p.count,
            })
            .collect(),
        trends: trends
            .into_iter()
            .map(|(date, errors)| TrendPoint { date, errors })
            .collect(),
    }
}

fn compute_update_errors(records: &[&EventRecord]) -> UpdateErrors {
    let mut update = UpdateErrors::default();
    let mut retry_sum = 0.0;

    for record in records.iter().filter(|r| r.is_update_error()) {
        update.total += 1;
        let error_type = record.meta_str("errorType").unwrap_or("unknown");
        *update.by_type.entry(error_type.to_string()).or_insert(0) += 1;

        if let Some(attempt) = record.meta_f64("attemptNumber") {
            retry_sum += attempt;
            update.retry_samples += 1;
        }
    }

    if update.retry_samples > 0 {
        update.average_retries = retry_sum / update.retry_samples as f64;
    }
    update
}

fn compute_system_metrics(records: &[&EventRecord]) -> SystemMetrics {
    let mut system = SystemMetrics::default();
    let mut response_sum = 0.0;
    let perf = &mut system.performance;

    for record in records {
        if let Some(platform) = record.platform_tag() {
            *system.by_platform.entry(platform.to_string()).or_insert(0) += 1;
        }
        if let Some(version) = record.version_tag() {
            *system.by_version.entry(version.to_string()).or_insert(0) += 1;
        }
        if let Some(arch) = record.arch_tag() {
            *system.by_arch.entry(arch.to_string()).or_insert(0) += 1;
        }

        if let Some(response_time) = record.meta_f64("responseTime") {
            response_sum += response_time;
            perf.response_samples += 1;
            system.detailed_metrics.push(DetailedMetric {
                timestamp: record.timestamp,
                response_time,
            });
        }

        let crashed = record.is_crash();
        if crashed {
            perf.total_crashes += 1;
        }
        if crashed || record.is_error() {
            perf.error_events += 1;
        }
    }

    perf.record_count = records.len() as u64;
    if perf.response_samples > 0 {
        perf.avg_response_time = response_sum / perf.response_samples as f64;
    }
    if perf.record_count > 0 {
        perf.error_rate = perf.error_events as f64 / perf.record_count as f64 * 100.0;
    }
    system.detailed_metrics.sort_by_key(|m| m.timestamp);

    system
}
