//! Request orchestration
//!
//! [`AnalyticsProcessor`] is the single entry point of the pipeline. For each
//! request it validates input, filters and paginates the events, consults the
//! processed cache, fans the page out to the worker pool in chunks, merges the
//! surviving partials and writes the result back to the cache. Callers see
//! either a complete final aggregate or an error, never a partial merge.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::aggregate::FinalAggregate;
use super::chunk::{split_into_chunks, ProcessDataPayload};
use super::merger::AggregateMerger;
use super::pagination::{PageRequest, Pagination};
use super::pool::{PoolStats, TaskHandle, WorkerPool};
use crate::cache::{AnalyticsCache, CacheKey};
use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::telemetry::{filter_events, CategoryFilter, DateRange, EventRecord};

/// Filters and page window of one aggregate request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateRequest {
    #[serde(default)]
    pub categories: CategoryFilter,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_range: Option<DateRange>,
    #[serde(default)]
    pub pagination: PageRequest,
}

impl AggregateRequest {
    pub fn new(categories: CategoryFilter) -> Self {
        Self {
            categories,
            ..Self::default()
        }
    }

    pub fn with_date_range(mut self, range: DateRange) -> Self {
        self.date_range = Some(range);
        self
    }

    pub fn with_page(mut self, page: usize, page_size: usize) -> Self {
        self.pagination = PageRequest::new(page, page_size);
        self
    }

    pub fn cache_key(&self) -> CacheKey {
        CacheKey::from_request(&self.categories, self.date_range.as_ref(), &self.pagination)
    }
}

pub struct AnalyticsProcessor {
    pool: WorkerPool,
    cache: AnalyticsCache,
    merger: AggregateMerger,
    chunk_size: usize,
}

impl AnalyticsProcessor {
    /// Build the pool and open the cache described by `config`
    ///
    /// Must be called from within a tokio runtime.
    pub async fn new(config: &PipelineConfig) -> Self {
        let pool = WorkerPool::with_processor(config.worker_count);
        let cache = AnalyticsCache::open(&config.cache).await;
        let merger = AggregateMerger::new(config.merge.average_strategy);
        Self::from_parts(pool, cache, merger, config.chunk_size)
    }

    pub fn from_parts(
        pool: WorkerPool,
        cache: AnalyticsCache,
        merger: AggregateMerger,
        chunk_size: usize,
    ) -> Self {
        Self {
            pool,
            cache,
            merger,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Compute the final aggregate of one page of `events`
    pub async fn process_request(
        &self,
        events: &[EventRecord],
        request: &AggregateRequest,
    ) -> Result<FinalAggregate> {
        request.pagination.validate().map_err(Error::validation)?;
        if let Some(range) = &request.date_range {
            range.validate().map_err(Error::validation)?;
        }

        let filtered = filter_events(events, &request.categories, request.date_range.as_ref());
        let pagination =
            Pagination::for_request(filtered.len(), &request.pagination).map_err(Error::validation)?;

        let key = request.cache_key();
        if let Some(mut cached) = self.cache.get_processed(&key).await {
            debug!("Serving page {} from cache", pagination.current_page);
            cached.pagination = Some(pagination);
            return Ok(cached);
        }

        let page = filtered[request.pagination.window(filtered.len())].to_vec();
        let chunks = split_into_chunks(page.clone(), self.chunk_size);
        let total = chunks.len();
        debug!(
            "Dispatching {} records of {} in {} chunks",
            page.len(),
            filtered.len(),
            total
        );

        let handles = chunks
            .into_iter()
            .map(|chunk| {
                self.pool.submit(ProcessDataPayload::new(
                    chunk,
                    request.categories.clone(),
                    request.date_range,
                ))
            })
            .collect::<std::result::Result<Vec<TaskHandle>, _>>()?;

        // join_all yields results in submission order
        let mut partials = Vec::with_capacity(total);
        let mut failed = 0;
        let mut last_error = None;
        for (index, outcome) in join_all(handles).await.into_iter().enumerate() {
            match outcome {
                Ok(partial) => partials.push(partial),
                Err(e) => {
                    warn!("Chunk {} of {} discarded: {}", index + 1, total, e);
                    failed += 1;
                    last_error = Some(e.to_string());
                }
            }
        }

        if partials.is_empty() {
            return Err(Error::AggregateFailed {
                failed,
                total,
                last_error: last_error.unwrap_or_else(|| "no chunks produced".to_string()),
            });
        }

        let merged = self.merger.merge(partials)?;
        let result = FinalAggregate::new(merged, pagination);

        self.cache.put_processed(key, result.clone()).await;
        self.cache.put_raw(&page).await;

        info!(
            "Aggregated page {}/{} ({} records, {} of {} chunks failed)",
            pagination.current_page,
            pagination.total_pages.max(1),
            page.len(),
            failed,
            total
        );
        Ok(result)
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    pub fn cache(&self) -> &AnalyticsCache {
        &self.cache
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Terminate the worker pool; pending requests fail
    pub fn shutdown(&self) {
        self.pool.shutdown();
    }
}

impl std::fmt::Debug for AnalyticsProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyticsProcessor")
            .field("pool", &self.pool)
            .field("cache", &self.cache)
            .field("merger", &self.merger)
            .field("chunk_size", &self.chunk_size)
            .finish()
    }
}
