//! Consumer-facing read API
//!
//! [`AggregateView`] holds the event source, the active filters and the page
//! position for one consumer, and publishes the latest final aggregate as a
//! [`ViewState`]. Requests may overlap; only the most recently started one is
//! allowed to publish its outcome.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use super::aggregate::FinalAggregate;
use super::orchestrator::{AggregateRequest, AnalyticsProcessor};
use super::pagination::{PageRequest, Pagination, DEFAULT_PAGE_SIZE};
use super::pool::PoolStats;
use crate::telemetry::{CategoryFilter, DateRange, EventRecord};

/// What a consumer renders
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewState {
    pub data: Option<FinalAggregate>,
    pub is_loading: bool,
    /// Human-readable message of the last failed request
    pub error: Option<String>,
}

#[derive(Debug)]
struct ViewInputs {
    events: Arc<Vec<EventRecord>>,
    categories: CategoryFilter,
    date_range: Option<DateRange>,
    page: usize,
    page_size: usize,
}

impl ViewInputs {
    fn request(&self) -> AggregateRequest {
        AggregateRequest {
            categories: self.categories.clone(),
            date_range: self.date_range,
            pagination: PageRequest::new(self.page, self.page_size),
        }
    }
}

pub struct AggregateView {
    processor: Arc<AnalyticsProcessor>,
    inputs: RwLock<ViewInputs>,
    state: RwLock<ViewState>,
    generation: AtomicU64,
}

impl AggregateView {
    pub fn new(processor: Arc<AnalyticsProcessor>, events: Vec<EventRecord>) -> Self {
        Self {
            processor,
            inputs: RwLock::new(ViewInputs {
                events: Arc::new(events),
                categories: CategoryFilter::new(),
                date_range: None,
                page: 1,
                page_size: DEFAULT_PAGE_SIZE,
            }),
            state: RwLock::new(ViewState::default()),
            generation: AtomicU64::new(0),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.inputs.get_mut().page_size = page_size;
        self
    }

    /// Run a request for the current inputs and publish it if still the latest
    pub async fn refresh(&self) -> ViewState {
        // generation, inputs and the loading flag change together under the state lock
        let (generation, events, request) = {
            let mut state = self.state.write().await;
            let inputs = self.inputs.read().await;
            state.is_loading = true;
            let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
            (generation, Arc::clone(&inputs.events), inputs.request())
        };

        let outcome = self.processor.process_request(&events, &request).await;

        let mut state = self.state.write().await;
        if self.generation.load(Ordering::Acquire) != generation {
            debug!("Discarding superseded result of request {}", generation);
            return state.clone();
        }

        match outcome {
            Ok(aggregate) => {
                state.data = Some(aggregate);
                state.error = None;
            }
            Err(e) => state.error = Some(e.to_string()),
        }
        state.is_loading = false;
        state.clone()
    }

    /// Replace the filters, go back to the first page and refresh
    pub async fn set_filters(
        &self,
        categories: CategoryFilter,
        date_range: Option<DateRange>,
    ) -> ViewState {
        {
            let mut inputs = self.inputs.write().await;
            inputs.categories = categories;
            inputs.date_range = date_range;
            inputs.page = 1;
        }
        self.refresh().await
    }

    /// Replace the event source, go back to the first page and refresh
    pub async fn set_events(&self, events: Vec<EventRecord>) -> ViewState {
        {
            let mut inputs = self.inputs.write().await;
            inputs.events = Arc::new(events);
            inputs.page = 1;
        }
        self.refresh().await
    }

    /// Advance one page; stays put on the last known page
    pub async fn load_next_page(&self) -> ViewState {
        let pagination = self.last_pagination().await;
        if !pagination.is_some_and(|p| p.has_next_page) {
            return self.snapshot().await;
        }
        self.inputs.write().await.page += 1;
        self.refresh().await
    }

    /// Go back one page; stays put on the first page
    pub async fn load_previous_page(&self) -> ViewState {
        {
            let mut inputs = self.inputs.write().await;
            if inputs.page <= 1 {
                drop(inputs);
                return self.snapshot().await;
            }
            inputs.page -= 1;
        }
        self.refresh().await
    }

    pub async fn reset_pagination(&self) -> ViewState {
        self.inputs.write().await.page = 1;
        self.refresh().await
    }

    pub async fn snapshot(&self) -> ViewState {
        self.state.read().await.clone()
    }

    pub async fn current_page(&self) -> usize {
        self.inputs.read().await.page
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.processor.pool_stats()
    }

    async fn last_pagination(&self) -> Option<Pagination> {
        self.state
            .read()
            .await
            .data
            .as_ref()
            .and_then(|data| data.pagination)
    }
}
