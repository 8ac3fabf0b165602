//! Chunking and the worker task message
//!
//! The orchestrator splits the filtered page into fixed-size chunks and wraps
//! each one in a [`WorkerMessage`] for the pool. Chunks partition the input:
//! concatenating them in order reproduces it exactly.

use serde::{Deserialize, Serialize};

use super::pagination::PageRequest;
use crate::telemetry::{CategoryFilter, DateRange, EventRecord};

/// Default number of records per chunk
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Split records into ordered chunks of at most `chunk_size` records
///
/// An empty input yields a single empty chunk so that every request has at
/// least one partial aggregate to seed the merge.
pub fn split_into_chunks(records: Vec<EventRecord>, chunk_size: usize) -> Vec<Vec<EventRecord>> {
    let chunk_size = chunk_size.max(1);
    if records.is_empty() {
        return vec![Vec::new()];
    }

    let mut chunks = Vec::with_capacity(records.len().div_ceil(chunk_size));
    let mut rest = records.into_iter().peekable();
    while rest.peek().is_some() {
        chunks.push(rest.by_ref().take(chunk_size).collect());
    }
    chunks
}

/// Message sent from the orchestrator to a worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum WorkerMessage {
    #[serde(rename = "PROCESS_DATA")]
    ProcessData(ProcessDataPayload),
}

impl WorkerMessage {
    pub fn into_payload(self) -> ProcessDataPayload {
        match self {
            Self::ProcessData(payload) => payload,
        }
    }
}

/// One chunk plus the filters it must be processed under
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessDataPayload {
    pub data: Vec<EventRecord>,
    #[serde(default)]
    pub categories: CategoryFilter,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_range: Option<DateRange>,
    /// Page window for single-chunk callers, see [`process_payload`](super::processor::process_payload);
    /// the orchestrator paginates before chunking and leaves this unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination: Option<PageRequest>,
}

impl ProcessDataPayload {
    pub fn new(
        data: Vec<EventRecord>,
        categories: CategoryFilter,
        date_range: Option<DateRange>,
    ) -> Self {
        Self {
            data,
            categories,
            date_range,
            pagination: None,
        }
    }

    /// Ask a single-chunk caller's handler to aggregate only this page
    pub fn with_pagination(mut self, page: PageRequest) -> Self {
        self.pagination = Some(page);
        self
    }
}
