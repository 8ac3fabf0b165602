//! Chunked aggregation pipeline
//!
//! Requests flow through [`AnalyticsProcessor`]: events are filtered and
//! paginated, split into chunks, processed in parallel on the [`WorkerPool`],
//! and folded into one [`FinalAggregate`] by the [`AggregateMerger`].

pub mod aggregate;
pub mod chunk;
pub mod merger;
pub mod orchestrator;
pub mod pagination;
pub mod pool;
pub mod processor;
pub mod view;

pub use aggregate::{Aggregate, FinalAggregate, PartialAggregate};
pub use chunk::{split_into_chunks, ProcessDataPayload, WorkerMessage, DEFAULT_CHUNK_SIZE};
pub use merger::{AggregateMerger, AverageStrategy, MergeError};
pub use orchestrator::{AggregateRequest, AnalyticsProcessor};
pub use pagination::{PageRequest, Pagination, PaginationError};
pub use pool::{PoolError, PoolStats, TaskHandle, WorkerPool, WorkerState};
pub use processor::{process, process_payload, ChunkHandler, ChunkProcessor, ProcessingError};
pub use view::{AggregateView, ViewState};
