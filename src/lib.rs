//! # storymap-telemetry
//!
//! Aggregates telemetry emitted by the Storymap editor into chart-ready
//! summaries: error trends, auto-update health, performance and system
//! metrics, and cross-signal correlations.
//!
//! ## Usage
//!
//! ```bash
//! storymap-telemetry process --events events.jsonl --category error --page-size 200
//! storymap-telemetry cache stats --json
//! ```
//!
//! ## Modules
//!
//! - `telemetry` - Event records and the category/date filters applied to them
//! - `pipeline` - Chunking, per-chunk aggregation, the worker pool, merging and pagination
//! - `cache` - TTL-bounded raw and processed stores with pluggable backends
//! - `config` - Pipeline configuration from TOML and `STORYMAP_*` variables
//! - `cli` - Command-line interface
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod telemetry;


pub use cache::AnalyticsCache;
pub use config::PipelineConfig;
pub use error::{Error, Result};
pub use pipeline::{AggregateRequest, AggregateView, AnalyticsProcessor, FinalAggregate};
pub use telemetry::{CategoryFilter, DateRange, EventRecord};
