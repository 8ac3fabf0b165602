//! Telemetry event model and request filters
//!
//! Events are produced upstream by the editor and are read-only here.

pub mod event;
pub mod filter;

pub use event::EventRecord;
pub use filter::{filter_events, CategoryFilter, DateRange, InvalidDateRange};
