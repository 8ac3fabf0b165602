//! Common test utilities and fixtures

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use storymap_telemetry::cache::{AnalyticsCache, CacheBackend, ManualClock};
use storymap_telemetry::pipeline::{AggregateMerger, AnalyticsProcessor, ChunkProcessor, WorkerPool};
use storymap_telemetry::EventRecord;

/// 2024-01-01T00:00:00Z
pub const JAN_1: i64 = 1_704_067_200_000;
pub const DAY: i64 = 86_400_000;
pub const HOUR: i64 = 3_600_000;

/// A week of mixed editor telemetry, three records per hour slot
pub fn sample_events() -> Vec<EventRecord> {
    let mut events = Vec::new();
    for day in 0..7 {
        let base = JAN_1 + day * DAY;
        events.push(
            EventRecord::new("error", "save", base + HOUR)
                .with_value(1.0)
                .with_meta("severity", 2.0)
                .with_host("darwin", "1.4.0", "arm64"),
        );
        events.push(
            EventRecord::new("navigation", "open", base + 2 * HOUR)
                .with_value(3.0)
                .with_meta("responseTime", 120.0)
                .with_host("win32", "1.4.0", "x64"),
        );
        events.push(
            EventRecord::new("auto-update", "error", base + 3 * HOUR)
                .with_meta("errorType", if day % 2 == 0 { "network" } else { "checksum" })
                .with_meta("attemptNumber", 2.0)
                .with_host("linux", "1.3.9", "x64"),
        );
    }
    events
}

/// Processor over an in-memory cache driven by `clock`
pub async fn memory_processor(
    workers: usize,
    chunk_size: usize,
    backend: Arc<dyn CacheBackend>,
    clock: Arc<ManualClock>,
) -> AnalyticsProcessor {
    let cache = AnalyticsCache::with_backend(backend, Duration::from_secs(3600), 100, clock).await;
    AnalyticsProcessor::from_parts(
        WorkerPool::new(workers, Arc::new(ChunkProcessor)),
        cache,
        AggregateMerger::default(),
        chunk_size,
    )
}

/// Processor without a cache, pairwise averaging
pub fn uncached_processor(workers: usize, chunk_size: usize) -> AnalyticsProcessor {
    uncached_processor_with(workers, chunk_size, AggregateMerger::default())
}

pub fn uncached_processor_with(
    workers: usize,
    chunk_size: usize,
    merger: AggregateMerger,
) -> AnalyticsProcessor {
    AnalyticsProcessor::from_parts(
        WorkerPool::new(workers, Arc::new(ChunkProcessor)),
        AnalyticsCache::disabled(),
        merger,
        chunk_size,
    )
}
