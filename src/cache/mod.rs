//! Two-tier analytics cache
//!
//! [`AnalyticsCache`] owns the raw-data store (records grouped by day) and the
//! processed-data store (final aggregates keyed by request hash), each behind
//! its own lock. The cache never fails a request: if the backend cannot be
//! opened the cache runs disabled, and backend errors during reads and writes
//! are logged and treated as a miss or a dropped write.

pub mod backend;
pub mod clock;
pub mod error;
pub mod key;
pub mod processed;
pub mod raw;

pub use backend::{CacheBackend, FileCacheBackend, MemoryCacheBackend, StoreKind};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{CacheError, CacheResult};
pub use key::CacheKey;
pub use processed::{CachedEntry, ProcessedStore};
pub use raw::RawDataStore;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::{CacheBackendKind, CacheSettings};
use crate::pipeline::aggregate::FinalAggregate;
use crate::telemetry::EventRecord;

/// Cache counters as reported to operators
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub enabled: bool,
    pub raw_entries: usize,
    pub processed_entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub expirations: u64,
    pub evictions: u64,
}

struct EnabledCache {
    backend: Arc<dyn CacheBackend>,
    clock: Arc<dyn Clock>,
    raw: Mutex<RawDataStore>,
    processed: Mutex<ProcessedStore>,
}

pub struct AnalyticsCache {
    inner: Option<EnabledCache>,
}

impl AnalyticsCache {
    /// Open the cache described by `settings`
    ///
    /// Never fails: a disabled setting or an unusable backend yields a disabled
    /// cache.
    pub async fn open(settings: &CacheSettings) -> Self {
        if !settings.enabled {
            debug!("Cache disabled by configuration");
            return Self::disabled();
        }

        let backend: Arc<dyn CacheBackend> = match settings.backend {
            CacheBackendKind::Memory => Arc::new(MemoryCacheBackend::new()),
            CacheBackendKind::File => {
                let Some(dir) = settings.resolved_dir() else {
                    warn!("No cache directory available, running without cache");
                    return Self::disabled();
                };
                match FileCacheBackend::open(&dir).await {
                    Ok(backend) => Arc::new(backend),
                    Err(e) => {
                        warn!("Cache unavailable, running without cache: {}", e);
                        return Self::disabled();
                    }
                }
            }
        };

        Self::with_backend(
            backend,
            settings.ttl,
            settings.max_entries,
            Arc::new(SystemClock),
        )
        .await
    }

    /// Build a cache over an existing backend, loading what it holds
    pub async fn with_backend(
        backend: Arc<dyn CacheBackend>,
        ttl: Duration,
        max_entries: usize,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let now = clock.now_millis();
        let mut raw = RawDataStore::new(ttl);
        let mut processed = ProcessedStore::new(ttl, max_entries);

        if let Err(e) = raw.load(backend.as_ref(), now).await {
            warn!("Cannot load raw cache, running without cache: {}", e);
            return Self::disabled();
        }
        if let Err(e) = processed.load(backend.as_ref(), now).await {
            warn!("Cannot load processed cache, running without cache: {}", e);
            return Self::disabled();
        }

        info!(
            "Cache ready ({} raw days, {} processed entries)",
            raw.len(),
            processed.len()
        );
        Self {
            inner: Some(EnabledCache {
                backend,
                clock,
                raw: Mutex::new(raw),
                processed: Mutex::new(processed),
            }),
        }
    }

    /// A cache that misses every read and drops every write
    pub fn disabled() -> Self {
        Self { inner: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    pub async fn get_processed(&self, key: &CacheKey) -> Option<FinalAggregate> {
        let inner = self.inner.as_ref()?;
        let hash = key.hash();
        let now = inner.clock.now_millis();

        let mut store = inner.processed.lock().await;
        match store.get(inner.backend.as_ref(), &hash, now).await {
            Ok(hit) => {
                debug!(
                    "Processed cache {} for {}",
                    if hit.is_some() { "hit" } else { "miss" },
                    hash
                );
                hit
            }
            Err(e) => {
                warn!("Processed cache read failed, treating as miss: {}", e);
                None
            }
        }
    }

    pub async fn put_processed(&self, key: CacheKey, value: FinalAggregate) {
        let Some(inner) = self.inner.as_ref() else {
            return;
        };
        let now = inner.clock.now_millis();

        let mut store = inner.processed.lock().await;
        if let Err(e) = store.put(inner.backend.as_ref(), key, value, now).await {
            warn!("Processed cache write dropped: {}", e);
        }
    }

    /// Store records grouped by day; returns the number of days written
    pub async fn put_raw(&self, records: &[EventRecord]) -> usize {
        let Some(inner) = self.inner.as_ref() else {
            return 0;
        };
        let now = inner.clock.now_millis();

        let mut store = inner.raw.lock().await;
        match store.put(inner.backend.as_ref(), records, now).await {
            Ok(days) => days,
            Err(e) => {
                warn!("Raw cache write dropped: {}", e);
                0
            }
        }
    }

    /// Cached records within the optional inclusive day window
    pub async fn get_raw(&self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Vec<EventRecord> {
        let Some(inner) = self.inner.as_ref() else {
            return Vec::new();
        };
        let now = inner.clock.now_millis();

        let mut store = inner.raw.lock().await;
        store
            .get(inner.backend.as_ref(), start, end, now)
            .await
            .unwrap_or_else(|e| {
                warn!("Raw cache read failed, treating as miss: {}", e);
                Vec::new()
            })
    }

    pub async fn stats(&self) -> CacheStats {
        let Some(inner) = self.inner.as_ref() else {
            return CacheStats::default();
        };

        let raw_entries = inner.raw.lock().await.len();
        let processed = inner.processed.lock().await;
        let counters = processed.counters();
        CacheStats {
            enabled: true,
            raw_entries,
            processed_entries: processed.len(),
            hits: counters.hits,
            misses: counters.misses,
            expirations: counters.expirations,
            evictions: counters.evictions,
        }
    }

    /// Empty both stores
    pub async fn clear(&self) -> CacheResult<()> {
        let Some(inner) = self.inner.as_ref() else {
            return Ok(());
        };

        inner.raw.lock().await.clear(inner.backend.as_ref()).await?;
        inner
            .processed
            .lock()
            .await
            .clear(inner.backend.as_ref())
            .await?;
        info!("Cache cleared");
        Ok(())
    }
}

impl std::fmt::Debug for AnalyticsCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyticsCache")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}
