//! Processed-data store: final aggregates keyed by request hash
//!
//! Entries expire `ttl` after they were stored and are purged the first time an
//! expired entry is read. The store never holds more than `max_entries`; a put
//! into a full store evicts the oldest entries by `storedAt` first.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

use super::backend::{CacheBackend, StoreKind};
use super::error::{CacheError, CacheResult};
use super::key::CacheKey;
use crate::pipeline::aggregate::FinalAggregate;

/// A cached final aggregate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedEntry {
    pub key: CacheKey,
    pub value: FinalAggregate,
    /// Milliseconds since the Unix epoch
    pub stored_at: i64,
    pub hash: String,
}

impl CachedEntry {
    pub fn new(key: CacheKey, value: FinalAggregate, stored_at: i64) -> Self {
        let hash = key.hash();
        Self {
            key,
            value,
            stored_at,
            hash,
        }
    }

    pub fn is_expired(&self, now: i64, ttl: Duration) -> bool {
        now.saturating_sub(self.stored_at) >= ttl_millis(ttl)
    }
}

pub(crate) fn ttl_millis(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX)
}

/// Hit and churn counters of the processed store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCounters {
    pub hits: u64,
    pub misses: u64,
    pub expirations: u64,
    pub evictions: u64,
}

#[derive(Debug)]
pub struct ProcessedStore {
    entries: HashMap<String, CachedEntry>,
    ttl: Duration,
    max_entries: usize,
    counters: StoreCounters,
}

impl ProcessedStore {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
            max_entries: max_entries.max(1),
            counters: StoreCounters::default(),
        }
    }

    /// Load persisted entries, dropping expired and unreadable ones
    pub async fn load(&mut self, backend: &dyn CacheBackend, now: i64) -> CacheResult<usize> {
        let mut stale = Vec::new();

        for blob in backend.load_all(StoreKind::Processed).await? {
            match serde_json::from_str::<CachedEntry>(&blob.body) {
                Ok(entry) if entry.is_expired(now, self.ttl) => stale.push(blob.key),
                Ok(entry) => {
                    self.entries.insert(entry.hash.clone(), entry);
                }
                Err(e) => {
                    warn!("Dropping cache entry: {}", CacheError::corrupt(&blob.key, e));
                    stale.push(blob.key);
                }
            }
        }

        for key in stale {
            backend.remove(StoreKind::Processed, &key).await?;
        }
        // a shrunk max_entries applies to what was persisted before
        while self.entries.len() > self.max_entries {
            self.evict_oldest(backend).await?;
        }

        debug!("Loaded {} processed cache entries", self.entries.len());
        Ok(self.entries.len())
    }

    /// Look up a final aggregate by request hash
    pub async fn get(
        &mut self,
        backend: &dyn CacheBackend,
        hash: &str,
        now: i64,
    ) -> CacheResult<Option<FinalAggregate>> {
        let Some(entry) = self.entries.get(hash) else {
            self.counters.misses += 1;
            return Ok(None);
        };

        if entry.is_expired(now, self.ttl) {
            self.entries.remove(hash);
            self.counters.expirations += 1;
            self.counters.misses += 1;
            debug!("Cache entry {} expired", hash);
            backend.remove(StoreKind::Processed, hash).await?;
            return Ok(None);
        }

        self.counters.hits += 1;
        Ok(Some(entry.value.clone()))
    }

    /// Insert or overwrite the entry for `key`
    pub async fn put(
        &mut self,
        backend: &dyn CacheBackend,
        key: CacheKey,
        value: FinalAggregate,
        now: i64,
    ) -> CacheResult<()> {
        let entry = CachedEntry::new(key, value, now);

        if !self.entries.contains_key(&entry.hash) {
            while self.entries.len() >= self.max_entries {
                self.evict_oldest(backend).await?;
            }
        }

        let body = serde_json::to_string(&entry)?;
        backend
            .write(StoreKind::Processed, &entry.hash, &body)
            .await?;
        self.entries.insert(entry.hash.clone(), entry);
        Ok(())
    }

    async fn evict_oldest(&mut self, backend: &dyn CacheBackend) -> CacheResult<()> {
        let oldest = self
            .entries
            .values()
            .min_by(|a, b| {
                a.stored_at
                    .cmp(&b.stored_at)
                    .then_with(|| a.hash.cmp(&b.hash))
            })
            .map(|entry| entry.hash.clone());

        if let Some(hash) = oldest {
            self.entries.remove(&hash);
            self.counters.evictions += 1;
            debug!("Evicted cache entry {}", hash);
            backend.remove(StoreKind::Processed, &hash).await?;
        }
        Ok(())
    }

    pub async fn clear(&mut self, backend: &dyn CacheBackend) -> CacheResult<()> {
        self.entries.clear();
        backend.clear(StoreKind::Processed).await
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn counters(&self) -> StoreCounters {
        self.counters
    }
}
