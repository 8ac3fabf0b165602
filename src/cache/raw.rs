//! Raw-data store: event records grouped by calendar day

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

use super::backend::{CacheBackend, StoreKind};
use super::error::{CacheError, CacheResult};
use super::processed::ttl_millis;
use crate::telemetry::event::DAY_FORMAT;
use crate::telemetry::EventRecord;

/// All cached records of one day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawDayEntry {
    /// `YYYY-MM-DD`
    pub date: String,
    pub records: Vec<EventRecord>,
    pub stored_at: i64,
}

#[derive(Debug)]
pub struct RawDataStore {
    days: BTreeMap<String, RawDayEntry>,
    ttl: Duration,
}

impl RawDataStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            days: BTreeMap::new(),
            ttl,
        }
    }

    fn is_expired(&self, entry: &RawDayEntry, now: i64) -> bool {
        now.saturating_sub(entry.stored_at) >= ttl_millis(self.ttl)
    }

    pub async fn load(&mut self, backend: &dyn CacheBackend, now: i64) -> CacheResult<usize> {
        let mut stale = Vec::new();

        for blob in backend.load_all(StoreKind::Raw).await? {
            match serde_json::from_str::<RawDayEntry>(&blob.body) {
                Ok(entry) if self.is_expired(&entry, now) => stale.push(blob.key),
                Ok(entry) => {
                    self.days.insert(entry.date.clone(), entry);
                }
                Err(e) => {
                    warn!("Dropping raw cache entry: {}", CacheError::corrupt(&blob.key, e));
                    stale.push(blob.key);
                }
            }
        }
        for key in stale {
            backend.remove(StoreKind::Raw, &key).await?;
        }

        debug!("Loaded {} raw cache days", self.days.len());
        Ok(self.days.len())
    }

    /// Group records by day and overwrite each day's entry
    ///
    /// Records without a usable timestamp are skipped.
    pub async fn put(
        &mut self,
        backend: &dyn CacheBackend,
        records: &[EventRecord],
        now: i64,
    ) -> CacheResult<usize> {
        let mut grouped: BTreeMap<String, Vec<EventRecord>> = BTreeMap::new();
        for record in records {
            if let Some(day) = record.day_key() {
                grouped.entry(day).or_default().push(record.clone());
            }
        }

        let written = grouped.len();
        for (date, records) in grouped {
            let entry = RawDayEntry {
                date,
                records,
                stored_at: now,
            };
            backend
                .write(StoreKind::Raw, &entry.date, &serde_json::to_string(&entry)?)
                .await?;
            self.days.insert(entry.date.clone(), entry);
        }
        Ok(written)
    }

    /// Records of every live day in the inclusive window, by day then insertion order
    pub async fn get(
        &mut self,
        backend: &dyn CacheBackend,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        now: i64,
    ) -> CacheResult<Vec<EventRecord>> {
        let expired: Vec<String> = self
            .days
            .values()
            .filter(|entry| self.is_expired(entry, now))
            .map(|entry| entry.date.clone())
            .collect();
        for date in expired {
            self.days.remove(&date);
            backend.remove(StoreKind::Raw, &date).await?;
        }

        let in_window = |date: &str| match NaiveDate::parse_from_str(date, DAY_FORMAT) {
            Ok(day) => start.map_or(true, |s| day >= s) && end.map_or(true, |e| day <= e),
            Err(_) => false,
        };

        Ok(self
            .days
            .values()
            .filter(|entry| in_window(&entry.date))
            .flat_map(|entry| entry.records.iter().cloned())
            .collect())
    }

    pub async fn clear(&mut self, backend: &dyn CacheBackend) -> CacheResult<()> {
        self.days.clear();
        backend.clear(StoreKind::Raw).await
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::backend::MemoryCacheBackend;

    // 2024-01-01T12:00:00Z
    const JAN_1: i64 = 1_704_110_400_000;
    const DAY_MS: i64 = 86_400_000;
    const HOUR: Duration = Duration::from_secs(3600);

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn records() -> Vec<EventRecord> {
        vec![
            EventRecord::new("navigation", "b", JAN_1 + DAY_MS),
            EventRecord::new("navigation", "a", JAN_1),
            EventRecord::new("navigation", "c", JAN_1 + DAY_MS),
            EventRecord::new("navigation", "d", JAN_1 + 2 * DAY_MS),
        ]
    }

    fn actions(records: &[EventRecord]) -> Vec<&str> {
        records.iter().map(|r| r.action.as_str()).collect()
    }

    #[tokio::test]
    async fn test_records_grouped_by_day_in_order() {
        let backend = MemoryCacheBackend::new();
        let mut store = RawDataStore::new(HOUR);

        let days = store.put(&backend, &records(), 0).await.unwrap();
        assert_eq!(days, 3);
        assert_eq!(backend.len(StoreKind::Raw).await, 3);

        let all = store.get(&backend, None, None, 0).await.unwrap();
        assert_eq!(actions(&all), vec!["a", "b", "c", "d"]);
    }

    #[tokio::test]
    async fn test_window_is_inclusive() {
        let backend = MemoryCacheBackend::new();
        let mut store = RawDataStore::new(HOUR);
        store.put(&backend, &records(), 0).await.unwrap();

        let window = store
            .get(&backend, Some(day(2)), Some(day(3)), 0)
            .await
            .unwrap();
        assert_eq!(actions(&window), vec!["b", "c", "d"]);

        let open_start = store.get(&backend, None, Some(day(1)), 0).await.unwrap();
        assert_eq!(actions(&open_start), vec!["a"]);
    }

    #[tokio::test]
    async fn test_put_overwrites_day() {
        let backend = MemoryCacheBackend::new();
        let mut store = RawDataStore::new(HOUR);
        store.put(&backend, &records(), 0).await.unwrap();

        let replacement = vec![EventRecord::new("navigation", "z", JAN_1)];
        store.put(&backend, &replacement, 0).await.unwrap();

        let first_day = store
            .get(&backend, Some(day(1)), Some(day(1)), 0)
            .await
            .unwrap();
        assert_eq!(actions(&first_day), vec!["z"]);
    }

    #[tokio::test]
    async fn test_expired_days_are_dropped() {
        let backend = MemoryCacheBackend::new();
        let mut store = RawDataStore::new(HOUR);
        store.put(&backend, &records()[..2], 0).await.unwrap();
        store
            .put(&backend, &records()[3..], 3_000_000)
            .await
            .unwrap();

        let live = store.get(&backend, None, None, 3_600_000).await.unwrap();
        assert_eq!(actions(&live), vec!["d"]);
        assert_eq!(store.len(), 1);
        assert_eq!(backend.len(StoreKind::Raw).await, 1);
    }

    #[tokio::test]
    async fn test_reload_from_backend() {
        let backend = MemoryCacheBackend::new();
        RawDataStore::new(HOUR)
            .put(&backend, &records(), 0)
            .await
            .unwrap();

        let mut reloaded = RawDataStore::new(HOUR);
        assert_eq!(reloaded.load(&backend, 10).await.unwrap(), 3);
        assert_eq!(reloaded.get(&backend, None, None, 10).await.unwrap().len(), 4);
    }
}
