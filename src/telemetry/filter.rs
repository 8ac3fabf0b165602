//! Category and date-range filters
//!
//! Both filters are pure predicates over [`EventRecord`], so applying the same
//! filter twice selects exactly the same records as applying it once.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use super::event::EventRecord;

/// Per-category on/off flags
///
/// Keys are kept sorted so the filter has a single canonical encoding. A filter
/// with no active category admits every record; the processor then reports a
/// total-only view instead of an empty chart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryFilter(BTreeMap<String, bool>);

impl CategoryFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter with the given categories switched on
    pub fn with_active<I, S>(categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        categories.into_iter().map(|c| (c.into(), true)).collect()
    }

    pub fn set(&mut self, category: impl Into<String>, active: bool) {
        self.0.insert(category.into(), active);
    }

    pub fn is_active(&self, category: &str) -> bool {
        self.0.get(category).copied().unwrap_or(false)
    }

    /// At least one category is switched on
    pub fn any_active(&self) -> bool {
        self.0.values().any(|&on| on)
    }

    /// Names of the active categories, sorted
    pub fn active(&self) -> impl Iterator<Item = &str> {
        self.0
            .iter()
            .filter(|(_, on)| **on)
            .map(|(name, _)| name.as_str())
    }

    pub fn as_map(&self) -> &BTreeMap<String, bool> {
        &self.0
    }

    /// Whether the record passes the category filter
    pub fn admits(&self, record: &EventRecord) -> bool {
        !self.any_active() || self.is_active(&record.category)
    }
}

impl FromIterator<(String, bool)> for CategoryFilter {
    fn from_iter<I: IntoIterator<Item = (String, bool)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// The start of a date range lies after its end
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid date range: start {start} is after end {end}")]
pub struct InvalidDateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Inclusive range of UTC calendar days
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Create a range, rejecting `start > end`
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, InvalidDateRange> {
        let range = Self { start, end };
        range.validate()?;
        Ok(range)
    }

    /// Ranges built through serde bypass [`DateRange::new`]; check them here
    pub fn validate(&self) -> Result<(), InvalidDateRange> {
        if self.start > self.end {
            return Err(InvalidDateRange {
                start: self.start,
                end: self.end,
            });
        }
        Ok(())
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Records without a representable date never fall inside a range
    pub fn admits(&self, record: &EventRecord) -> bool {
        record.date().is_some_and(|d| self.contains(d))
    }
}

/// Combined filter predicate; an absent range passes everything through
pub fn admits(record: &EventRecord, categories: &CategoryFilter, range: Option<&DateRange>) -> bool {
    range.map_or(true, |r| r.admits(record)) && categories.admits(record)
}

/// Records passing both filters, in original order
pub fn filter_events(
    events: &[EventRecord],
    categories: &CategoryFilter,
    range: Option<&DateRange>,
) -> Vec<EventRecord> {
    events
        .iter()
        .filter(|e| admits(e, categories, range))
        .cloned()
        .collect()
}
