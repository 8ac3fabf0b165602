//! Canonical request fingerprints
//!
//! A key is built from the category flags, the optional date range and the page
//! window. Categories live in a sorted map, so the canonical JSON encoding and
//! its SHA-256 digest do not depend on the order flags were set in.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::pipeline::pagination::PageRequest;
use crate::telemetry::event::DAY_FORMAT;
use crate::telemetry::{CategoryFilter, DateRange};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheKey {
    pub categories: CategoryFilter,
    pub date_range: Option<DateRange>,
    pub page: usize,
    pub page_size: usize,
}

impl CacheKey {
    pub fn from_request(
        categories: &CategoryFilter,
        date_range: Option<&DateRange>,
        pagination: &PageRequest,
    ) -> Self {
        Self {
            categories: categories.clone(),
            date_range: date_range.cloned(),
            page: pagination.page,
            page_size: pagination.page_size,
        }
    }

    /// Stable JSON encoding of the key
    pub fn canonical(&self) -> String {
        let date_range = self.date_range.as_ref().map(|range| {
            serde_json::json!({
                "end": range.end.format(DAY_FORMAT).to_string(),
                "start": range.start.format(DAY_FORMAT).to_string(),
            })
        });
        serde_json::json!({
            "categories": self.categories.as_map(),
            "dateRange": date_range,
            "pagination": {
                "page": self.page,
                "pageSize": self.page_size,
            },
        })
        .to_string()
    }

    /// Hex SHA-256 of the canonical encoding
    pub fn hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.canonical().as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_hash_ignores_flag_insertion_order() {
        let mut first = CategoryFilter::new();
        first.set("a", true);
        first.set("b", false);
        let mut second = CategoryFilter::new();
        second.set("b", false);
        second.set("a", true);

        let page = PageRequest::new(1, 50);
        let a = CacheKey::from_request(&first, None, &page);
        let b = CacheKey::from_request(&second, None, &page);

        assert_eq!(a.hash(), b.hash());
        assert_eq!(a.hash().len(), 64);
    }

    #[test]
    fn test_canonical_encoding() {
        let categories: CategoryFilter = [("b".to_string(), false), ("a".to_string(), true)]
            .into_iter()
            .collect();
        let key = CacheKey::from_request(&categories, None, &PageRequest::default());

        assert_eq!(
            key.canonical(),
            r#"{"categories":{"a":true,"b":false},"dateRange":null,"pagination":{"page":1,"pageSize":50}}"#
        );
    }

    #[test]
    fn test_hash_distinguishes_page_and_range() {
        let categories = CategoryFilter::with_active(["error"]);
        let page_one = CacheKey::from_request(&categories, None, &PageRequest::new(1, 50));
        let page_two = CacheKey::from_request(&categories, None, &PageRequest::new(2, 50));
        assert_ne!(page_one.hash(), page_two.hash());

        let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let range = DateRange::new(day, day).unwrap();
        let ranged = CacheKey::from_request(&categories, Some(&range), &PageRequest::new(1, 50));
        assert_ne!(page_one.hash(), ranged.hash());
    }
}
