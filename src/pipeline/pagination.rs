//! Page requests and derived pagination metadata

use serde::{Deserialize, Serialize};
use std::ops::Range;
use thiserror::Error;

/// Page size used when a request does not specify one
pub const DEFAULT_PAGE_SIZE: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaginationError {
    #[error("page numbers start at 1")]
    ZeroPage,

    #[error("page size must be at least 1")]
    ZeroPageSize,

    #[error("page {page} is beyond the last page ({last_page})")]
    PageOutOfRange { page: usize, last_page: usize },
}

/// Requested page window, 1-based
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRequest {
    pub page: usize,
    pub page_size: usize,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageRequest {
    pub fn new(page: usize, page_size: usize) -> Self {
        Self { page, page_size }
    }

    /// Reject malformed requests before anything is dispatched
    pub fn validate(&self) -> Result<(), PaginationError> {
        if self.page_size == 0 {
            return Err(PaginationError::ZeroPageSize);
        }
        if self.page == 0 {
            return Err(PaginationError::ZeroPage);
        }
        Ok(())
    }

    /// Index range of this page within `total_items` records
    pub fn window(&self, total_items: usize) -> Range<usize> {
        let start = self
            .page
            .saturating_sub(1)
            .saturating_mul(self.page_size)
            .min(total_items);
        let end = start.saturating_add(self.page_size).min(total_items);
        start..end
    }
}

/// Navigation metadata derived from the filtered item count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current_page: usize,
    pub total_pages: usize,
    pub total_items: usize,
    pub has_next_page: bool,
    pub has_previous_page: bool,
}

impl Pagination {
    /// Compute metadata for `page`; pages past the last one are rejected, never clamped
    pub fn compute(
        total_items: usize,
        page: usize,
        page_size: usize,
    ) -> Result<Self, PaginationError> {
        PageRequest::new(page, page_size).validate()?;

        let total_pages = total_items.div_ceil(page_size);
        let last_page = total_pages.max(1);
        if page > last_page {
            return Err(PaginationError::PageOutOfRange { page, last_page });
        }

        Ok(Self {
            current_page: page,
            total_pages,
            total_items,
            has_next_page: page < total_pages,
            has_previous_page: page > 1,
        })
    }

    pub fn for_request(total_items: usize, request: &PageRequest) -> Result<Self, PaginationError> {
        Self::compute(total_items, request.page, request.page_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_page_of_ninety_five_items() {
        let p = Pagination::compute(95, 5, 20).unwrap();

        assert_eq!(p.total_pages, 5);
        assert!(!p.has_next_page);
        assert!(p.has_previous_page);
    }

    #[test]
    fn test_first_page_flags() {
        let p = Pagination::compute(95, 1, 20).unwrap();

        assert!(p.has_next_page);
        assert!(!p.has_previous_page);
    }

    #[test]
    fn test_empty_dataset_has_one_addressable_page() {
        let p = Pagination::compute(0, 1, 20).unwrap();

        assert_eq!(p.total_pages, 0);
        assert_eq!(p.current_page, 1);
        assert!(!p.has_next_page);
        assert!(!p.has_previous_page);
    }

    #[test]
    fn test_page_beyond_last_is_rejected() {
        let err = Pagination::compute(95, 6, 20).unwrap_err();
        assert_eq!(err, PaginationError::PageOutOfRange { page: 6, last_page: 5 });
    }

    #[test]
    fn test_zero_page_size_is_rejected() {
        assert_eq!(
            Pagination::compute(10, 1, 0).unwrap_err(),
            PaginationError::ZeroPageSize
        );
        assert_eq!(
            Pagination::compute(10, 0, 10).unwrap_err(),
            PaginationError::ZeroPage
        );
    }

    #[test]
    fn test_window_of_partial_last_page() {
        let request = PageRequest::new(5, 20);
        assert_eq!(request.window(95), 80..95);
        assert_eq!(PageRequest::new(1, 20).window(5), 0..5);
    }
}
