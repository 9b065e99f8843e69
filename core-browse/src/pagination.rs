//! Pagination helper types for catalog queries

use serde::{Deserialize, Serialize};

/// Pagination request parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageRequest {
    /// Current page number (1-indexed, as shown in the location)
    pub page: u32,
    /// Number of items per page
    pub page_size: u32,
}

impl PageRequest {
    /// Create a new page request. Page 0 is treated as page 1.
    ///
    /// # Examples
    ///
    /// ```
    /// use core_browse::PageRequest;
    ///
    /// let request = PageRequest::new(2, 48);
    /// assert_eq!(request.offset(), 48);
    /// assert_eq!(request.limit(), 48);
    /// ```
    pub fn new(page: u32, page_size: u32) -> Self {
        Self {
            page: page.max(1),
            page_size,
        }
    }

    /// Number of items skipped before this page
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.page_size)
    }

    /// Get the limit value (same as page_size)
    pub fn limit(&self) -> u32 {
        self.page_size
    }

    /// Request for the following page with the same size
    pub fn next(&self) -> Self {
        Self::new(self.page.saturating_add(1), self.page_size)
    }

    /// Request for the preceding page, stopping at page 1
    pub fn previous(&self) -> Self {
        Self::new(self.page.saturating_sub(1), self.page_size)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: core_runtime::config::DEFAULT_PAGE_SIZE,
        }
    }
}

/// Number of pages needed to show `total` items.
pub fn total_pages(total: u64, page_size: u32) -> u32 {
    if page_size == 0 {
        return 0;
    }
    let pages = total.div_ceil(u64::from(page_size));
    u32::try_from(pages).unwrap_or(u32::MAX)
}

/// `true` when `page` is followed by another page.
pub fn has_next(page: u32, total_pages: u32) -> bool {
    page < total_pages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_request_offset() {
        let request = PageRequest::new(1, 20);
        assert_eq!(request.offset(), 0);
        assert_eq!(request.limit(), 20);

        let request = PageRequest::new(3, 20);
        assert_eq!(request.offset(), 40);
    }

    #[test]
    fn test_page_zero_clamps_to_first_page() {
        assert_eq!(PageRequest::new(0, 10).page, 1);
        assert_eq!(PageRequest::new(1, 10).previous().page, 1);
    }

    #[test]
    fn test_next_page() {
        let next = PageRequest::new(2, 10).next();
        assert_eq!(next, PageRequest::new(3, 10));
    }

    #[test]
    fn test_default_page_request() {
        let request = PageRequest::default();
        assert_eq!(request.page, 1);
        assert_eq!(request.page_size, 48);
    }

    #[test]
    fn test_total_pages() {
        assert_eq!(total_pages(0, 48), 0);
        assert_eq!(total_pages(48, 48), 1);
        assert_eq!(total_pages(49, 48), 2);
        assert_eq!(total_pages(10, 0), 0);
    }

    #[test]
    fn test_has_next() {
        assert!(has_next(1, 3));
        assert!(!has_next(3, 3));
        assert!(!has_next(1, 0));
    }
}
