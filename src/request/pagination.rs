//! Page-number pagination
//!
//! Ordway pages are 1-indexed and the first empty page marks the end of a
//! resource. A page is never fetched twice.

use std::collections::BTreeMap;

/// Tracks progress through the pages of one fetch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaginationState {
    /// Page to request next
    pub page: u32,
    /// Total records fetched so far
    pub total_fetched: u64,
    /// Is pagination complete?
    pub done: bool,
}

impl PaginationState {
    /// Create state with a starting page
    pub fn with_page(page: u32) -> Self {
        Self {
            page,
            ..Default::default()
        }
    }

    /// Mark pagination as complete
    pub fn mark_done(&mut self) {
        self.done = true;
    }
}

/// Page number paginator with an empty-page stop condition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageNumberPaginator {
    /// Query parameter name for page number
    pub page_param: String,
    /// First page number
    pub start_page: u32,
    /// Query parameter name for page size
    pub page_size_param: String,
    /// Page size value
    pub page_size: u32,
}

impl PageNumberPaginator {
    /// Paginator using Ordway's `page` and `size` parameters
    pub fn new(page_size: u32) -> Self {
        Self {
            page_param: "page".to_string(),
            start_page: 1,
            page_size_param: "size".to_string(),
            page_size,
        }
    }

    /// State positioned on the first page
    pub fn initial_state(&self) -> PaginationState {
        PaginationState::with_page(self.start_page)
    }

    /// Query parameters for the page the state points at
    pub fn params(&self, state: &PaginationState) -> BTreeMap<String, String> {
        let mut params = BTreeMap::new();
        params.insert(self.page_size_param.clone(), self.page_size.to_string());
        params.insert(self.page_param.clone(), state.page.to_string());
        params
    }

    /// Record a fetched page of `records_count` records and move to the next one
    pub fn advance(&self, state: &mut PaginationState, records_count: usize) {
        state.total_fetched += records_count as u64;

        if records_count == 0 {
            state.mark_done();
        } else {
            state.page += 1;
        }
    }
}
