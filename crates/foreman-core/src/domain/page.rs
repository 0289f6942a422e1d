//! Paging for list queries.

use serde::{Deserialize, Serialize};

use super::errors::{ForemanError, Result};

pub const MAX_PAGE_SIZE: u32 = 100;

/// 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 20,
        }
    }
}

impl PageRequest {
    pub fn new(page: u32, page_size: u32) -> Self {
        Self { page, page_size }
    }

    pub fn validate(&self) -> Result<()> {
        if self.page == 0 {
            return Err(ForemanError::Validation("page starts at 1".into()));
        }
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(ForemanError::Validation(format!(
                "page size must be between 1 and {MAX_PAGE_SIZE}, got {}",
                self.page_size
            )));
        }
        Ok(())
    }

    pub fn offset(&self) -> usize {
        (self.page.saturating_sub(1) as usize) * self.page_size as usize
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_items: usize,
    pub page: u32,
    pub page_size: u32,
    pub has_next: bool,
}

impl<T> Page<T> {
    /// Cut one page out of an already filtered and ordered list.
    pub fn slice(all: Vec<T>, request: &PageRequest) -> Self {
        let total_items = all.len();
        let offset = request.offset();
        let items: Vec<T> = all
            .into_iter()
            .skip(offset)
            .take(request.page_size as usize)
            .collect();
        let has_next = offset + items.len() < total_items;
        Self {
            items,
            total_items,
            page: request.page,
            page_size: request.page_size,
            has_next,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slices_pages() {
        let all: Vec<u32> = (1..=7).collect();
        let first = Page::slice(all.clone(), &PageRequest::new(1, 3));
        assert_eq!(first.items, vec![1, 2, 3]);
        assert!(first.has_next);

        let last = Page::slice(all, &PageRequest::new(3, 3));
        assert_eq!(last.items, vec![7]);
        assert_eq!(last.total_items, 7);
        assert!(!last.has_next);
    }

    #[test]
    fn rejects_bad_requests() {
        assert!(PageRequest::new(0, 10).validate().is_err());
        assert!(PageRequest::new(1, 0).validate().is_err());
        assert!(PageRequest::new(1, MAX_PAGE_SIZE + 1).validate().is_err());
        assert!(PageRequest::default().validate().is_ok());
    }
}
