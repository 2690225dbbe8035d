//! Pagination and sorting
//!
//! Every traversal and search can be called with or without a [`PageRequest`].
//! Without one, the full result is returned as a single page in the
//! operation's natural order.

use crate::models::ValidationError;
use serde::{Deserialize, Serialize};

/// Field a result can be sorted by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortField {
    Id,
    Name,
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// One sort key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortOrder {
    pub field: SortField,
    #[serde(default)]
    pub direction: SortDirection,
}

impl SortOrder {
    pub fn asc(field: SortField) -> Self {
        Self {
            field,
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: SortField) -> Self {
        Self {
            field,
            direction: SortDirection::Desc,
        }
    }
}

/// Page selection
///
/// `page` is zero-based. An empty `sort` keeps the operation's natural order
/// (children by id, descendants by depth, ancestors nearest first).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub size: u32,
    #[serde(default)]
    pub sort: Vec<SortOrder>,
}

impl PageRequest {
    pub fn new(page: u32, size: u32) -> Self {
        Self {
            page,
            size,
            sort: Vec::new(),
        }
    }

    /// First page with the given size
    pub fn first(size: u32) -> Self {
        Self::new(0, size)
    }

    /// Append a sort key
    pub fn sorted_by(mut self, order: SortOrder) -> Self {
        self.sort.push(order);
        self
    }

    /// Number of rows skipped before this page
    pub fn offset(&self) -> u64 {
        u64::from(self.page) * u64::from(self.size)
    }

    /// Check the page size against an upper bound
    pub fn validate(&self, max_size: u32) -> Result<(), ValidationError> {
        if self.size == 0 {
            return Err(ValidationError::InvalidPage(
                "page size must be greater than 0".to_string(),
            ));
        }
        if self.size > max_size {
            return Err(ValidationError::InvalidPage(format!(
                "page size {} exceeds maximum of {}",
                self.size, max_size
            )));
        }
        Ok(())
    }
}

/// One page of results
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub size: u32,
    pub total_elements: u64,
    pub total_pages: u32,
}

impl<T> Page<T> {
    /// Build a page from a slice of a larger result
    pub fn new(items: Vec<T>, request: &PageRequest, total_elements: u64) -> Self {
        let size = u64::from(request.size.max(1));
        let total_pages = total_elements.div_ceil(size);
        Self {
            items,
            page: request.page,
            size: request.size,
            total_elements,
            total_pages: u32::try_from(total_pages).unwrap_or(u32::MAX),
        }
    }

    /// Wrap a complete result as a single page
    pub fn unpaged(items: Vec<T>) -> Self {
        let total = items.len();
        Self {
            page: 0,
            size: u32::try_from(total).unwrap_or(u32::MAX),
            total_elements: total as u64,
            total_pages: if total == 0 { 0 } else { 1 },
            items,
        }
    }

    /// Replace the items, keeping the page metadata
    pub fn with_items<U>(self, items: Vec<U>) -> Page<U> {
        Page {
            items,
            page: self.page,
            size: self.size,
            total_elements: self.total_elements,
            total_pages: self.total_pages,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_items(self) -> Vec<T> {
        self.items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_counts_partial_last_page() {
        let request = PageRequest::new(2, 4);
        let page = Page::new(vec![9, 10], &request, 10);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.page, 2);
        assert_eq!(request.offset(), 8);
    }

    #[test]
    fn test_unpaged_empty_has_no_pages() {
        let page: Page<i64> = Page::unpaged(Vec::new());
        assert_eq!(page.total_pages, 0);
        assert_eq!(page.total_elements, 0);
        assert!(page.is_empty());
    }

    #[test]
    fn test_validate_rejects_zero_and_oversized() {
        assert!(PageRequest::first(0).validate(100).is_err());
        assert!(PageRequest::first(101).validate(100).is_err());
        assert!(PageRequest::first(100).validate(100).is_ok());
    }

    #[test]
    fn test_sort_order_deserializes_with_default_direction() {
        let order: SortOrder = serde_json::from_str(r#"{"field":"name"}"#).unwrap();
        assert_eq!(order, SortOrder::asc(SortField::Name));
    }
}
