//! # Response envelopes
//!
//! Shapes shared by every list and acknowledgement the API returns.

use serde::{Deserialize, Serialize};

/// One page of results plus the total before paging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: usize,
    pub limit: usize,
}

impl<T> Page<T> {
    /// Cut one page out of a full result list.
    #[must_use]
    pub fn slice(all: Vec<T>, page: usize, limit: usize) -> Self {
        let total = all.len();
        let items = all
            .into_iter()
            .skip(page.saturating_mul(limit))
            .take(limit)
            .collect();
        Self {
            items,
            total,
            page,
            limit,
        }
    }

    /// Transform every item, keeping the paging metadata.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            limit: self.limit,
        }
    }

    /// Number of items on this page.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// True if another page follows this one.
    #[must_use]
    pub fn has_more(&self) -> bool {
        self.page.saturating_add(1).saturating_mul(self.limit) < self.total
    }
}

/// `{"message": "..."}` acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub message: String,
}

impl Message {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The standard `{"message": "success"}` body.
    #[must_use]
    pub fn success() -> Self {
        Self::new("success")
    }
}

/// `{"count": n}` body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Count {
    pub count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slice_pages() {
        let page = Page::slice((1..=25).collect::<Vec<u32>>(), 1, 10);
        assert_eq!(page.items, (11..=20).collect::<Vec<u32>>());
        assert_eq!(page.total, 25);
        assert!(page.has_more());

        let last = Page::slice((1..=25).collect::<Vec<u32>>(), 2, 10);
        assert_eq!(last.len(), 5);
        assert!(!last.has_more());

        let beyond = Page::slice((1..=5).collect::<Vec<u32>>(), 9, 10);
        assert!(beyond.is_empty());
        assert_eq!(beyond.total, 5);
    }

    #[test]
    fn map_keeps_metadata() {
        let page = Page::slice(vec![1, 2, 3], 0, 2).map(|n| n * 10);
        assert_eq!(page.items, vec![10, 20]);
        assert_eq!((page.total, page.page, page.limit), (3, 0, 2));
    }

    #[test]
    fn message_shape() {
        let json = serde_json::to_string(&Message::success()).unwrap_or_default();
        assert_eq!(json, r#"{"message":"success"}"#);
    }
}
