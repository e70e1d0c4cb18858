use serde::{Deserialize, Serialize};

use crate::model::Filter;

pub const DEFAULT_SORT_FIELD: &str = "createdAt";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub descending: bool,
}

impl SortKey {
    /// Parse `field:asc,other:desc`; a bare field sorts ascending
    pub fn parse_list(sort_by: &str) -> Vec<SortKey> {
        sort_by
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| {
                let (field, order) = part.split_once(':').unwrap_or((part, "asc"));
                SortKey {
                    field: field.trim().to_string(),
                    descending: order.trim().eq_ignore_ascii_case("desc"),
                }
            })
            .collect()
    }
}

/// Resolved pagination and ordering for a list query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageOptions {
    pub page: u32,
    pub limit: u32,
    pub sort: Vec<SortKey>,
}

impl Default for PageOptions {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 10,
            sort: vec![SortKey {
                field: DEFAULT_SORT_FIELD.to_string(),
                descending: false,
            }],
        }
    }
}

impl PageOptions {
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }
}

/// Raw `sortBy`/`limit`/`page` options as supplied by a caller
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ListOptions {
    #[serde(rename = "sortBy", default)]
    pub sort_by: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub page: Option<i64>,
}

/// Filter plus pagination, handed to the store
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListQuery {
    pub filter: Filter,
    pub options: PageOptions,
}

/// One page of results in the shape every list endpoint returns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub results: Vec<T>,
    pub page: u32,
    pub limit: u32,
    #[serde(rename = "totalPages")]
    pub total_pages: u32,
    #[serde(rename = "totalResults")]
    pub total_results: u64,
}

impl<T> Page<T> {
    pub fn new(results: Vec<T>, options: &PageOptions, total_results: u64) -> Self {
        let limit = u64::from(options.limit.max(1));
        let total_pages = total_results.div_ceil(limit);
        Self {
            results,
            page: options.page,
            limit: options.limit,
            total_pages: u32::try_from(total_pages).unwrap_or(u32::MAX),
            total_results,
        }
    }

    pub fn map_results<U>(self, results: Vec<U>) -> Page<U> {
        Page {
            results,
            page: self.page,
            limit: self.limit,
            total_pages: self.total_pages,
            total_results: self.total_results,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sort_list() {
        let keys = SortKey::parse_list("name:desc, createdAt");
        assert_eq!(
            keys,
            vec![
                SortKey {
                    field: "name".to_string(),
                    descending: true
                },
                SortKey {
                    field: "createdAt".to_string(),
                    descending: false
                },
            ]
        );
        assert!(SortKey::parse_list(" , ").is_empty());
    }

    #[test]
    fn test_page_counts() {
        let options = PageOptions {
            page: 2,
            limit: 10,
            sort: Vec::new(),
        };
        let page: Page<u8> = Page::new(vec![], &options, 21);
        assert_eq!(page.total_pages, 3);
        assert_eq!(options.offset(), 10);

        let empty: Page<u8> = Page::new(vec![], &options, 0);
        assert_eq!(empty.total_pages, 0);
    }
}
