//! Shared Data Transfer Objects (DTOs) for API handlers.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

pub const DEFAULT_PER_PAGE: u32 = 10;
pub const MAX_PER_PAGE: u32 = 100;

/// Pagination metadata for list responses.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Pagination {
    /// Current page number (1-indexed)
    pub page: u32,
    /// Number of items per page
    pub per_page: u32,
    /// Total number of items across all pages
    pub total: i64,
    /// Total number of pages
    pub total_pages: u32,
}

impl Pagination {
    pub fn from_query_and_total(query: &PaginationQuery, total: i64) -> Self {
        let page = query.page();
        let per_page = query.per_page();
        let total_pages = if total <= 0 {
            0
        } else {
            ((total as f64) / (per_page as f64)).ceil() as u32
        };

        Self {
            page,
            per_page,
            total,
            total_pages,
        }
    }
}

/// Query parameters for paginated list requests.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct PaginationQuery {
    /// Requested page number (default: 1)
    pub page: Option<u32>,
    /// Requested items per page (default: 10, max: 100); `limit` is accepted too
    #[serde(alias = "limit")]
    pub per_page: Option<u32>,
}

impl PaginationQuery {
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn per_page(&self) -> u32 {
        self.per_page
            .unwrap_or(DEFAULT_PER_PAGE)
            .clamp(1, MAX_PER_PAGE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_query_defaults() {
        let query = PaginationQuery::default();
        assert_eq!(query.page(), 1);
        assert_eq!(query.per_page(), 10);
    }

    #[test]
    fn test_pagination_query_clamps() {
        let query = PaginationQuery {
            page: Some(0),
            per_page: Some(1000),
        };
        assert_eq!(query.page(), 1);
        assert_eq!(query.per_page(), MAX_PER_PAGE);
    }

    #[test]
    fn test_limit_alias() {
        let query: PaginationQuery = serde_json::from_str(r#"{"page": 2, "limit": 5}"#).unwrap();
        assert_eq!(query.page(), 2);
        assert_eq!(query.per_page(), 5);
    }

    #[test]
    fn test_pagination_from_query_basic() {
        let query = PaginationQuery {
            page: Some(1),
            per_page: Some(10),
        };
        let p = Pagination::from_query_and_total(&query, 25);
        assert_eq!(p.total, 25);
        assert_eq!(p.total_pages, 3);
    }

    #[test]
    fn test_pagination_from_query_zero_total() {
        let p = Pagination::from_query_and_total(&PaginationQuery::default(), 0);
        assert_eq!(p.total_pages, 0);
    }
}
