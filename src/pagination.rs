//! Shared pagination types for the admin list endpoints.

use serde::{Deserialize, Serialize};

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 100;

/// `?limit=&offset=` query parameters accepted by every list endpoint.
#[derive(Debug, Clone, Copy, Deserialize, Default)]
pub struct PaginationQuery {
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

impl PaginationQuery {
    /// Requested page size, clamped to `1..=MAX_PAGE_SIZE`.
    pub fn limit(&self) -> i64 {
        match self.limit {
            Some(limit) => limit.clamp(1, MAX_PAGE_SIZE),
            None => DEFAULT_PAGE_SIZE,
        }
    }

    /// Requested skip count, never negative.
    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}

/// One page of results plus the unpaginated total.
#[derive(Debug, Serialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub total: i64,
    /// Page size and skip as actually applied, echoed back so clients can
    /// page without re-deriving the clamps.
    pub limit: i64,
    pub offset: i64,
}

impl<T> Paginated<T> {
    pub fn new(items: Vec<T>, total: i64, limit: i64, offset: i64) -> Self {
        Self {
            items,
            total,
            limit,
            offset,
        }
    }
}
