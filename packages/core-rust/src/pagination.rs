//! Value types shared by the paginated query executors.

use serde::{Deserialize, Serialize};

/// Pagination policy for one record domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchQueryConfig {
    /// Upper bound on `take` for any single page request. Must be > 0.
    pub max_take_per_request: u32,
    /// Page requests per second. Consecutive requests start at least
    /// `1000 / requests_per_second` ms apart. Must be > 0.
    pub requests_per_second: u32,
    /// Pages fetched before giving up on a server that keeps returning
    /// continuation tokens.
    pub max_pages: u32,
}

impl BatchQueryConfig {
    #[must_use]
    pub const fn new(max_take_per_request: u32, requests_per_second: u32) -> Self {
        Self {
            max_take_per_request,
            requests_per_second,
            max_pages: 10_000,
        }
    }

    #[must_use]
    pub const fn with_max_pages(self, max_pages: u32) -> Self {
        Self {
            max_take_per_request: self.max_take_per_request,
            requests_per_second: self.requests_per_second,
            max_pages,
        }
    }
}

impl Default for BatchQueryConfig {
    fn default() -> Self {
        Self::new(500, 6)
    }
}

/// One page returned by a continuation-token endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResult<T> {
    pub data: Vec<T>,
    /// Absent, null or empty means there are no further pages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continuation_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_count: Option<u64>,
}

impl<T> PageResult<T> {
    #[must_use]
    pub fn new(data: Vec<T>, continuation_token: Option<String>) -> Self {
        Self {
            data,
            continuation_token,
            total_count: None,
        }
    }

    #[must_use]
    pub fn with_total_count(mut self, total_count: u64) -> Self {
        self.total_count = Some(total_count);
        self
    }
}

/// One page returned by a skip/take endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkipPage<T> {
    pub data: Vec<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_count: Option<u64>,
}

/// Records merged across every page, in server order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedResult<T> {
    pub data: Vec<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_count: Option<u64>,
}

impl<T> Default for AggregatedResult<T> {
    fn default() -> Self {
        Self {
            data: Vec::new(),
            total_count: None,
        }
    }
}
