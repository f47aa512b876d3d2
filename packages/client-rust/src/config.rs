//! Client configuration types.

use std::time::Duration;

/// Header carrying the API key on every request.
pub const API_KEY_HEADER: &str = "x-ni-api-key";

/// Connection settings for one data-source instance.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the API, without a trailing slash (e.g. `https://host`).
    pub base_url: String,
    /// API key sent in [`API_KEY_HEADER`]. `None` sends no key.
    pub api_key: Option<String>,
    /// Maximum time to wait for a single request to complete.
    pub request_timeout: Duration,
    /// How many times a 429 response is retried before it is surfaced.
    pub max_retries: u32,
    /// Delay before the first retry; doubled on each further attempt.
    pub retry_base_delay: Duration,
    /// `User-Agent` header value.
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost".to_string(),
            api_key: None,
            request_timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_base_delay: Duration::from_millis(500),
            user_agent: concat!("slquery/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl ClientConfig {
    /// Joins `path` onto the base URL.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Backoff before retry number `attempt` (0-based).
    #[must_use]
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        self.retry_base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
    }
}
