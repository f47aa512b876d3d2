//! Paginated query execution.
//!
//! Pages are fetched strictly one after another: the continuation token from
//! page N is needed to request page N+1. Call starts are spaced by
//! [`RequestPacer`] to respect the endpoint's request rate.

use std::future::Future;
use std::time::Duration;

use slquery_core::{AggregatedResult, BatchQueryConfig, PageResult, SkipPage};
use tokio::time::{sleep_until, Instant};
use tracing::{info_span, Instrument};

use crate::error::QueryError;

// ---------------------------------------------------------------------------
// RequestPacer
// ---------------------------------------------------------------------------

/// Spaces consecutive call starts at least `1s / requests_per_second` apart.
///
/// The first call is never delayed.
#[derive(Debug)]
pub struct RequestPacer {
    interval: Duration,
    next_start: Option<Instant>,
}

impl RequestPacer {
    #[must_use]
    pub fn new(requests_per_second: u32) -> Self {
        Self {
            interval: Duration::from_secs(1) / requests_per_second.max(1),
            next_start: None,
        }
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Waits until the next call may start, then reserves the slot after it.
    pub async fn wait(&mut self) {
        if let Some(at) = self.next_start {
            sleep_until(at).await;
        }
        self.next_start = Some(Instant::now() + self.interval);
    }
}

// ---------------------------------------------------------------------------
// Continuation-token endpoints
// ---------------------------------------------------------------------------

/// Fetches until `take` records are collected or the server reports no
/// continuation token, whichever comes first. With `take == None` every page
/// is fetched.
///
/// `fetch_page(take, continuation_token)` performs exactly one remote call.
///
/// # Errors
///
/// The first error from `fetch_page` is returned as is and no further pages
/// are requested. Returns [`QueryError::PaginationDidNotTerminate`] when the
/// server returns the same token twice in a row or `config.max_pages` pages
/// have been fetched without finishing.
pub async fn query_in_batches<T, F, Fut>(
    fetch_page: F,
    config: &BatchQueryConfig,
    take: Option<u32>,
) -> Result<AggregatedResult<T>, QueryError>
where
    F: FnMut(u32, Option<String>) -> Fut,
    Fut: Future<Output = Result<PageResult<T>, QueryError>>,
{
    run_pages(fetch_page, config, take).await
}

/// Fetches every page until the server reports no continuation token,
/// regardless of any total.
///
/// # Errors
///
/// Same as [`query_in_batches`].
pub async fn query_until_complete<T, F, Fut>(
    fetch_page: F,
    config: &BatchQueryConfig,
) -> Result<AggregatedResult<T>, QueryError>
where
    F: FnMut(u32, Option<String>) -> Fut,
    Fut: Future<Output = Result<PageResult<T>, QueryError>>,
{
    run_pages(fetch_page, config, None).await
}

async fn run_pages<T, F, Fut>(
    mut fetch_page: F,
    config: &BatchQueryConfig,
    target: Option<u32>,
) -> Result<AggregatedResult<T>, QueryError>
where
    F: FnMut(u32, Option<String>) -> Fut,
    Fut: Future<Output = Result<PageResult<T>, QueryError>>,
{
    let mut result = AggregatedResult::default();
    if target == Some(0) {
        return Ok(result);
    }

    let max_take = config.max_take_per_request.max(1);
    let mut pacer = RequestPacer::new(config.requests_per_second);
    let mut token: Option<String> = None;
    let mut pages = 0u32;

    loop {
        if pages >= config.max_pages {
            return Err(QueryError::PaginationDidNotTerminate { pages });
        }
        let take = match target {
            Some(total) => max_take.min(total.saturating_sub(collected(&result.data))),
            None => max_take,
        };

        pacer.wait().await;
        pages += 1;
        let span = info_span!(
            "fetch_page",
            page = pages,
            take = take,
            records = tracing::field::Empty,
            duration_ms = tracing::field::Empty,
        );
        let page = timed(fetch_page(take, token.clone()))
            .instrument(span.clone())
            .await?;
        span.record("records", page.data.len());

        if page.total_count.is_some() {
            result.total_count = page.total_count;
        }
        let next = page.continuation_token.filter(|t| !t.is_empty());
        result.data.extend(page.data);

        if let Some(total) = target {
            if collected(&result.data) >= total {
                result.data.truncate(total as usize);
                break;
            }
        }
        match next {
            None => break,
            Some(next) if token.as_deref() == Some(next.as_str()) => {
                tracing::warn!(page = pages, "server repeated continuation token");
                return Err(QueryError::PaginationDidNotTerminate { pages });
            }
            Some(next) => token = Some(next),
        }
    }

    tracing::debug!(pages, records = result.data.len(), "batched query complete");
    Ok(result)
}

// ---------------------------------------------------------------------------
// Skip/take endpoints
// ---------------------------------------------------------------------------

/// Fetches from a skip/take endpoint until `take` records are collected, a
/// page comes back shorter than requested, or `skip` reaches the reported
/// total. With `take == None` every page is fetched.
///
/// `fetch_page(take, skip)` performs exactly one remote call.
///
/// # Errors
///
/// The first error from `fetch_page` is returned as is. Returns
/// [`QueryError::PaginationDidNotTerminate`] after `config.max_pages` pages.
pub async fn query_using_skip<T, F, Fut>(
    mut fetch_page: F,
    config: &BatchQueryConfig,
    take: Option<u32>,
) -> Result<AggregatedResult<T>, QueryError>
where
    F: FnMut(u32, u32) -> Fut,
    Fut: Future<Output = Result<SkipPage<T>, QueryError>>,
{
    let mut result = AggregatedResult::default();
    if take == Some(0) {
        return Ok(result);
    }

    let max_take = config.max_take_per_request.max(1);
    let mut pacer = RequestPacer::new(config.requests_per_second);
    let mut pages = 0u32;

    loop {
        if pages >= config.max_pages {
            return Err(QueryError::PaginationDidNotTerminate { pages });
        }
        let skip = collected(&result.data);
        let page_take = match take {
            Some(total) => max_take.min(total.saturating_sub(skip)),
            None => max_take,
        };

        pacer.wait().await;
        pages += 1;
        let span = info_span!(
            "fetch_page",
            page = pages,
            take = page_take,
            skip = skip,
            duration_ms = tracing::field::Empty,
        );
        let page = timed(fetch_page(page_take, skip)).instrument(span).await?;

        if page.total_count.is_some() {
            result.total_count = page.total_count;
        }
        let short = collected(&page.data) < page_take;
        result.data.extend(page.data);

        let fetched = collected(&result.data);
        if let Some(total) = take {
            if fetched >= total {
                result.data.truncate(total as usize);
                break;
            }
        }
        if short || result.total_count.is_some_and(|total| u64::from(fetched) >= total) {
            break;
        }
    }

    Ok(result)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn collected<T>(data: &[T]) -> u32 {
    u32::try_from(data.len()).unwrap_or(u32::MAX)
}

/// Awaits `fut` and records its wall time on the current span.
async fn timed<Fut: Future>(fut: Fut) -> Fut::Output {
    let start = Instant::now();
    let output = fut.await;
    #[allow(clippy::cast_possible_truncation)]
    let duration_ms = start.elapsed().as_millis() as u64;
    tracing::Span::current().record("duration_ms", duration_ms);
    output
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
