//! Memoized lookup tables used to decorate query results.
//!
//! Lookup data is supplementary: a failed load never fails the query that
//! asked for it. The cache resolves to an empty map and keeps a
//! [`LookupWarning`] for the caller to display.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::QueryError;
use crate::http::HttpClient;

/// Non-fatal problem recorded by a lookup cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LookupWarning {
    pub title: String,
    pub description: String,
}

pub type LookupMap<V> = Arc<HashMap<String, V>>;

/// Produces a fresh load of the lookup table.
pub type Loader<V> =
    Arc<dyn Fn() -> BoxFuture<'static, Result<HashMap<String, V>, QueryError>> + Send + Sync>;

type InFlight<V> = Shared<BoxFuture<'static, Result<LookupMap<V>, QueryError>>>;

// ---------------------------------------------------------------------------
// LookupCache
// ---------------------------------------------------------------------------

/// Instance-owned memoized map keyed by id.
///
/// The first [`get`](Self::get) starts the load; callers arriving before it
/// resolves await the same future. A failed load is forgotten so the next
/// call tries again.
pub struct LookupCache<V> {
    name: &'static str,
    loader: Loader<V>,
    state: Mutex<Option<InFlight<V>>>,
    warning: Mutex<Option<LookupWarning>>,
}

impl<V> fmt::Debug for LookupCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LookupCache")
            .field("name", &self.name)
            .field("loaded", &self.state.lock().is_some())
            .field("warning", &*self.warning.lock())
            .finish_non_exhaustive()
    }
}

impl<V> LookupCache<V>
where
    V: Send + Sync + 'static,
{
    #[must_use]
    pub fn new(name: &'static str, loader: Loader<V>) -> Self {
        Self {
            name,
            loader,
            state: Mutex::new(None),
            warning: Mutex::new(None),
        }
    }

    /// Cache that always resolves to `entries` without any remote call.
    #[must_use]
    pub fn fixed(name: &'static str, entries: HashMap<String, V>) -> Self
    where
        V: Clone,
    {
        let entries = Arc::new(entries);
        Self::new(
            name,
            Arc::new(move || {
                let entries = HashMap::clone(&entries);
                async move { Ok::<_, QueryError>(entries) }.boxed()
            }),
        )
    }

    /// Returns the lookup table, loading it on first use. Never fails.
    pub async fn get(&self) -> LookupMap<V> {
        let load = {
            let mut state = self.state.lock();
            state
                .get_or_insert_with(|| {
                    let loader = Arc::clone(&self.loader);
                    async move { loader().await.map(Arc::new) }.boxed().shared()
                })
                .clone()
        };

        match load.clone().await {
            Ok(map) => {
                self.warning.lock().take();
                map
            }
            Err(err) => {
                {
                    let mut state = self.state.lock();
                    if state.as_ref().is_some_and(|current| current.ptr_eq(&load)) {
                        *state = None;
                    }
                }
                tracing::warn!(
                    cache = self.name,
                    error = %err,
                    "lookup failed, continuing without it"
                );
                *self.warning.lock() = Some(LookupWarning {
                    title: format!("Warning during {} query", self.name),
                    description: err.to_string(),
                });
                Arc::new(HashMap::new())
            }
        }
    }

    /// Warning left by the most recent failed load, if any.
    #[must_use]
    pub fn warning(&self) -> Option<LookupWarning> {
        self.warning.lock().clone()
    }

    /// Drops the memoized table so the next [`get`](Self::get) reloads it.
    pub fn invalidate(&self) {
        *self.state.lock() = None;
        *self.warning.lock() = None;
    }
}

// ---------------------------------------------------------------------------
// Workspaces and part numbers
// ---------------------------------------------------------------------------

const WORKSPACES_PATH: &str = "/niuser/v1/workspaces?take=1000";
const PRODUCTS_PATH: &str = "/nitestmonitor/v2/query-products";
const PRODUCT_TAKE: u32 = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workspace {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub default: bool,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub part_number: String,
    #[serde(default)]
    pub name: Option<String>,
}

pub type WorkspaceCache = LookupCache<Workspace>;
pub type PartNumberCache = LookupCache<Product>;

impl LookupCache<Workspace> {
    /// Workspaces by id, loaded from the user service.
    #[must_use]
    pub fn workspaces(http: Arc<dyn HttpClient>) -> Self {
        Self::new(
            "workspace",
            Arc::new(move || {
                let http = Arc::clone(&http);
                async move {
                    let body = http.get_json(WORKSPACES_PATH).await?;
                    let list: Vec<Workspace> = records(body, "workspaces")?;
                    let by_id: HashMap<String, Workspace> =
                        list.into_iter().map(|w| (w.id.clone(), w)).collect();
                    Ok::<_, QueryError>(by_id)
                }
                .boxed()
            }),
        )
    }
}

impl LookupCache<Product> {
    /// Products by part number.
    #[must_use]
    pub fn part_numbers(http: Arc<dyn HttpClient>) -> Self {
        Self::new(
            "product",
            Arc::new(move || {
                let http = Arc::clone(&http);
                async move {
                    let request = json!({ "take": PRODUCT_TAKE, "returnCount": false });
                    let body = http.post_json(PRODUCTS_PATH, &request).await?;
                    let list: Vec<Product> = records(body, "products")?;
                    let by_part: HashMap<String, Product> = list
                        .into_iter()
                        .map(|p| (p.part_number.clone(), p))
                        .collect();
                    Ok::<_, QueryError>(by_part)
                }
                .boxed()
            }),
        )
    }
}

fn records<T: serde::de::DeserializeOwned>(
    mut body: Value,
    key: &str,
) -> Result<Vec<T>, QueryError> {
    let list = body
        .get_mut(key)
        .map(Value::take)
        .ok_or_else(|| QueryError::MalformedResponse(format!("missing `{key}` in response")))?;
    serde_json::from_value(list).map_err(|e| QueryError::MalformedResponse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use slquery_core::TransportError;

    use super::*;

    fn counting_loader(
        calls: Arc<AtomicUsize>,
        fail_first: usize,
    ) -> Loader<String> {
        Arc::new(move || {
            let calls = Arc::clone(&calls);
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                tokio::task::yield_now().await;
                if n < fail_first {
                    return Err(QueryError::Transport(TransportError::Http {
                        status: 500,
                        body: "down".into(),
                    }));
                }
                Ok(HashMap::from([("w1".to_string(), "Default".to_string())]))
            }
            .boxed()
        })
    }

    #[tokio::test]
    async fn concurrent_first_calls_share_one_load() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = LookupCache::new("workspace", counting_loader(Arc::clone(&calls), 0));

        let (a, b) = tokio::join!(cache.get(), cache.get());
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a["w1"], "Default");
        cache.get().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.warning().is_none());
    }

    #[tokio::test]
    async fn failed_load_resolves_empty_with_warning() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = LookupCache::new("workspace", counting_loader(Arc::clone(&calls), 1));

        let map = cache.get().await;
        assert!(map.is_empty());
        let warning = cache.warning().unwrap();
        assert_eq!(warning.title, "Warning during workspace query");
        assert!(warning.description.contains("500"));

        // The failure was not memoized.
        let map = cache.get().await;
        assert_eq!(map.len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn invalidate_forces_reload() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = LookupCache::new("workspace", counting_loader(Arc::clone(&calls), 0));
        cache.get().await;
        cache.invalidate();
        cache.get().await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    struct CannedHttp(Value);

    #[async_trait]
    impl HttpClient for CannedHttp {
        async fn get_json(&self, _path: &str) -> Result<Value, TransportError> {
            Ok(self.0.clone())
        }

        async fn post_json(&self, _path: &str, _body: &Value) -> Result<Value, TransportError> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn workspaces_are_keyed_by_id() {
        let http = Arc::new(CannedHttp(json!({
            "workspaces": [
                { "id": "w1", "name": "Default", "default": true },
                { "id": "w2", "name": "Lab", "enabled": false }
            ]
        })));
        let map = WorkspaceCache::workspaces(http).get().await;
        assert_eq!(map["w1"].name, "Default");
        assert!(map["w1"].enabled);
        assert!(!map["w2"].enabled);
    }

    #[tokio::test]
    async fn products_are_keyed_by_part_number() {
        let http = Arc::new(CannedHttp(json!({
            "products": [{ "partNumber": "P-100", "name": "Widget" }]
        })));
        let map = PartNumberCache::part_numbers(http).get().await;
        assert_eq!(map["P-100"].name.as_deref(), Some("Widget"));
    }

    #[tokio::test]
    async fn malformed_payload_becomes_warning() {
        let http = Arc::new(CannedHttp(json!({ "unexpected": [] })));
        let cache = WorkspaceCache::workspaces(http);
        assert!(cache.get().await.is_empty());
        assert!(cache.warning().unwrap().description.contains("workspaces"));
    }
}
