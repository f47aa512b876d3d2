//! Query handlers: filter transformation, paging, error reporting and result
//! decoration for one record domain.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use slquery_core::{
    AggregatedResult, ClockSource, ComputedFieldTransformer, ScopedVars, TemplateResolver,
    UnknownFieldPolicy,
};
use tracing::{info_span, Instrument};

use crate::batch::{query_in_batches, query_until_complete, query_using_skip};
use crate::cache::{LookupWarning, PartNumberCache, Product, Workspace, WorkspaceCache};
use crate::domain::{DomainDescriptor, PaginationStyle};
use crate::error::QueryError;
use crate::http::HttpClient;

/// Column filled from the part-number lookup instead of the record itself.
pub const PRODUCT_NAME_COLUMN: &str = "productName";
const WORKSPACE_COLUMN: &str = "workspace";

// ---------------------------------------------------------------------------
// Query and result types
// ---------------------------------------------------------------------------

/// One record query as issued by a caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordQuery {
    pub filter: String,
    pub order_by: Option<String>,
    pub descending: bool,
    /// Total records wanted. `None` uses the domain default.
    pub take: Option<u32>,
    /// Ignore `take` and fetch every page.
    pub fetch_all: bool,
    pub return_count: bool,
    /// Columns to project. Empty selects the domain defaults.
    pub columns: Vec<String>,
    pub hide: bool,
}

/// Records projected onto the requested columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_count: Option<u64>,
    /// Lookup problems that left some cells undecorated.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<LookupWarning>,
}

/// Side channel for user-facing failure notifications.
pub trait AlertSink: Send + Sync {
    fn alert(&self, title: &str, message: &str);
}

/// Writes alerts to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAlertSink;

impl AlertSink for TracingAlertSink {
    fn alert(&self, title: &str, message: &str) {
        tracing::error!(title, message, "query failed");
    }
}

// ---------------------------------------------------------------------------
// QueryHandler
// ---------------------------------------------------------------------------

#[async_trait]
pub trait QueryHandler: Send + Sync {
    /// Whether `query` should be sent at all.
    fn should_run_query(&self, query: &RecordQuery) -> bool;

    /// Best-effort filter transformation. Never fails.
    fn transform_filter(&self, filter: &str, scoped: &ScopedVars) -> String;

    /// Runs `query` and projects the records into a [`Table`].
    ///
    /// # Errors
    ///
    /// Transport failures come back as [`QueryError::Classified`] after the
    /// message has been sent to the alert sink.
    async fn run_query(&self, query: &RecordQuery, scoped: &ScopedVars)
        -> Result<Table, QueryError>;
}

/// [`QueryHandler`] for one record domain, built from injected collaborators.
pub struct RecordQueryHandler {
    domain: &'static DomainDescriptor,
    http: Arc<dyn HttpClient>,
    transformer: ComputedFieldTransformer,
    workspaces: Arc<WorkspaceCache>,
    part_numbers: Option<Arc<PartNumberCache>>,
    alerts: Arc<dyn AlertSink>,
}

impl std::fmt::Debug for RecordQueryHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordQueryHandler")
            .field("domain", &self.domain.name)
            .field("transformer", &self.transformer)
            .field("part_numbers", &self.part_numbers.is_some())
            .finish_non_exhaustive()
    }
}

enum Cursor {
    Token(Option<String>),
    Skip(u32),
}

impl RecordQueryHandler {
    #[must_use]
    pub fn new(
        domain: &'static DomainDescriptor,
        http: Arc<dyn HttpClient>,
        workspaces: Arc<WorkspaceCache>,
    ) -> Self {
        Self {
            domain,
            http,
            transformer: ComputedFieldTransformer::new(Arc::new((domain.fields)())),
            workspaces,
            part_numbers: None,
            alerts: Arc::new(TracingAlertSink),
        }
    }

    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn TemplateResolver>) -> Self {
        self.transformer = self.transformer.with_resolver(resolver);
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn ClockSource>) -> Self {
        self.transformer = self.transformer.with_clock(clock);
        self
    }

    /// Under [`UnknownFieldPolicy::Reject`], [`QueryHandler::run_query`]
    /// fails on malformed filters and unknown fields instead of sending them.
    #[must_use]
    pub fn with_policy(mut self, policy: UnknownFieldPolicy) -> Self {
        self.transformer = self.transformer.with_policy(policy);
        self
    }

    #[must_use]
    pub fn with_part_numbers(mut self, cache: Arc<PartNumberCache>) -> Self {
        self.part_numbers = Some(cache);
        self
    }

    #[must_use]
    pub fn with_alerts(mut self, alerts: Arc<dyn AlertSink>) -> Self {
        self.alerts = alerts;
        self
    }

    async fn fetch(
        &self,
        query: &RecordQuery,
        filter: &str,
    ) -> Result<AggregatedResult<Value>, QueryError> {
        let domain = self.domain;
        let take = (!query.fetch_all).then(|| domain.effective_take(query.take));

        match domain.pagination {
            PaginationStyle::ContinuationToken => {
                let fetch_page = |page_take: u32, token: Option<String>| {
                    let body = page_body(query, filter, page_take, Cursor::Token(token));
                    let http = Arc::clone(&self.http);
                    async move {
                        let response = http.post_json(domain.endpoint, &body).await?;
                        domain.decode_page(response)
                    }
                };
                if query.fetch_all {
                    query_until_complete(fetch_page, &domain.batch).await
                } else {
                    query_in_batches(fetch_page, &domain.batch, take).await
                }
            }
            PaginationStyle::Skip => {
                let fetch_page = |page_take: u32, skip: u32| {
                    let body = page_body(query, filter, page_take, Cursor::Skip(skip));
                    let http = Arc::clone(&self.http);
                    async move {
                        let response = http.post_json(domain.endpoint, &body).await?;
                        domain.decode_skip_page(response)
                    }
                };
                query_using_skip(fetch_page, &domain.batch, take).await
            }
        }
    }

    /// Classifies transport failures and sends the message to the alert sink.
    fn report(&self, err: QueryError) -> QueryError {
        let err = match err {
            QueryError::Transport(transport) => {
                let classified = self.domain.errors.classify(&transport);
                QueryError::Classified {
                    status_code: classified.status_code,
                    message: classified.message,
                }
            }
            other => other,
        };
        self.alerts
            .alert(&format!("Error during {} query", self.domain.name), &err.to_string());
        err
    }

    async fn project(&self, query: &RecordQuery, result: AggregatedResult<Value>) -> Table {
        let columns: Vec<String> = if query.columns.is_empty() {
            self.domain
                .default_columns
                .iter()
                .map(ToString::to_string)
                .collect()
        } else {
            query.columns.clone()
        };
        let wants = |name: &str| columns.iter().any(|c| c == name);

        let mut warnings = Vec::new();
        let workspaces = if wants(WORKSPACE_COLUMN) {
            let map = self.workspaces.get().await;
            warnings.extend(self.workspaces.warning());
            Some(map)
        } else {
            None
        };
        let products = match &self.part_numbers {
            Some(cache) if wants(PRODUCT_NAME_COLUMN) => {
                let map = cache.get().await;
                warnings.extend(cache.warning());
                Some(map)
            }
            _ => None,
        };

        let rows = result
            .data
            .iter()
            .map(|record| {
                columns
                    .iter()
                    .map(|column| {
                        self.cell(record, column, workspaces.as_deref(), products.as_deref())
                    })
                    .collect()
            })
            .collect();

        Table {
            columns,
            rows,
            total_count: result.total_count,
            warnings,
        }
    }

    fn cell(
        &self,
        record: &Value,
        column: &str,
        workspaces: Option<&HashMap<String, Workspace>>,
        products: Option<&HashMap<String, Product>>,
    ) -> Value {
        if column == PRODUCT_NAME_COLUMN {
            let part_number = self
                .domain
                .part_number_field
                .and_then(|field| record.get(field))
                .and_then(Value::as_str);
            return match (part_number, products) {
                (Some(part), Some(products)) => products
                    .get(part)
                    .and_then(|p| p.name.clone())
                    .map_or(Value::Null, Value::from),
                _ => Value::Null,
            };
        }

        let value = field_value(record, column);
        if column == WORKSPACE_COLUMN {
            if let (Some(map), Some(id)) = (workspaces, value.as_str()) {
                if let Some(workspace) = map.get(id) {
                    return Value::from(workspace.name.clone());
                }
            }
        }
        value
    }
}

fn page_body(query: &RecordQuery, filter: &str, take: u32, cursor: Cursor) -> Value {
    let mut body = Map::new();
    if !filter.is_empty() {
        body.insert("filter".into(), filter.into());
    }
    if let Some(order_by) = &query.order_by {
        body.insert("orderBy".into(), order_by.as_str().into());
        body.insert("descending".into(), query.descending.into());
    }
    body.insert("take".into(), take.into());
    match cursor {
        Cursor::Token(Some(token)) => {
            body.insert("continuationToken".into(), token.into());
        }
        Cursor::Token(None) => {}
        Cursor::Skip(skip) => {
            body.insert("skip".into(), skip.into());
        }
    }
    if query.return_count {
        body.insert("returnCount".into(), true.into());
    }
    Value::Object(body)
}

/// Looks `path` up as a key first, then as a dotted path.
fn field_value(record: &Value, path: &str) -> Value {
    if let Some(value) = record.get(path) {
        return value.clone();
    }
    path.split('.')
        .try_fold(record, |node, key| node.get(key))
        .cloned()
        .unwrap_or(Value::Null)
}

#[async_trait]
impl QueryHandler for RecordQueryHandler {
    fn should_run_query(&self, query: &RecordQuery) -> bool {
        !query.hide
    }

    fn transform_filter(&self, filter: &str, scoped: &ScopedVars) -> String {
        self.transformer.transform(filter, scoped)
    }

    async fn run_query(
        &self,
        query: &RecordQuery,
        scoped: &ScopedVars,
    ) -> Result<Table, QueryError> {
        let filter = match self.transformer.policy() {
            UnknownFieldPolicy::PassThrough => self.transform_filter(&query.filter, scoped),
            UnknownFieldPolicy::Reject => self
                .transformer
                .try_transform(&query.filter, scoped)
                .map_err(|e| self.report(e.into()))?,
        };

        let span = info_span!(
            "run_query",
            domain = self.domain.name,
            fetch_all = query.fetch_all,
        );
        let result = self
            .fetch(query, &filter)
            .instrument(span)
            .await
            .map_err(|e| self.report(e))?;

        tracing::debug!(
            domain = self.domain.name,
            records = result.data.len(),
            "query complete"
        );
        Ok(self.project(query, result).await)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use parking_lot::Mutex;
    use serde_json::json;
    use slquery_core::{FilterError, FixedClock, TransportError, VariableInterpolator};

    use super::*;
    use crate::domain::{ALARMS, RESULTS, SYSTEMS};

    /// Replays canned POST responses and records every request body.
    #[derive(Default)]
    struct MockHttp {
        responses: Mutex<VecDeque<Result<Value, TransportError>>>,
        requests: Mutex<Vec<(String, Value)>>,
        workspaces: Option<Value>,
    }

    impl MockHttp {
        fn replying(responses: Vec<Result<Value, TransportError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                ..Self::default()
            }
        }

        fn bodies(&self) -> Vec<Value> {
            self.requests.lock().iter().map(|(_, body)| body.clone()).collect()
        }
    }

    #[async_trait]
    impl HttpClient for MockHttp {
        async fn get_json(&self, _path: &str) -> Result<Value, TransportError> {
            self.workspaces.clone().ok_or(TransportError::Http {
                status: 503,
                body: "unavailable".into(),
            })
        }

        async fn post_json(&self, path: &str, body: &Value) -> Result<Value, TransportError> {
            self.requests.lock().push((path.to_string(), body.clone()));
            self.responses
                .lock()
                .pop_front()
                .unwrap_or_else(|| Ok(json!({})))
        }
    }

    #[derive(Default)]
    struct RecordingAlerts(Mutex<Vec<(String, String)>>);

    impl AlertSink for RecordingAlerts {
        fn alert(&self, title: &str, message: &str) {
            self.0.lock().push((title.to_string(), message.to_string()));
        }
    }

    fn handler(domain: &'static DomainDescriptor, http: &Arc<MockHttp>) -> RecordQueryHandler {
        let http: Arc<dyn HttpClient> = Arc::clone(http) as Arc<dyn HttpClient>;
        let workspaces = Arc::new(WorkspaceCache::workspaces(Arc::clone(&http)));
        RecordQueryHandler::new(domain, http, workspaces)
            .with_clock(Arc::new(FixedClock(1_709_294_400_000)))
    }

    fn alarms(ids: &[&str], token: Option<&str>) -> Result<Value, TransportError> {
        let records: Vec<Value> = ids
            .iter()
            .map(|id| {
                json!({ "alarmId": id, "displayName": format!("Alarm {id}"), "workspace": "w1" })
            })
            .collect();
        Ok(json!({ "alarms": records, "continuationToken": token, "totalCount": 3 }))
    }

    fn query(filter: &str) -> RecordQuery {
        RecordQuery {
            filter: filter.to_string(),
            columns: vec!["alarmId".to_string()],
            ..RecordQuery::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn sends_transformed_filter() {
        let http = Arc::new(MockHttp::replying(vec![alarms(&["a1"], None)]));
        let handler = handler(&ALARMS, &http);
        let mut q = query(r#"acknowledged = "true" && occurredAt > "${__now:date}""#);
        q.take = Some(10);
        q.order_by = Some("occurredAt".into());
        q.descending = true;
        q.return_count = true;

        let table = handler.run_query(&q, &ScopedVars::new()).await.unwrap();

        assert_eq!(table.rows, vec![vec![json!("a1")]]);
        assert_eq!(table.total_count, Some(3));
        let (path, body) = http.requests.lock()[0].clone();
        assert_eq!(path, ALARMS.endpoint);
        assert_eq!(
            body,
            json!({
                "filter": r#"acknowledged.Equals(true) && occurredAt > "2024-03-01T12:00:00.000Z""#,
                "orderBy": "occurredAt",
                "descending": true,
                "take": 10,
                "returnCount": true
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn follows_continuation_tokens() {
        let http = Arc::new(MockHttp::replying(vec![
            alarms(&["a1", "a2"], Some("next")),
            alarms(&["a3"], None),
        ]));
        let mut q = query("");
        q.fetch_all = true;

        let table = handler(&ALARMS, &http)
            .run_query(&q, &ScopedVars::new())
            .await
            .unwrap();

        assert_eq!(table.rows.len(), 3);
        let bodies = http.bodies();
        assert_eq!(bodies.len(), 2);
        assert!(bodies[0].get("filter").is_none());
        assert!(bodies[0].get("continuationToken").is_none());
        assert_eq!(bodies[1]["continuationToken"], "next");
        assert_eq!(bodies[1]["take"], ALARMS.batch.max_take_per_request);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_failure_is_classified_and_alerted() {
        let http = Arc::new(MockHttp::replying(vec![Err(TransportError::Http {
            status: 429,
            body: "slow down".into(),
        })]));
        let alerts = Arc::new(RecordingAlerts::default());
        let handler =
            handler(&ALARMS, &http).with_alerts(Arc::clone(&alerts) as Arc<dyn AlertSink>);

        let err = handler
            .run_query(&query(""), &ScopedVars::new())
            .await
            .unwrap_err();

        let (status_code, message) = match err {
            QueryError::Classified {
                status_code,
                message,
            } => (status_code, message),
            other => panic!("expected classified error, got {other:?}"),
        };
        assert_eq!(status_code, Some(429));
        assert!(message.contains("too many requests"));
        let alerts = alerts.0.lock();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].0, "Error during alarms query");
        assert_eq!(alerts[0].1, message);
    }

    #[tokio::test(start_paused = true)]
    async fn decorates_workspace_names() {
        let http = Arc::new(MockHttp {
            responses: Mutex::new(vec![alarms(&["a1"], None)].into()),
            workspaces: Some(json!({ "workspaces": [{ "id": "w1", "name": "Default" }] })),
            ..MockHttp::default()
        });
        let mut q = query("");
        q.columns = vec!["displayName".into(), "workspace".into()];

        let table = handler(&ALARMS, &http)
            .run_query(&q, &ScopedVars::new())
            .await
            .unwrap();

        assert_eq!(table.rows, vec![vec![json!("Alarm a1"), json!("Default")]]);
        assert!(table.warnings.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn workspace_failure_keeps_ids_and_warns() {
        let http = Arc::new(MockHttp::replying(vec![alarms(&["a1"], None)]));
        let mut q = query("");
        q.columns = vec!["workspace".into()];

        let table = handler(&ALARMS, &http)
            .run_query(&q, &ScopedVars::new())
            .await
            .unwrap();

        assert_eq!(table.rows, vec![vec![json!("w1")]]);
        assert_eq!(table.warnings.len(), 1);
        assert!(table.warnings[0].description.contains("503"));
    }

    #[tokio::test(start_paused = true)]
    async fn product_names_come_from_part_number_cache() {
        let http = Arc::new(MockHttp::replying(vec![Ok(json!({
            "results": [
                { "id": "r1", "partNumber": "P-100", "properties": { "lot": "7" } },
                { "id": "r2", "partNumber": "P-999" }
            ]
        }))]));
        let products = PartNumberCache::fixed(
            "product",
            HashMap::from([(
                "P-100".to_string(),
                Product {
                    part_number: "P-100".into(),
                    name: Some("Widget".into()),
                },
            )]),
        );
        let handler = handler(&RESULTS, &http).with_part_numbers(Arc::new(products));
        let q = RecordQuery {
            columns: vec!["id".into(), PRODUCT_NAME_COLUMN.into(), "properties.lot".into()],
            ..RecordQuery::default()
        };

        let table = handler.run_query(&q, &ScopedVars::new()).await.unwrap();

        assert_eq!(
            table.rows,
            vec![
                vec![json!("r1"), json!("Widget"), json!("7")],
                vec![json!("r2"), Value::Null, Value::Null],
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn systems_page_with_skip() {
        let data: Vec<Value> = ["s1", "s2", "s3"].iter().map(|id| json!({ "id": id })).collect();
        let http = Arc::new(MockHttp::replying(vec![Ok(json!({ "data": data, "count": 5 }))]));
        let q = RecordQuery {
            take: Some(3),
            columns: vec!["id".into()],
            ..RecordQuery::default()
        };
        let handler = RecordQueryHandler::new(
            &SYSTEMS,
            Arc::clone(&http) as Arc<dyn HttpClient>,
            Arc::new(WorkspaceCache::fixed("workspace", HashMap::new())),
        );

        let table = handler.run_query(&q, &ScopedVars::new()).await.unwrap();

        assert_eq!(table.rows.len(), 3);
        assert_eq!(table.total_count, Some(5));
        let bodies = http.bodies();
        assert_eq!(bodies.len(), 1);
        assert_eq!(bodies[0]["skip"], 0);
        assert_eq!(bodies[0]["take"], 3);
        assert!(bodies[0].get("continuationToken").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn template_variables_are_resolved_once() {
        let http = Arc::new(MockHttp::replying(vec![alarms(&[], None)]));
        let resolver = VariableInterpolator::new().with_variable(
            "system",
            vec!["s1".to_string(), "s2".to_string()],
        );
        let handler = handler(&ALARMS, &http).with_resolver(Arc::new(resolver));

        handler
            .run_query(&query(r#"source = "$system""#), &ScopedVars::new())
            .await
            .unwrap();

        assert_eq!(
            http.bodies()[0]["filter"],
            r#"((properties["system"] = "s1" || properties["system"] = "s2") || (properties["minionId"] = "s1" || properties["minionId"] = "s2"))"#
        );
    }

    #[tokio::test(start_paused = true)]
    async fn strict_policy_rejects_unknown_fields_without_sending() {
        let http = Arc::new(MockHttp::default());
        let alerts = Arc::new(RecordingAlerts::default());
        let handler = handler(&ALARMS, &http)
            .with_policy(UnknownFieldPolicy::Reject)
            .with_alerts(Arc::clone(&alerts) as Arc<dyn AlertSink>);

        let err = handler
            .run_query(&query(r#"bogus = "x""#), &ScopedVars::new())
            .await
            .unwrap_err();

        assert_eq!(
            err,
            QueryError::Filter(FilterError::UnknownField {
                field: "bogus".into()
            })
        );
        assert!(http.requests.lock().is_empty());
        assert_eq!(alerts.0.lock().len(), 1);
    }

    #[test]
    fn hidden_queries_do_not_run() {
        let http = Arc::new(MockHttp::default());
        let handler = handler(&ALARMS, &http);
        assert!(handler.should_run_query(&RecordQuery::default()));
        assert!(!handler.should_run_query(&RecordQuery {
            hide: true,
            ..RecordQuery::default()
        }));
        assert_eq!(handler.transform_filter("  ", &ScopedVars::new()), "");
    }
}
