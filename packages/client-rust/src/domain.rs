//! Per-domain endpoint descriptors.

use serde_json::{Map, Value};
use slquery_core::domains::{
    alarm_fields, result_fields, step_fields, system_fields, test_plan_fields, work_order_fields,
    ALARM_ERRORS, RESULT_ERRORS, STEP_ERRORS, SYSTEM_ERRORS, TEST_PLAN_ERRORS, WORK_ORDER_ERRORS,
};
use slquery_core::{BatchQueryConfig, ErrorMessages, FieldRegistry, PageResult, SkipPage};

use crate::error::QueryError;

/// How an endpoint walks through its result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaginationStyle {
    /// Server-issued continuation tokens.
    ContinuationToken,
    /// Client-computed `skip` offsets.
    Skip,
}

/// Everything the query handler needs to know about one record domain.
#[derive(Debug)]
pub struct DomainDescriptor {
    pub name: &'static str,
    pub endpoint: &'static str,
    /// Key of the record array in the response body.
    pub records_key: &'static str,
    /// Key of the total count in the response body.
    pub total_key: &'static str,
    pub pagination: PaginationStyle,
    pub batch: BatchQueryConfig,
    /// Records returned when the caller sets no explicit take.
    pub default_take: u32,
    /// Upper bound on a caller-requested take.
    pub max_take: u32,
    pub errors: ErrorMessages,
    pub fields: fn() -> FieldRegistry,
    pub default_columns: &'static [&'static str],
    /// Record field holding a part number, when the domain has one.
    pub part_number_field: Option<&'static str>,
}

/// The record domains served by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Domain {
    Alarms,
    Results,
    Steps,
    Systems,
    WorkOrders,
    TestPlans,
}

impl Domain {
    #[must_use]
    pub fn descriptor(self) -> &'static DomainDescriptor {
        match self {
            Self::Alarms => &ALARMS,
            Self::Results => &RESULTS,
            Self::Steps => &STEPS,
            Self::Systems => &SYSTEMS,
            Self::WorkOrders => &WORK_ORDERS,
            Self::TestPlans => &TEST_PLANS,
        }
    }
}

pub static ALARMS: DomainDescriptor = DomainDescriptor {
    name: "alarms",
    endpoint: "/nialarm/v1/query-instances-with-filter",
    records_key: "alarms",
    total_key: "totalCount",
    pagination: PaginationStyle::ContinuationToken,
    batch: BatchQueryConfig::new(1000, 4),
    default_take: 1000,
    max_take: 10_000,
    errors: ALARM_ERRORS,
    fields: alarm_fields,
    default_columns: &["displayName", "currentSeverityLevel", "occurredAt", "active", "workspace"],
    part_number_field: None,
};

pub static RESULTS: DomainDescriptor = DomainDescriptor {
    name: "results",
    endpoint: "/nitestmonitor/v2/query-results",
    records_key: "results",
    total_key: "totalCount",
    pagination: PaginationStyle::ContinuationToken,
    batch: BatchQueryConfig::new(1000, 6),
    default_take: 1000,
    max_take: 10_000,
    errors: RESULT_ERRORS,
    fields: result_fields,
    default_columns: &["programName", "status", "partNumber", "startedAt", "workspace"],
    part_number_field: Some("partNumber"),
};

pub static STEPS: DomainDescriptor = DomainDescriptor {
    name: "steps",
    endpoint: "/nitestmonitor/v2/query-steps",
    records_key: "steps",
    total_key: "totalCount",
    pagination: PaginationStyle::ContinuationToken,
    batch: BatchQueryConfig::new(500, 6),
    default_take: 1000,
    max_take: 10_000,
    errors: STEP_ERRORS,
    fields: step_fields,
    default_columns: &["name", "stepType", "status", "startedAt", "totalTimeInSeconds"],
    part_number_field: None,
};

pub static SYSTEMS: DomainDescriptor = DomainDescriptor {
    name: "systems",
    endpoint: "/nisysmgmt/v1/query-systems",
    records_key: "data",
    total_key: "count",
    pagination: PaginationStyle::Skip,
    batch: BatchQueryConfig::new(1000, 4),
    default_take: 1000,
    max_take: 10_000,
    errors: SYSTEM_ERRORS,
    fields: system_fields,
    default_columns: &["id", "alias", "connectionStatus", "workspace"],
    part_number_field: None,
};

pub static WORK_ORDERS: DomainDescriptor = DomainDescriptor {
    name: "work orders",
    endpoint: "/niworkorder/v1/query-workorders",
    records_key: "workOrders",
    total_key: "totalCount",
    pagination: PaginationStyle::ContinuationToken,
    batch: BatchQueryConfig::new(500, 6),
    default_take: 1000,
    max_take: 10_000,
    errors: WORK_ORDER_ERRORS,
    fields: work_order_fields,
    default_columns: &["id", "name", "state", "dueDate", "workspace"],
    part_number_field: None,
};

pub static TEST_PLANS: DomainDescriptor = DomainDescriptor {
    name: "test plans",
    endpoint: "/niworkorder/v1/query-testplans",
    records_key: "testPlans",
    total_key: "totalCount",
    pagination: PaginationStyle::ContinuationToken,
    batch: BatchQueryConfig::new(500, 6),
    default_take: 1000,
    max_take: 10_000,
    errors: TEST_PLAN_ERRORS,
    fields: test_plan_fields,
    default_columns: &["id", "name", "state", "partNumber", "workspace"],
    part_number_field: Some("partNumber"),
};

impl DomainDescriptor {
    /// Clamps a caller-requested take to this domain's bounds.
    #[must_use]
    pub fn effective_take(&self, requested: Option<u32>) -> u32 {
        requested.unwrap_or(self.default_take).min(self.max_take)
    }

    /// Splits a continuation-token response body into a page.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::MalformedResponse`] if the body is not an object
    /// or has no record array.
    pub fn decode_page(&self, body: Value) -> Result<PageResult<Value>, QueryError> {
        let mut object = self.object_body(body)?;
        let data = self.take_records(&mut object)?;
        let continuation_token = object
            .get("continuationToken")
            .and_then(Value::as_str)
            .map(str::to_string);
        let mut page = PageResult::new(data, continuation_token);
        page.total_count = object.get(self.total_key).and_then(Value::as_u64);
        Ok(page)
    }

    /// Splits a skip/take response body into a page.
    ///
    /// # Errors
    ///
    /// Same as [`decode_page`](Self::decode_page).
    pub fn decode_skip_page(&self, body: Value) -> Result<SkipPage<Value>, QueryError> {
        let mut object = self.object_body(body)?;
        let data = self.take_records(&mut object)?;
        Ok(SkipPage {
            data,
            total_count: object.get(self.total_key).and_then(Value::as_u64),
        })
    }

    fn object_body(&self, body: Value) -> Result<Map<String, Value>, QueryError> {
        match body {
            Value::Object(object) => Ok(object),
            other => Err(QueryError::MalformedResponse(format!(
                "expected an object from {}, got {other}",
                self.endpoint
            ))),
        }
    }

    fn take_records(&self, object: &mut Map<String, Value>) -> Result<Vec<Value>, QueryError> {
        match object.remove(self.records_key) {
            Some(Value::Array(data)) => Ok(data),
            Some(Value::Null) => Ok(Vec::new()),
            _ => Err(QueryError::MalformedResponse(format!(
                "missing `{}` array in response from {}",
                self.records_key, self.endpoint
            ))),
        }
    }
}
