//! Field registries and error-message tables for each record domain.
//!
//! Logical names are the ones the query builders emit; physical paths are
//! the backend's.

use crate::error::ErrorMessages;
use crate::fields::{FieldRegistry, FieldTransform};

/// Severity level that means "critical and above".
pub const CRITICAL_SEVERITY: &str = "4";

const NO_PATHS: [&str; 0] = [];

fn with_plain(registry: FieldRegistry, names: &[&str]) -> FieldRegistry {
    names.iter().fold(registry, |reg, name| {
        reg.with(*name, FieldTransform::plain(*name))
    })
}

fn with_time(registry: FieldRegistry, names: &[&str]) -> FieldRegistry {
    names.iter().fold(registry, |reg, name| {
        reg.with(*name, FieldTransform::time(*name))
    })
}

// ---------------------------------------------------------------------------
// Alarms
// ---------------------------------------------------------------------------

pub const ALARM_ERRORS: ErrorMessages = ErrorMessages::new("alarms");

#[must_use]
pub fn alarm_fields() -> FieldRegistry {
    let reg = with_plain(
        FieldRegistry::new(),
        &[
            "alarmId",
            "channel",
            "condition",
            "createdBy",
            "currentSeverityLevel",
            "highestSeverityLevel",
            "description",
            "displayName",
            "resourceType",
            "workspace",
        ],
    );
    with_time(
        reg,
        &[
            "occurredAt",
            "updatedAt",
            "acknowledgedAt",
            "mostRecentSetOccurredAt",
            "mostRecentTransitionOccurredAt",
        ],
    )
        .with("acknowledged", FieldTransform::boolean("acknowledged"))
        .with("active", FieldTransform::boolean("active"))
        .with("clear", FieldTransform::boolean("clear"))
        .with("keywords", FieldTransform::list("keywords"))
        .with("properties", FieldTransform::key_value("properties"))
        .with(
            "source",
            FieldTransform::fan_out(
                r#"properties["system"]"#,
                r#"properties["minionId"]"#,
                NO_PATHS,
            ),
        )
        .with("instanceId", FieldTransform::Verbatim)
        .with_threshold("currentSeverityLevel", CRITICAL_SEVERITY)
        .with_threshold("highestSeverityLevel", CRITICAL_SEVERITY)
}

// ---------------------------------------------------------------------------
// Test results
// ---------------------------------------------------------------------------

pub const RESULT_ERRORS: ErrorMessages = ErrorMessages::new("results");

#[must_use]
pub fn result_fields() -> FieldRegistry {
    let reg = with_plain(
        FieldRegistry::new(),
        &[
            "programName",
            "operator",
            "serialNumber",
            "partNumber",
            "hostName",
            "systemId",
            "workspace",
        ],
    );
    with_time(reg, &["startedAt", "updatedAt"])
        .with("status", FieldTransform::plain("status.statusType"))
        .with("keywords", FieldTransform::list("keywords"))
        .with("fileIds", FieldTransform::list("fileIds"))
        .with("dataTableIds", FieldTransform::list("dataTableIds"))
        .with("properties", FieldTransform::key_value("properties"))
        .with("id", FieldTransform::Verbatim)
        .with("totalTimeInSeconds", FieldTransform::Verbatim)
}

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

pub const STEP_ERRORS: ErrorMessages = ErrorMessages::new("steps");

#[must_use]
pub fn step_fields() -> FieldRegistry {
    let reg = with_plain(
        FieldRegistry::new(),
        &["name", "stepType", "stepId", "parentId", "resultId", "path", "workspace"],
    );
    with_time(reg, &["startedAt", "updatedAt"])
        .with("status", FieldTransform::plain("status.statusType"))
        .with("keywords", FieldTransform::list("keywords"))
        .with("properties", FieldTransform::key_value("properties"))
        .with("programName", FieldTransform::plain("result.programName"))
        .with("partNumber", FieldTransform::plain("result.partNumber"))
        .with("totalTimeInSeconds", FieldTransform::Verbatim)
}

// ---------------------------------------------------------------------------
// Systems
// ---------------------------------------------------------------------------

pub const SYSTEM_ERRORS: ErrorMessages = ErrorMessages::new("systems").with_extra(&[(
    401,
    "The query to fetch systems failed because the request was not authorized. \
     Check the API key configured for the data source.",
)]);

#[must_use]
pub fn system_fields() -> FieldRegistry {
    with_plain(FieldRegistry::new(), &["id", "alias", "workspace"])
        .with("connectionStatus", FieldTransform::plain("connected.data.state"))
        .with("locked", FieldTransform::boolean("grains.data.minion_blackout"))
        .with("osFullName", FieldTransform::plain("grains.data.osfullname"))
        .with("model", FieldTransform::plain("grains.data.productname"))
        .with("vendor", FieldTransform::plain("grains.data.manufacturer"))
        .with("keywords", FieldTransform::list("keywords.data"))
        .with("properties", FieldTransform::key_value("properties.data"))
        .with("lastUpdated", FieldTransform::time("connected.lastUpdatedTimestamp"))
}

// ---------------------------------------------------------------------------
// Work orders and test plans
// ---------------------------------------------------------------------------

const WORK_ITEM_AUTH: &[(u16, &str)] = &[
    (
        401,
        "The query failed because the request was not authorized. \
         Check the API key configured for the data source.",
    ),
    (
        403,
        "The query failed because access to the requested workspace was denied.",
    ),
];

pub const WORK_ORDER_ERRORS: ErrorMessages =
    ErrorMessages::new("work orders").with_extra(WORK_ITEM_AUTH);

pub const TEST_PLAN_ERRORS: ErrorMessages =
    ErrorMessages::new("test plans").with_extra(WORK_ITEM_AUTH);

fn work_item_fields() -> FieldRegistry {
    let reg = with_plain(
        FieldRegistry::new(),
        &[
            "id",
            "name",
            "state",
            "type",
            "description",
            "assignedTo",
            "requestedBy",
            "createdBy",
            "updatedBy",
            "workspace",
        ],
    );
    with_time(reg, &["createdAt", "updatedAt"])
        .with("properties", FieldTransform::key_value("properties"))
}

#[must_use]
pub fn work_order_fields() -> FieldRegistry {
    with_time(work_item_fields(), &["earliestStartDate", "dueDate"])
}

#[must_use]
pub fn test_plan_fields() -> FieldRegistry {
    with_plain(work_item_fields(), &["partNumber", "systemId", "workOrderId", "dutId"])
        .with("fixtureIds", FieldTransform::list("fixtureIds"))
        .with("plannedStartDateTime", FieldTransform::time("plannedStartDateTime"))
        .with("estimatedEndDateTime", FieldTransform::time("estimatedEndDateTime"))
}
