//! Logical field registry.
//!
//! Maps the field names a user writes in a filter to the physical backend
//! path(s) and the strategy used to rewrite clauses on that field.

use std::collections::HashMap;

use crate::filter::{CompareOp, Connective};

/// Operator of a single filter clause, as seen by a field transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// `field op "value"`.
    Compare(CompareOp),
    /// `field.Contains("value")`.
    Contains,
    /// `!field.Contains("value")`.
    NotContains,
    /// `string.IsNullOrEmpty(field)`.
    IsBlank,
    /// `!string.IsNullOrEmpty(field)`.
    IsNotBlank,
}

impl Operator {
    /// Connective joining the terms of a multi-value or fan-out expansion.
    ///
    /// Positive membership (`=`, `==`, `Contains`, is-not-blank) matches if
    /// any term matches; negated and relational forms require every term.
    #[must_use]
    pub fn connective(self) -> Connective {
        match self {
            Self::Compare(op) if op.is_equality() => Connective::Or,
            Self::Contains | Self::IsNotBlank => Connective::Or,
            Self::Compare(_) | Self::NotContains | Self::IsBlank => Connective::And,
        }
    }

    /// True for the operators that take no value.
    #[must_use]
    pub fn is_blank_check(self) -> bool {
        matches!(self, Self::IsBlank | Self::IsNotBlank)
    }
}

/// Compilation strategy for one logical field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldTransform {
    /// Backend field passed through untouched.
    Verbatim,
    /// Renamed field with `{a,b}` multi-value expansion.
    Plain { path: String },
    /// Like `Plain`, and `${__now:date}` becomes the current ISO-8601 instant.
    Time { path: String },
    /// Boolean exposed only through `path.Equals(bool)`.
    Boolean { path: String },
    /// Array field queried through `path.Contains("value")`.
    List { path: String },
    /// Logical field backed by two or more physical paths.
    FanOut { paths: Vec<String> },
    /// Property bag addressed as `<logical>.<key>`, emitted as `path["key"]`.
    KeyValue { path: String },
}

impl FieldTransform {
    #[must_use]
    pub fn plain(path: impl Into<String>) -> Self {
        Self::Plain { path: path.into() }
    }

    #[must_use]
    pub fn time(path: impl Into<String>) -> Self {
        Self::Time { path: path.into() }
    }

    #[must_use]
    pub fn boolean(path: impl Into<String>) -> Self {
        Self::Boolean { path: path.into() }
    }

    #[must_use]
    pub fn list(path: impl Into<String>) -> Self {
        Self::List { path: path.into() }
    }

    #[must_use]
    pub fn key_value(path: impl Into<String>) -> Self {
        Self::KeyValue { path: path.into() }
    }

    /// A fan-out over at least two physical paths.
    #[must_use]
    pub fn fan_out<S: Into<String>>(
        first: impl Into<String>,
        second: impl Into<String>,
        rest: impl IntoIterator<Item = S>,
    ) -> Self {
        let mut paths = vec![first.into(), second.into()];
        paths.extend(rest.into_iter().map(Into::into));
        Self::FanOut { paths }
    }
}

/// Rewrites `path = "sentinel"` into `path >= "sentinel"` (and `!=` into `<`)
/// after field expansion, for values meaning "this level and above".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThresholdRule {
    pub path: String,
    pub sentinel: String,
}

/// How a clause referencing a field resolved against the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldLookup<'a> {
    /// Exact logical name.
    Field(&'a FieldTransform),
    /// `<bag>.<key>` on a key-value field.
    Keyed {
        transform: &'a FieldTransform,
        key: &'a str,
    },
}

/// Static mapping from logical field name to its transform.
#[derive(Debug, Clone, Default)]
pub struct FieldRegistry {
    fields: HashMap<String, FieldTransform>,
    thresholds: Vec<ThresholdRule>,
}

impl FieldRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `transform` for `name`, replacing any earlier entry.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, transform: FieldTransform) -> Self {
        self.fields.insert(name.into(), transform);
        self
    }

    #[must_use]
    pub fn with_threshold(mut self, path: impl Into<String>, sentinel: impl Into<String>) -> Self {
        self.thresholds.push(ThresholdRule {
            path: path.into(),
            sentinel: sentinel.into(),
        });
        self
    }

    /// Resolves a field token. Exact names win; otherwise the head segment
    /// before the first `.` is tried as a key-value bag.
    ///
    /// Identifiers already in backend form never match a bag: keys holding
    /// an indexer are refused, as is anything under the bag's physical path.
    #[must_use]
    pub fn lookup<'a>(&'a self, field: &'a str) -> Option<FieldLookup<'a>> {
        if let Some(transform) = self.fields.get(field) {
            return Some(FieldLookup::Field(transform));
        }
        let (head, key) = field.split_once('.')?;
        match self.fields.get(head)? {
            transform @ FieldTransform::KeyValue { path }
                if !key.is_empty() && !key.contains('[') && !shadows(head, field, path) =>
            {
                Some(FieldLookup::Keyed { transform, key })
            }
            _ => None,
        }
    }

    #[must_use]
    pub fn thresholds(&self) -> &[ThresholdRule] {
        &self.thresholds
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// `field` reaches into the bag's physical `path`, which differs from its
/// logical name `head`.
fn shadows(head: &str, field: &str, path: &str) -> bool {
    path != head
        && field
            .strip_prefix(path)
            .is_some_and(|rest| rest.starts_with(['.', '[']))
}
