//! Template-variable substitution applied to filters before field rewriting.
//!
//! Dashboards hand us filters containing `$name`, `${name}` or
//! `${name:format}` references. Multi-valued variables render as `{v1,v2}`
//! so the multi-value transforms can fan them out later.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::clock::iso_timestamp;

/// Value bound to a template variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariableValue {
    Single(String),
    Multi(Vec<String>),
}

impl VariableValue {
    /// Renders the value the way it is spliced into a filter.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Single(value) => value.clone(),
            Self::Multi(values) if values.len() == 1 => values[0].clone(),
            Self::Multi(values) => format!("{{{}}}", values.join(",")),
        }
    }
}

impl From<&str> for VariableValue {
    fn from(value: &str) -> Self {
        Self::Single(value.to_string())
    }
}

impl From<Vec<String>> for VariableValue {
    fn from(values: Vec<String>) -> Self {
        Self::Multi(values)
    }
}

/// Variables scoped to one query invocation (panel repeats, ad-hoc values).
pub type ScopedVars = HashMap<String, VariableValue>;

/// Dashboard time range, epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub from: u64,
    pub to: u64,
}

/// Replaces template tokens in a filter. Called once per filter with the
/// full text; unrecognized tokens must be left as they are.
pub trait TemplateResolver: Send + Sync {
    fn replace(&self, text: &str, scoped: &ScopedVars) -> String;
}

/// Resolver that never substitutes anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopResolver;

impl TemplateResolver for NoopResolver {
    fn replace(&self, text: &str, _scoped: &ScopedVars) -> String {
        text.to_string()
    }
}

static VARIABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::([A-Za-z0-9_]+))?\}|\$([A-Za-z_][A-Za-z0-9_]*)")
        .expect("variable pattern is valid")
});

/// Default resolver over scoped variables, dashboard-wide variables and the
/// dashboard time range.
///
/// Scoped variables shadow globals. `__from` and `__to` come from the time
/// range (`:date` renders ISO-8601, no format renders epoch millis). Anything
/// else, including `${__now:date}`, is left for later stages.
#[derive(Debug, Clone, Default)]
pub struct VariableInterpolator {
    globals: ScopedVars,
    time_range: Option<TimeRange>,
}

impl VariableInterpolator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_variable(
        mut self,
        name: impl Into<String>,
        value: impl Into<VariableValue>,
    ) -> Self {
        self.globals.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_time_range(mut self, range: TimeRange) -> Self {
        self.time_range = Some(range);
        self
    }

    fn builtin(&self, name: &str, format: Option<&str>) -> Option<String> {
        let range = self.time_range?;
        let millis = match name {
            "__from" => range.from,
            "__to" => range.to,
            _ => return None,
        };
        match format {
            Some("date" | "iso") => Some(iso_timestamp(millis)),
            None => Some(millis.to_string()),
            Some(_) => None,
        }
    }
}

impl TemplateResolver for VariableInterpolator {
    fn replace(&self, text: &str, scoped: &ScopedVars) -> String {
        VARIABLE
            .replace_all(text, |caps: &Captures<'_>| {
                let name = caps
                    .get(1)
                    .or_else(|| caps.get(3))
                    .map_or("", |m| m.as_str());
                let format = caps.get(2).map(|m| m.as_str());
                if let Some(value) = self.builtin(name, format) {
                    return value;
                }
                scoped
                    .get(name)
                    .or_else(|| self.globals.get(name))
                    .map_or_else(|| caps[0].to_string(), VariableValue::render)
            })
            .into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scoped(pairs: &[(&str, VariableValue)]) -> ScopedVars {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn single_and_multi_values() {
        let vars = scoped(&[
            ("station", VariableValue::from("S1")),
            (
                "part",
                VariableValue::Multi(vec!["p-1".into(), "p-2".into()]),
            ),
        ]);
        let out = NoopResolver.replace("x", &vars);
        assert_eq!(out, "x");

        let out = VariableInterpolator::new()
            .replace(r#"host = "$station" && part = "${part}""#, &vars);
        assert_eq!(out, r#"host = "S1" && part = "{p-1,p-2}""#);
    }

    #[test]
    fn scoped_shadows_global() {
        let resolver = VariableInterpolator::new().with_variable("ws", "global");
        let vars = scoped(&[("ws", VariableValue::from("local"))]);
        assert_eq!(resolver.replace("$ws", &vars), "local");
        assert_eq!(resolver.replace("$ws", &ScopedVars::new()), "global");
    }

    #[test]
    fn time_range_tokens() {
        let resolver = VariableInterpolator::new().with_time_range(TimeRange {
            from: 0,
            to: 1_709_294_400_000,
        });
        assert_eq!(
            resolver.replace(r#"t > "${__from:date}" && t < "${__to:date}""#, &ScopedVars::new()),
            r#"t > "1970-01-01T00:00:00.000Z" && t < "2024-03-01T12:00:00.000Z""#
        );
        assert_eq!(resolver.replace("${__to}", &ScopedVars::new()), "1709294400000");
    }

    #[test]
    fn now_and_unknown_tokens_survive() {
        let resolver = VariableInterpolator::new().with_time_range(TimeRange { from: 0, to: 1 });
        let text = r#"t > "${__now:date}" && x = "$missing" && y = "${other:csv}""#;
        assert_eq!(resolver.replace(text, &ScopedVars::new()), text);
    }

    #[test]
    fn single_element_multi_renders_bare() {
        assert_eq!(VariableValue::Multi(vec!["only".into()]).render(), "only");
    }
}
