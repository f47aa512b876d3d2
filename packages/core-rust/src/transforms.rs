//! Per-field expression transforms.
//!
//! Each transform takes the clause value and operator and returns the backend
//! expression that replaces the clause, or `None` when the combination is not
//! something the field supports (the clause is then left as written).

use crate::fields::{FieldTransform, Operator};
use crate::filter::{Call, CompareOp, Comparison, Expr, Operand};

/// Template token a time field replaces with the current instant.
pub const NOW_TOKEN: &str = "${__now:date}";

/// Per-compilation inputs shared by every transform.
#[derive(Debug, Clone)]
pub struct TransformContext {
    /// Current instant rendered as ISO-8601.
    pub now_iso: String,
}

/// Splits a `{a,b,c}` multi-value literal. Any other text is a single value.
#[must_use]
pub fn split_multi_value(value: &str) -> Vec<&str> {
    match value.strip_prefix('{').and_then(|v| v.strip_suffix('}')) {
        Some(inner) if !inner.is_empty() => inner.split(',').collect(),
        _ => vec![value],
    }
}

/// The primitive clause for one physical path and one value.
#[must_use]
pub fn clause(path: &str, op: Operator, value: &str) -> Expr {
    match op {
        Operator::Compare(cmp) => Expr::Comparison(Comparison::quoted(path, cmp, value)),
        Operator::Contains => contains(path, value),
        Operator::NotContains => Expr::not(contains(path, value)),
        Operator::IsBlank => is_blank(path),
        Operator::IsNotBlank => Expr::not(is_blank(path)),
    }
}

fn contains(path: &str, value: &str) -> Expr {
    Expr::Call(Call::new(path, "Contains", vec![Operand::Quoted(value.to_string())]))
}

fn is_blank(path: &str) -> Expr {
    Expr::Call(Call::new(
        "string",
        "IsNullOrEmpty",
        vec![Operand::Bare(path.to_string())],
    ))
}

/// `{a,b}` expansion: one term per value, joined by the operator's connective.
fn multi_value(op: Operator, value: &str, term: impl Fn(&str) -> Option<Expr>) -> Option<Expr> {
    if op.is_blank_check() {
        return term(value);
    }
    let terms = split_multi_value(value)
        .into_iter()
        .map(term)
        .collect::<Option<Vec<_>>>()?;
    Expr::joined(op.connective(), terms)
}

/// Plain multi-value field.
#[must_use]
pub fn plain(path: &str, value: &str, op: Operator) -> Option<Expr> {
    multi_value(op, value, |v| Some(clause(path, op, v)))
}

/// Time field: `${__now:date}` is resolved before plain expansion.
#[must_use]
pub fn time(path: &str, value: &str, op: Operator, ctx: &TransformContext) -> Option<Expr> {
    let value = value.replace(NOW_TOKEN, &ctx.now_iso);
    plain(path, &value, op)
}

/// Boolean field exposed as `path.Equals(bool)`.
#[must_use]
pub fn boolean(path: &str, value: &str, op: Operator) -> Option<Expr> {
    let negate = match op {
        Operator::Compare(CompareOp::NotEquals) => true,
        Operator::Compare(cmp) if cmp.is_equality() => false,
        _ => return None,
    };
    multi_value(op, value, |v| {
        let normalized = match v.trim().to_ascii_lowercase().as_str() {
            "true" => "true",
            "false" => "false",
            _ => return None,
        };
        let call = Expr::Call(Call::new(
            path,
            "Equals",
            vec![Operand::Bare(normalized.to_string())],
        ));
        Some(if negate { Expr::not(call) } else { call })
    })
}

/// Array field: membership is expressed through `Contains`.
#[must_use]
pub fn list(path: &str, value: &str, op: Operator) -> Option<Expr> {
    let op = match op {
        Operator::Compare(cmp) if cmp.is_equality() => Operator::Contains,
        Operator::Compare(CompareOp::NotEquals) => Operator::NotContains,
        Operator::Contains | Operator::NotContains => op,
        _ => return None,
    };
    plain(path, value, op)
}

/// Derived field over several physical paths. Fan-out is the outer
/// expansion; each path gets its own multi-value expansion.
#[must_use]
pub fn fan_out(paths: &[String], value: &str, op: Operator) -> Option<Expr> {
    let terms = paths
        .iter()
        .map(|path| plain(path, value, op))
        .collect::<Option<Vec<_>>>()?;
    Expr::joined(op.connective(), terms)
}

/// Property bag entry, addressed as `path["key"]`.
#[must_use]
pub fn key_value(path: &str, key: &str, value: &str, op: Operator) -> Option<Expr> {
    let escaped = key.replace('\\', "\\\\").replace('"', "\\\"");
    plain(&format!("{path}[\"{escaped}\"]"), value, op)
}

impl FieldTransform {
    /// Applies this transform to a clause. `key` carries the property name
    /// for key-value lookups.
    #[must_use]
    pub fn apply(
        &self,
        key: Option<&str>,
        value: &str,
        op: Operator,
        ctx: &TransformContext,
    ) -> Option<Expr> {
        match (self, key) {
            (Self::Verbatim, _) => None,
            (Self::Plain { path }, None) => plain(path, value, op),
            (Self::Time { path }, None) => time(path, value, op, ctx),
            (Self::Boolean { path }, None) => boolean(path, value, op),
            (Self::List { path }, None) => list(path, value, op),
            (Self::FanOut { paths }, None) => fan_out(paths, value, op),
            (Self::KeyValue { path }, Some(key)) => key_value(path, key, value, op),
            _ => None,
        }
    }
}

/// Applies threshold rules: `path = "N"` becomes `path >= "N"` and
/// `path != "N"` becomes `path < "N"` when `N` is the rule's sentinel.
pub fn apply_thresholds(expr: &mut Expr, rules: &[crate::fields::ThresholdRule]) {
    if rules.is_empty() {
        return;
    }
    match expr {
        Expr::Or(items) | Expr::And(items) => {
            for item in items {
                apply_thresholds(item, rules);
            }
        }
        Expr::Not(inner) | Expr::Group(inner) => apply_thresholds(inner, rules),
        Expr::Comparison(cmp) => {
            let Operand::Quoted(value) = &cmp.value else {
                return;
            };
            let matched = rules
                .iter()
                .any(|rule| rule.path == cmp.field && &rule.sentinel == value);
            if matched {
                cmp.op = match cmp.op {
                    op if op.is_equality() => CompareOp::GreaterOrEqual,
                    CompareOp::NotEquals => CompareOp::Less,
                    op => op,
                };
            }
        }
        Expr::Call(_) | Expr::Term(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::ThresholdRule;

    const EQ: Operator = Operator::Compare(CompareOp::Equals);
    const NE: Operator = Operator::Compare(CompareOp::NotEquals);

    fn ctx() -> TransformContext {
        TransformContext {
            now_iso: "2024-03-01T12:00:00.000Z".to_string(),
        }
    }

    fn render(expr: Option<Expr>) -> String {
        expr.expect("transform applies").to_string()
    }

    #[test]
    fn split_multi_value_forms() {
        assert_eq!(split_multi_value("{a,b,c}"), vec!["a", "b", "c"]);
        assert_eq!(split_multi_value("plain"), vec!["plain"]);
        assert_eq!(split_multi_value("{}"), vec!["{}"]);
        assert_eq!(split_multi_value("{single}"), vec!["single"]);
    }

    #[test]
    fn plain_multi_value_equals_uses_or() {
        assert_eq!(render(plain("f", "{a,b}", EQ)), r#"(f = "a" || f = "b")"#);
    }

    #[test]
    fn plain_multi_value_not_equals_uses_and() {
        assert_eq!(render(plain("f", "{a,b}", NE)), r#"(f != "a" && f != "b")"#);
    }

    #[test]
    fn plain_single_value_is_unwrapped() {
        assert_eq!(render(plain("f", "a", EQ)), r#"f = "a""#);
    }

    #[test]
    fn plain_contains_multi_value() {
        assert_eq!(
            render(plain("name", "{x,y}", Operator::NotContains)),
            r#"(!name.Contains("x") && !name.Contains("y"))"#
        );
    }

    #[test]
    fn time_replaces_now_token() {
        assert_eq!(
            render(time("updatedAt", NOW_TOKEN, Operator::Compare(CompareOp::Greater), &ctx())),
            r#"updatedAt > "2024-03-01T12:00:00.000Z""#
        );
    }

    #[test]
    fn time_leaves_other_values() {
        assert_eq!(
            render(time(
                "updatedAt",
                "2023-01-01T00:00:00.000Z",
                Operator::Compare(CompareOp::Less),
                &ctx()
            )),
            r#"updatedAt < "2023-01-01T00:00:00.000Z""#
        );
    }

    #[test]
    fn boolean_normalizes_and_negates() {
        assert_eq!(render(boolean("active", "True", EQ)), "active.Equals(true)");
        assert_eq!(render(boolean("active", "true", NE)), "!active.Equals(true)");
        assert_eq!(
            render(boolean("active", "{true,FALSE}", EQ)),
            "(active.Equals(true) || active.Equals(false))"
        );
        assert_eq!(
            render(boolean("active", "{true,false}", NE)),
            "(!active.Equals(true) && !active.Equals(false))"
        );
    }

    #[test]
    fn boolean_rejects_non_boolean_values_and_ops() {
        assert!(boolean("active", "maybe", EQ).is_none());
        assert!(boolean("active", "true", Operator::Compare(CompareOp::Greater)).is_none());
        assert!(boolean("active", "true", Operator::Contains).is_none());
    }

    #[test]
    fn list_rewrites_equality_into_contains() {
        assert_eq!(render(list("keywords", "a", EQ)), r#"keywords.Contains("a")"#);
        assert_eq!(render(list("keywords", "a", NE)), r#"!keywords.Contains("a")"#);
        assert_eq!(
            render(list("keywords", "{a,b}", EQ)),
            r#"(keywords.Contains("a") || keywords.Contains("b"))"#
        );
        assert!(list("keywords", "a", Operator::Compare(CompareOp::Less)).is_none());
    }

    #[test]
    fn fan_out_is_outer_expansion() {
        let paths = vec!["p1".to_string(), "p2".to_string()];
        assert_eq!(
            render(fan_out(&paths, "{x,y}", EQ)),
            r#"((p1 = "x" || p1 = "y") || (p2 = "x" || p2 = "y"))"#
        );
        assert_eq!(
            render(fan_out(&paths, "x", NE)),
            r#"(p1 != "x" && p2 != "x")"#
        );
    }

    #[test]
    fn fan_out_blank_and_contains() {
        let paths = vec!["p1".to_string(), "p2".to_string()];
        assert_eq!(
            render(fan_out(&paths, "", Operator::IsBlank)),
            "(string.IsNullOrEmpty(p1) && string.IsNullOrEmpty(p2))"
        );
        assert_eq!(
            render(fan_out(&paths, "", Operator::IsNotBlank)),
            "(!string.IsNullOrEmpty(p1) || !string.IsNullOrEmpty(p2))"
        );
        assert_eq!(
            render(fan_out(&paths, "{a,b}", Operator::Contains)),
            r#"((p1.Contains("a") || p1.Contains("b")) || (p2.Contains("a") || p2.Contains("b")))"#
        );
    }

    #[test]
    fn key_value_uses_indexer() {
        assert_eq!(
            render(key_value("properties", "serial", "{1,2}", EQ)),
            r#"(properties["serial"] = "1" || properties["serial"] = "2")"#
        );
        assert_eq!(
            render(key_value("properties", "q\"k", "v", Operator::Contains)),
            r#"properties["q\"k"].Contains("v")"#
        );
    }

    #[test]
    fn verbatim_never_applies() {
        assert!(FieldTransform::Verbatim.apply(None, "x", EQ, &ctx()).is_none());
    }

    #[test]
    fn key_value_requires_key() {
        assert!(FieldTransform::key_value("properties").apply(None, "x", EQ, &ctx()).is_none());
        assert!(FieldTransform::plain("p").apply(Some("k"), "x", EQ, &ctx()).is_none());
    }

    #[test]
    fn thresholds_rewrite_sentinel_only() {
        let rules = vec![ThresholdRule {
            path: "severity".into(),
            sentinel: "4".into(),
        }];
        let mut expr = plain("severity", "{1,4}", EQ).unwrap();
        apply_thresholds(&mut expr, &rules);
        assert_eq!(expr.to_string(), r#"(severity = "1" || severity >= "4")"#);

        let mut expr = plain("severity", "4", NE).unwrap();
        apply_thresholds(&mut expr, &rules);
        assert_eq!(expr.to_string(), r#"severity < "4""#);
    }
}
