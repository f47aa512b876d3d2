//! Computed-field query transformer.
//!
//! Turns a UI-level filter into the backend filter:
//!
//! 1. Empty input short-circuits to an empty filter.
//! 2. Template variables are substituted once through the [`TemplateResolver`].
//! 3. The text is parsed and every clause on a registered field is replaced by
//!    that field's transform output.
//! 4. Threshold rules run over the rewritten tree and the result is rendered.
//!
//! If nothing was rewritten the substituted text is returned exactly as it
//! came in, so backend-form filters survive byte for byte.

use std::sync::Arc;

use crate::clock::{iso_timestamp, ClockSource, SystemClock};
use crate::fields::{FieldLookup, FieldRegistry, FieldTransform, Operator};
use crate::filter::{parse, Call, Expr, FilterError, Operand};
use crate::template::{NoopResolver, ScopedVars, TemplateResolver};
use crate::transforms::{apply_thresholds, TransformContext};

/// What to do with a clause on a field the registry does not know.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnknownFieldPolicy {
    /// Leave the clause as written (backend-native expressions).
    #[default]
    PassThrough,
    /// Fail with `FilterError::UnknownField`.
    Reject,
}

/// Compiles UI filters against one field registry.
#[derive(Clone)]
pub struct ComputedFieldTransformer {
    registry: Arc<FieldRegistry>,
    resolver: Arc<dyn TemplateResolver>,
    clock: Arc<dyn ClockSource>,
    policy: UnknownFieldPolicy,
}

impl std::fmt::Debug for ComputedFieldTransformer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComputedFieldTransformer")
            .field("fields", &self.registry.len())
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl ComputedFieldTransformer {
    /// Transformer with no template substitution and the system clock.
    #[must_use]
    pub fn new(registry: Arc<FieldRegistry>) -> Self {
        Self {
            registry,
            resolver: Arc::new(NoopResolver),
            clock: Arc::new(SystemClock),
            policy: UnknownFieldPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn TemplateResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn ClockSource>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_policy(mut self, policy: UnknownFieldPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn registry(&self) -> &FieldRegistry {
        &self.registry
    }

    #[must_use]
    pub fn policy(&self) -> UnknownFieldPolicy {
        self.policy
    }

    /// Best-effort transform. Never fails: malformed filters and rejected
    /// fields come back as the substituted text, with a warning logged.
    #[must_use]
    pub fn transform(&self, filter: &str, scoped: &ScopedVars) -> String {
        if filter.trim().is_empty() {
            return String::new();
        }
        let substituted = self.resolver.replace(filter, scoped);
        match self.compile(&substituted) {
            Ok(compiled) => compiled,
            Err(err) => {
                tracing::warn!(error = %err, "filter left untransformed");
                substituted
            }
        }
    }

    /// Strict transform.
    ///
    /// # Errors
    ///
    /// Returns `FilterError::Syntax` for malformed filters and, under
    /// [`UnknownFieldPolicy::Reject`], `FilterError::UnknownField`.
    pub fn try_transform(&self, filter: &str, scoped: &ScopedVars) -> Result<String, FilterError> {
        if filter.trim().is_empty() {
            return Ok(String::new());
        }
        let substituted = self.resolver.replace(filter, scoped);
        self.compile(&substituted)
    }

    /// Rewrites an already-substituted filter.
    ///
    /// # Errors
    ///
    /// Same as [`Self::try_transform`].
    pub fn compile(&self, text: &str) -> Result<String, FilterError> {
        let mut expr = parse(text)?;
        let ctx = TransformContext {
            now_iso: iso_timestamp(self.clock.now()),
        };
        let mut changed = self.rewrite(&mut expr, &ctx)?;

        let before = expr.clone();
        apply_thresholds(&mut expr, self.registry.thresholds());
        changed |= expr != before;

        if changed {
            Ok(expr.to_string())
        } else {
            Ok(text.to_string())
        }
    }

    fn rewrite(&self, expr: &mut Expr, ctx: &TransformContext) -> Result<bool, FilterError> {
        let replacement = match expr {
            Expr::Or(items) | Expr::And(items) => {
                let mut changed = false;
                for item in items {
                    changed |= self.rewrite(item, ctx)?;
                }
                return Ok(changed);
            }
            Expr::Group(inner) => return self.rewrite(inner, ctx),
            Expr::Not(inner) => {
                if !matches!(inner.as_ref(), Expr::Call(_)) {
                    return self.rewrite(inner, ctx);
                }
                match inner.as_ref() {
                    Expr::Call(call) => match call_clause(call) {
                        Some((field, op, value)) => {
                            self.clause(field, negate(op), value, false, ctx)?
                        }
                        None => None,
                    },
                    _ => None,
                }
            }
            Expr::Call(call) => match call_clause(call) {
                Some((field, op, value)) => self.clause(field, op, value, false, ctx)?,
                None => None,
            },
            Expr::Comparison(cmp) => {
                let bare = matches!(cmp.value, Operand::Bare(_));
                self.clause(&cmp.field, Operator::Compare(cmp.op), cmp.value.text(), bare, ctx)?
            }
            Expr::Term(_) => None,
        };

        match replacement {
            Some(new_expr) if new_expr != *expr => {
                *expr = new_expr;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Resolves one clause. `bare` marks an unquoted value; only boolean
    /// fields accept those.
    fn clause(
        &self,
        field: &str,
        op: Operator,
        value: &str,
        bare: bool,
        ctx: &TransformContext,
    ) -> Result<Option<Expr>, FilterError> {
        let Some(lookup) = self.registry.lookup(field) else {
            return match self.policy {
                UnknownFieldPolicy::PassThrough => Ok(None),
                UnknownFieldPolicy::Reject => Err(FilterError::UnknownField {
                    field: field.to_string(),
                }),
            };
        };
        let (transform, key) = match lookup {
            FieldLookup::Field(transform) => (transform, None),
            FieldLookup::Keyed { transform, key } => (transform, Some(key)),
        };
        if bare && !matches!(transform, FieldTransform::Boolean { .. }) {
            return Ok(None);
        }
        let rewritten = transform.apply(key, value, op, ctx);
        if rewritten.is_none() && !matches!(transform, FieldTransform::Verbatim) {
            tracing::debug!(field, ?op, "unsupported operator for field, clause kept");
        }
        Ok(rewritten)
    }
}

/// Recognizes `field.Contains("v")` and `string.IsNullOrEmpty(field)`.
fn call_clause(call: &Call) -> Option<(&str, Operator, &str)> {
    match (call.target.as_str(), call.method.as_str(), call.args.as_slice()) {
        ("string", "IsNullOrEmpty", [Operand::Bare(field)]) => {
            Some((field.as_str(), Operator::IsBlank, ""))
        }
        (target, "Contains", [Operand::Quoted(value)]) if !target.is_empty() => {
            Some((target, Operator::Contains, value.as_str()))
        }
        _ => None,
    }
}

fn negate(op: Operator) -> Operator {
    match op {
        Operator::Contains => Operator::NotContains,
        Operator::IsBlank => Operator::IsNotBlank,
        other => other,
    }
}
