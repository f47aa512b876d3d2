//! Filter expression tree and its backend string rendering.
//!
//! Rendering is canonical: single spaces around binary operators and
//! connectives, string operands always double-quoted with `"`, `\` and
//! control characters escaped. Parentheses appear only where the tree holds
//! a [`Expr::Group`].

use std::fmt;

use super::token::CompareOp;

/// Right-hand side of a comparison or an argument of a method call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    /// `"text"` in the source.
    Quoted(String),
    /// Unquoted literal or identifier (`true`, `42`, `fieldName`).
    Bare(String),
}

impl Operand {
    /// The literal text, without quotes.
    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Self::Quoted(s) | Self::Bare(s) => s,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Quoted(s) => {
                f.write_str("\"")?;
                for c in s.chars() {
                    match c {
                        '"' => f.write_str("\\\"")?,
                        '\\' => f.write_str("\\\\")?,
                        '\t' => f.write_str("\\t")?,
                        '\n' => f.write_str("\\n")?,
                        '\r' => f.write_str("\\r")?,
                        '\0' => f.write_str("\\0")?,
                        c => write!(f, "{c}")?,
                    }
                }
                f.write_str("\"")
            }
            Self::Bare(s) => f.write_str(s),
        }
    }
}

/// `field op value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comparison {
    pub field: String,
    pub op: CompareOp,
    pub value: Operand,
}

impl Comparison {
    #[must_use]
    pub fn quoted(field: impl Into<String>, op: CompareOp, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            op,
            value: Operand::Quoted(value.into()),
        }
    }
}

/// `target.method(args)`; `target` is empty for a free function call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub target: String,
    pub method: String,
    pub args: Vec<Operand>,
}

impl Call {
    #[must_use]
    pub fn new(target: impl Into<String>, method: impl Into<String>, args: Vec<Operand>) -> Self {
        Self {
            target: target.into(),
            method: method.into(),
            args,
        }
    }
}

/// Boolean filter expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// Two or more operands joined by `||`.
    Or(Vec<Expr>),
    /// Two or more operands joined by `&&`.
    And(Vec<Expr>),
    Not(Box<Expr>),
    /// Parenthesized sub-expression.
    Group(Box<Expr>),
    Comparison(Comparison),
    Call(Call),
    /// A lone identifier or literal used as a predicate (`isActive`, `true`).
    Term(String),
}

/// Logical connective used when a clause fans out into several clauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connective {
    And,
    Or,
}

impl Expr {
    #[must_use]
    pub fn not(inner: Expr) -> Self {
        Self::Not(Box::new(inner))
    }

    #[must_use]
    pub fn group(inner: Expr) -> Self {
        Self::Group(Box::new(inner))
    }

    /// Joins `terms` with `connective`. A single term is returned as is; two
    /// or more are wrapped in a [`Expr::Group`]. Returns `None` for no terms.
    #[must_use]
    pub fn joined(connective: Connective, mut terms: Vec<Expr>) -> Option<Self> {
        match terms.len() {
            0 => None,
            1 => terms.pop(),
            _ => Some(Self::group(match connective {
                Connective::And => Self::And(terms),
                Connective::Or => Self::Or(terms),
            })),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, items: &[Expr], sep: &str) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Or(items) => write_joined(f, items, " || "),
            Self::And(items) => write_joined(f, items, " && "),
            Self::Not(inner) => write!(f, "!{inner}"),
            Self::Group(inner) => write!(f, "({inner})"),
            Self::Comparison(c) => write!(f, "{} {} {}", c.field, c.op.as_str(), c.value),
            Self::Call(call) => {
                if !call.target.is_empty() {
                    write!(f, "{}.", call.target)?;
                }
                write!(f, "{}(", call.method)?;
                for (i, arg) in call.args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
            Self::Term(term) => f.write_str(term),
        }
    }
}
