//! Filter expression language: tokenizer, parser, and expression tree.
//!
//! Filters are LINQ-style boolean predicates such as
//! `status = "FAILED" && (keywords.Contains("nightly") || !string.IsNullOrEmpty(operator))`.
//! They are parsed once, rewritten as a tree, and rendered back to text.

pub mod ast;
pub mod parser;
pub mod token;

pub use ast::{Call, Comparison, Connective, Expr, Operand};
pub use parser::parse;
pub use token::CompareOp;

/// Errors raised while reading or compiling a filter expression.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FilterError {
    #[error("syntax error at offset {offset}: {message}")]
    Syntax { offset: usize, message: String },
    #[error("unknown field `{field}`")]
    UnknownField { field: String },
}

impl FilterError {
    pub(crate) fn syntax(offset: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            offset,
            message: message.into(),
        }
    }
}
