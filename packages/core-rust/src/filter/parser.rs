//! Recursive-descent parser producing an [`Expr`] tree.
//!
//! Grammar (precedence low to high):
//!
//! ```text
//! or      := and ( "||" and )*
//! and     := unary ( "&&" unary )*
//! unary   := "!" unary | primary
//! primary := "(" or ")" | clause
//! clause  := IDENT op operand | IDENT "(" [ operand ( "," operand )* ] ")" | IDENT
//! operand := STRING | IDENT
//! ```

use super::ast::{Call, Comparison, Expr, Operand};
use super::token::{tokenize, Token, TokenKind};
use super::FilterError;

/// Parses a filter expression.
///
/// # Errors
///
/// Returns `FilterError::Syntax` for empty input, unbalanced parentheses,
/// dangling connectives or any token sequence outside the grammar.
pub fn parse(input: &str) -> Result<Expr, FilterError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        end: input.len(),
    };
    let expr = parser.parse_or()?;
    match parser.peek() {
        None => Ok(expr),
        Some(token) => Err(FilterError::syntax(token.offset, "unexpected trailing input")),
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek().is_some_and(|t| &t.kind == kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn offset(&self) -> usize {
        self.peek().map_or(self.end, |t| t.offset)
    }

    fn parse_or(&mut self) -> Result<Expr, FilterError> {
        let mut items = vec![self.parse_and()?];
        while self.eat(&TokenKind::Or) {
            items.push(self.parse_and()?);
        }
        Ok(collapse(items, Expr::Or))
    }

    fn parse_and(&mut self) -> Result<Expr, FilterError> {
        let mut items = vec![self.parse_unary()?];
        while self.eat(&TokenKind::And) {
            items.push(self.parse_unary()?);
        }
        Ok(collapse(items, Expr::And))
    }

    fn parse_unary(&mut self) -> Result<Expr, FilterError> {
        if self.eat(&TokenKind::Not) {
            return Ok(Expr::not(self.parse_unary()?));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, FilterError> {
        let offset = self.offset();
        match self.next().map(|t| t.kind) {
            Some(TokenKind::LParen) => {
                let inner = self.parse_or()?;
                if !self.eat(&TokenKind::RParen) {
                    return Err(FilterError::syntax(self.offset(), "expected `)`"));
                }
                Ok(Expr::group(inner))
            }
            Some(TokenKind::Ident(ident)) => self.parse_clause(ident),
            Some(_) => Err(FilterError::syntax(offset, "expected a field or `(`")),
            None => Err(FilterError::syntax(offset, "unexpected end of expression")),
        }
    }

    fn parse_clause(&mut self, ident: String) -> Result<Expr, FilterError> {
        match self.peek().map(|t| &t.kind) {
            Some(TokenKind::Compare(op)) => {
                let op = *op;
                self.pos += 1;
                let value = self.parse_operand()?;
                Ok(Expr::Comparison(Comparison {
                    field: ident,
                    op,
                    value,
                }))
            }
            Some(TokenKind::LParen) => {
                self.pos += 1;
                let mut args = Vec::new();
                if !self.eat(&TokenKind::RParen) {
                    loop {
                        args.push(self.parse_operand()?);
                        if self.eat(&TokenKind::RParen) {
                            break;
                        }
                        if !self.eat(&TokenKind::Comma) {
                            return Err(FilterError::syntax(self.offset(), "expected `,` or `)`"));
                        }
                    }
                }
                let (target, method) = split_method(&ident);
                Ok(Expr::Call(Call::new(target, method, args)))
            }
            _ => Ok(Expr::Term(ident)),
        }
    }

    fn parse_operand(&mut self) -> Result<Operand, FilterError> {
        let offset = self.offset();
        match self.next().map(|t| t.kind) {
            Some(TokenKind::Str(s)) => Ok(Operand::Quoted(s)),
            Some(TokenKind::Ident(s)) => Ok(Operand::Bare(s)),
            _ => Err(FilterError::syntax(offset, "expected a value")),
        }
    }
}

fn collapse(mut items: Vec<Expr>, wrap: fn(Vec<Expr>) -> Expr) -> Expr {
    if items.len() == 1 {
        items.remove(0)
    } else {
        wrap(items)
    }
}

/// Splits `a.b.Method` into (`a.b`, `Method`), ignoring dots inside indexers.
fn split_method(ident: &str) -> (&str, &str) {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut split = None;
    for (i, c) in ident.char_indices() {
        match c {
            '"' => in_string = !in_string,
            '[' if !in_string => depth += 1,
            ']' if !in_string => depth = depth.saturating_sub(1),
            '.' if !in_string && depth == 0 => split = Some(i),
            _ => {}
        }
    }
    match split {
        Some(i) => (&ident[..i], &ident[i + 1..]),
        None => ("", ident),
    }
}
