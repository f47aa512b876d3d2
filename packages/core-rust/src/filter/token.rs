//! Tokenizer for LINQ-style filter expressions.

use super::FilterError;

/// Comparison operator appearing between a field and a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    /// `=`
    Equals,
    /// `==`
    DoubleEquals,
    /// `!=`
    NotEquals,
    /// `<`
    Less,
    /// `<=`
    LessOrEqual,
    /// `>`
    Greater,
    /// `>=`
    GreaterOrEqual,
}

impl CompareOp {
    /// Source spelling of the operator.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Equals => "=",
            Self::DoubleEquals => "==",
            Self::NotEquals => "!=",
            Self::Less => "<",
            Self::LessOrEqual => "<=",
            Self::Greater => ">",
            Self::GreaterOrEqual => ">=",
        }
    }

    /// True for `=` and `==`.
    #[must_use]
    pub fn is_equality(self) -> bool {
        matches!(self, Self::Equals | Self::DoubleEquals)
    }
}

/// A lexical token with its byte offset in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    LParen,
    RParen,
    Comma,
    And,
    Or,
    Not,
    Compare(CompareOp),
    /// Double-quoted literal with escapes decoded.
    Str(String),
    /// Field path, method path, or bare literal. Bracket indexers such as
    /// `properties["key"]` are kept verbatim inside the identifier.
    Ident(String),
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-' | '$' | '@')
}

/// Splits `input` into tokens.
///
/// # Errors
///
/// Returns `FilterError::Syntax` on unterminated strings, unterminated
/// indexers, or characters outside the filter grammar (for example the `=>`
/// of a lambda).
pub fn tokenize(input: &str) -> Result<Vec<Token>, FilterError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(offset, c)) = chars.peek() {
        let kind = match c {
            c if c.is_whitespace() => {
                chars.next();
                continue;
            }
            '(' => {
                chars.next();
                TokenKind::LParen
            }
            ')' => {
                chars.next();
                TokenKind::RParen
            }
            ',' => {
                chars.next();
                TokenKind::Comma
            }
            '&' | '|' => {
                chars.next();
                match chars.next() {
                    Some((_, next)) if next == c => {
                        if c == '&' {
                            TokenKind::And
                        } else {
                            TokenKind::Or
                        }
                    }
                    _ => return Err(FilterError::syntax(offset, format!("expected `{c}{c}`"))),
                }
            }
            '!' => {
                chars.next();
                if chars.next_if(|&(_, n)| n == '=').is_some() {
                    TokenKind::Compare(CompareOp::NotEquals)
                } else {
                    TokenKind::Not
                }
            }
            '=' => {
                chars.next();
                if chars.next_if(|&(_, n)| n == '=').is_some() {
                    TokenKind::Compare(CompareOp::DoubleEquals)
                } else if chars.peek().is_some_and(|&(_, n)| n == '>') {
                    return Err(FilterError::syntax(offset, "lambda expressions are not supported"));
                } else {
                    TokenKind::Compare(CompareOp::Equals)
                }
            }
            '<' | '>' => {
                chars.next();
                let or_equal = chars.next_if(|&(_, n)| n == '=').is_some();
                TokenKind::Compare(match (c, or_equal) {
                    ('<', false) => CompareOp::Less,
                    ('<', true) => CompareOp::LessOrEqual,
                    (_, false) => CompareOp::Greater,
                    (_, true) => CompareOp::GreaterOrEqual,
                })
            }
            '"' => {
                chars.next();
                TokenKind::Str(read_string(&mut chars, offset)?)
            }
            c if is_ident_char(c) => TokenKind::Ident(read_ident(&mut chars, offset)?),
            other => {
                return Err(FilterError::syntax(offset, format!("unexpected character `{other}`")));
            }
        };
        tokens.push(Token { kind, offset });
    }

    Ok(tokens)
}

type Chars<'a> = std::iter::Peekable<std::str::CharIndices<'a>>;

fn read_string(chars: &mut Chars<'_>, start: usize) -> Result<String, FilterError> {
    let mut value = String::new();
    loop {
        match chars.next() {
            Some((_, '"')) => return Ok(value),
            Some((offset, '\\')) => match chars.next() {
                Some((_, escaped)) => value.push(unescape(escaped, offset)?),
                None => break,
            },
            Some((_, c)) => value.push(c),
            None => break,
        }
    }
    Err(FilterError::syntax(start, "unterminated string literal"))
}

/// Maps the character after a backslash to the one it stands for. Only the
/// escapes [`Operand`](super::ast::Operand) can render back are accepted.
fn unescape(escaped: char, offset: usize) -> Result<char, FilterError> {
    match escaped {
        '"' | '\\' | '\'' => Ok(escaped),
        't' => Ok('\t'),
        'n' => Ok('\n'),
        'r' => Ok('\r'),
        '0' => Ok('\0'),
        other => Err(FilterError::syntax(
            offset,
            format!("unsupported escape sequence `\\{other}`"),
        )),
    }
}

fn read_ident(chars: &mut Chars<'_>, start: usize) -> Result<String, FilterError> {
    let mut ident = String::new();
    loop {
        match chars.peek() {
            Some(&(_, c)) if is_ident_char(c) => {
                ident.push(c);
                chars.next();
            }
            Some(&(_, '[')) => {
                chars.next();
                ident.push('[');
                read_indexer(chars, &mut ident, start)?;
            }
            _ => return Ok(ident),
        }
    }
}

/// Copies an indexer body up to and including the closing `]`, keeping quoted
/// keys verbatim (escapes included) so the identifier re-emits unchanged.
fn read_indexer(
    chars: &mut Chars<'_>,
    ident: &mut String,
    start: usize,
) -> Result<(), FilterError> {
    let mut in_string = false;
    while let Some((_, c)) = chars.next() {
        ident.push(c);
        match c {
            '\\' if in_string => {
                if let Some((_, escaped)) = chars.next() {
                    ident.push(escaped);
                }
            }
            '"' => in_string = !in_string,
            ']' if !in_string => return Ok(()),
            _ => {}
        }
    }
    Err(FilterError::syntax(start, "unterminated indexer"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn comparison_with_quoted_value() {
        assert_eq!(
            kinds(r#"status != "FAILED""#),
            vec![
                TokenKind::Ident("status".into()),
                TokenKind::Compare(CompareOp::NotEquals),
                TokenKind::Str("FAILED".into()),
            ]
        );
    }

    #[test]
    fn connectives_and_grouping() {
        assert_eq!(
            kinds(r#"(a = "1" || b == "2") && !c"#),
            vec![
                TokenKind::LParen,
                TokenKind::Ident("a".into()),
                TokenKind::Compare(CompareOp::Equals),
                TokenKind::Str("1".into()),
                TokenKind::Or,
                TokenKind::Ident("b".into()),
                TokenKind::Compare(CompareOp::DoubleEquals),
                TokenKind::Str("2".into()),
                TokenKind::RParen,
                TokenKind::And,
                TokenKind::Not,
                TokenKind::Ident("c".into()),
            ]
        );
    }

    #[test]
    fn relational_operators() {
        assert_eq!(
            kinds("a<=1 b>=2 c<3 d>4"),
            vec![
                TokenKind::Ident("a".into()),
                TokenKind::Compare(CompareOp::LessOrEqual),
                TokenKind::Ident("1".into()),
                TokenKind::Ident("b".into()),
                TokenKind::Compare(CompareOp::GreaterOrEqual),
                TokenKind::Ident("2".into()),
                TokenKind::Ident("c".into()),
                TokenKind::Compare(CompareOp::Less),
                TokenKind::Ident("3".into()),
                TokenKind::Ident("d".into()),
                TokenKind::Compare(CompareOp::Greater),
                TokenKind::Ident("4".into()),
            ]
        );
    }

    #[test]
    fn escaped_quotes_are_unescaped() {
        assert_eq!(
            kinds(r#"name = "say \"hi\"""#)[2],
            TokenKind::Str(r#"say "hi""#.into())
        );
    }

    #[test]
    fn control_escapes_are_decoded() {
        assert_eq!(
            kinds(r#"name = "a\tb\nc\rd\0""#)[2],
            TokenKind::Str("a\tb\nc\rd\0".into())
        );
        assert_eq!(kinds(r#"name = "it\'s""#)[2], TokenKind::Str("it's".into()));
    }

    #[test]
    fn rejects_unknown_escape() {
        let err = tokenize(r#"name = "a\qb""#).unwrap_err();
        assert!(matches!(err, FilterError::Syntax { offset: 9, .. }));
    }

    #[test]
    fn indexer_stays_inside_identifier() {
        assert_eq!(
            kinds(r#"properties["a.b]"].Contains("x")"#),
            vec![
                TokenKind::Ident(r#"properties["a.b]"].Contains"#.into()),
                TokenKind::LParen,
                TokenKind::Str("x".into()),
                TokenKind::RParen,
            ]
        );
    }

    #[test]
    fn rejects_lambda_arrow() {
        let err = tokenize("keywords.Any(k => k = \"a\")").unwrap_err();
        assert!(matches!(err, FilterError::Syntax { .. }));
    }

    #[test]
    fn rejects_unterminated_string() {
        assert!(tokenize(r#"name = "open"#).is_err());
    }

    #[test]
    fn rejects_single_ampersand() {
        assert!(tokenize(r#"a = "1" & b = "2""#).is_err());
    }
}
