//! Tokenizer for the search-query grammar
//!
//! Turns query text like `release:a OR (transaction.op:b transaction.duration:>1s)`
//! into a flat [`QueryToken`] sequence per nesting level. Free text (a bare
//! word without `:`) is rejected; only field filters, boolean operators and
//! groups are meaningful to the condition compiler.

use winnow::ascii::multispace0;
use winnow::combinator::{alt, delimited, opt, preceded, repeat, separated};
use winnow::prelude::*;
use winnow::token::take_while;

use crate::ast::{BooleanOp, QueryToken, SearchFilter, SearchOp, SearchValue};

type PResult<T> = winnow::ModalResult<T>;

/// Malformed query text.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryError {
    pub message: String,
    pub offset: usize,
}

impl std::fmt::Display for QueryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (offset {})", self.message, self.offset)
    }
}

impl std::error::Error for QueryError {}

/// Tokenize a search query. The empty query is a valid empty token sequence.
pub fn parse_query(input: &str) -> Result<Vec<QueryToken>, QueryError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let mut stream = trimmed;
    match tokens.parse_next(&mut stream) {
        Ok(parsed) => {
            if stream.trim().is_empty() {
                Ok(parsed)
            } else {
                Err(QueryError {
                    message: format!("unexpected input {:?}", stream.trim()),
                    offset: trimmed.len() - stream.len(),
                })
            }
        }
        Err(e) => Err(QueryError {
            message: format!("{e:?}"),
            offset: trimmed.len().saturating_sub(stream.len()),
        }),
    }
}

fn tokens(input: &mut &str) -> PResult<Vec<QueryToken>> {
    repeat(0.., preceded(ws, token)).parse_next(input)
}

fn token(input: &mut &str) -> PResult<QueryToken> {
    alt((paren, filter_or_bool)).parse_next(input)
}

fn paren(input: &mut &str) -> PResult<QueryToken> {
    delimited('(', tokens, (ws, ')'))
        .map(QueryToken::Paren)
        .parse_next(input)
}

/// Parse a filter, or a bare boolean operator if the word is not followed
/// by a comparison.
fn filter_or_bool(input: &mut &str) -> PResult<QueryToken> {
    let negated = opt('!').parse_next(input)?.is_some();
    let key = key_ident.parse_next(input)?;

    // A key of the form `name(args)` is an aggregate filter.
    let agg_args: Option<&str> =
        opt(delimited('(', take_while(0.., |c: char| c != ')'), ')')).parse_next(input)?;
    if let Some(args) = agg_args {
        let _ = ':'.parse_next(input)?;
        let (op, value) = op_value.parse_next(input)?;
        return Ok(QueryToken::AggregateFilter(SearchFilter {
            key: format!("{key}({args})"),
            op,
            value,
            negated,
        }));
    }

    if opt(':').parse_next(input)?.is_some() {
        let (op, value) = op_value.parse_next(input)?;
        return Ok(QueryToken::Filter(SearchFilter {
            key: key.to_string(),
            op,
            value,
            negated,
        }));
    }

    if !negated && key.eq_ignore_ascii_case("and") {
        Ok(QueryToken::Bool(BooleanOp::And))
    } else if !negated && key.eq_ignore_ascii_case("or") {
        Ok(QueryToken::Bool(BooleanOp::Or))
    } else {
        // Free-text search terms are not supported here.
        Err(winnow::error::ErrMode::Backtrack(
            winnow::error::ContextError::new(),
        ))
    }
}

fn key_ident<'a>(input: &mut &'a str) -> PResult<&'a str> {
    take_while(1.., |c: char| {
        c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')
    })
    .parse_next(input)
}

fn op_value(input: &mut &str) -> PResult<(SearchOp, SearchValue)> {
    let op = opt(alt((
        ">=".value(SearchOp::Gte),
        "<=".value(SearchOp::Lte),
        '>'.value(SearchOp::Gt),
        '<'.value(SearchOp::Lt),
    )))
    .parse_next(input)?
    .unwrap_or(SearchOp::Eq);
    let value = search_value.parse_next(input)?;
    Ok((op, value))
}

fn search_value(input: &mut &str) -> PResult<SearchValue> {
    alt((
        list_value,
        quoted_value.map(SearchValue::Scalar),
        bare_value.map(|s: &str| SearchValue::Scalar(s.to_string())),
    ))
    .parse_next(input)
}

fn list_value(input: &mut &str) -> PResult<SearchValue> {
    let items: Vec<String> = delimited(
        ('[', ws),
        separated(0.., list_item, (ws, ',', ws)),
        (ws, ']'),
    )
    .parse_next(input)?;
    Ok(SearchValue::List(items))
}

fn list_item(input: &mut &str) -> PResult<String> {
    alt((
        quoted_value,
        take_while(1.., |c: char| {
            !c.is_whitespace() && !matches!(c, ',' | '[' | ']')
        })
        .map(str::to_string),
    ))
    .parse_next(input)
}

fn bare_value<'a>(input: &mut &'a str) -> PResult<&'a str> {
    take_while(1.., |c: char| {
        !c.is_whitespace() && !matches!(c, '(' | ')' | '[' | ']' | '"')
    })
    .parse_next(input)
}

fn quoted_value(input: &mut &str) -> PResult<String> {
    delimited('"', quoted_contents, '"').parse_next(input)
}

fn quoted_contents(input: &mut &str) -> PResult<String> {
    let mut result = String::new();
    loop {
        let Some(c) = input.chars().next() else {
            return Err(winnow::error::ErrMode::Backtrack(
                winnow::error::ContextError::new(),
            ));
        };
        if c == '"' {
            break;
        } else if c == '\\' {
            *input = &input[1..];
            let Some(escaped) = input.chars().next() else {
                return Err(winnow::error::ErrMode::Backtrack(
                    winnow::error::ContextError::new(),
                ));
            };
            result.push(escaped);
            *input = &input[escaped.len_utf8()..];
        } else {
            result.push(c);
            *input = &input[c.len_utf8()..];
        }
    }
    Ok(result)
}

fn ws(input: &mut &str) -> PResult<()> {
    multispace0.void().parse_next(input)
}

// ============ Sanity Tests ============
// Table-driven coverage lives in tests/integration.rs
