//! Canonicalization and rendering of query token trees
//!
//! `normalize` strips tokens that no longer carry meaning — stray boolean
//! operators, empty groups, redundant parentheses — so that a query that had
//! filters removed still parses and compiles. `to_query_string` renders a
//! tree back to query text; for a normalized tree the render re-tokenizes to
//! a structurally equal tree.

use std::fmt;

use crate::ast::{BooleanOp, QueryToken, SearchFilter, SearchOp, SearchValue};

/// Rewrite a token tree into canonical minimal form. Idempotent.
///
/// Bottom-up: group children are normalized first; emptied groups are
/// dropped and single-child groups collapse to the child. A run of adjacent
/// boolean operators collapses to its last operator, and operators cannot
/// lead or trail a sequence. Relative order of surviving filters is
/// preserved.
pub fn normalize(tokens: Vec<QueryToken>) -> Vec<QueryToken> {
    let mut out: Vec<QueryToken> = Vec::with_capacity(tokens.len());
    for token in tokens {
        let token = match token {
            QueryToken::Paren(children) => {
                let mut children = normalize(children);
                match children.len() {
                    0 => continue,
                    1 => children.remove(0),
                    _ => QueryToken::Paren(children),
                }
            }
            other => other,
        };
        if matches!(token, QueryToken::Bool(_)) && matches!(out.last(), Some(QueryToken::Bool(_)))
        {
            out.pop();
        }
        out.push(token);
    }
    while matches!(out.first(), Some(QueryToken::Bool(_))) {
        out.remove(0);
    }
    while matches!(out.last(), Some(QueryToken::Bool(_))) {
        out.pop();
    }
    out
}

/// Render a token tree back to query text.
pub fn to_query_string(tokens: &[QueryToken]) -> String {
    tokens
        .iter()
        .map(|token| token.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

impl fmt::Display for QueryToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryToken::Filter(filter) | QueryToken::AggregateFilter(filter) => {
                write!(f, "{filter}")
            }
            QueryToken::Bool(BooleanOp::And) => write!(f, "AND"),
            QueryToken::Bool(BooleanOp::Or) => write!(f, "OR"),
            QueryToken::Paren(children) => write!(f, "({})", to_query_string(children)),
        }
    }
}

impl fmt::Display for SearchFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            write!(f, "!")?;
        }
        let op = match self.op {
            SearchOp::Eq => "",
            SearchOp::Gt => ">",
            SearchOp::Gte => ">=",
            SearchOp::Lt => "<",
            SearchOp::Lte => "<=",
        };
        write!(f, "{}:{}{}", self.key, op, self.value)
    }
}

impl fmt::Display for SearchValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchValue::Scalar(raw) => write_scalar(f, raw),
            SearchValue::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write_scalar(f, item)?;
                }
                write!(f, "]")
            }
        }
    }
}

fn write_scalar(f: &mut fmt::Formatter<'_>, raw: &str) -> fmt::Result {
    if needs_quotes(raw) {
        write!(
            f,
            "\"{}\"",
            raw.replace('\\', "\\\\").replace('"', "\\\"")
        )
    } else {
        write!(f, "{raw}")
    }
}

fn needs_quotes(raw: &str) -> bool {
    raw.is_empty()
        // A leading comparison would re-tokenize as an operator.
        || raw.starts_with('<')
        || raw.starts_with('>')
        || raw
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '(' | ')' | '[' | ']' | '"' | ','))
}
