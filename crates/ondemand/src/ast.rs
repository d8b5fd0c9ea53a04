//! Token-tree types for the search-query grammar
//!
//! The tokenizer produces a flat sequence of tokens per nesting level:
//! filters, bare boolean operators, and parenthesized groups. AND/OR
//! precedence is not encoded here; it is applied when the tree is compiled
//! into a condition tree. Adjacency of two filters means an implicit AND.

/// A single token in a tokenized search query.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryToken {
    /// A `field:value` comparison.
    Filter(SearchFilter),
    /// A filter whose key is itself an aggregate expression, e.g.
    /// `p75(transaction.duration):>0`. These cannot be evaluated per event
    /// and make a query ineligible for on-demand extraction.
    AggregateFilter(SearchFilter),
    /// A bare `AND` / `OR` between adjacent tokens.
    Bool(BooleanOp),
    /// A parenthesized group.
    Paren(Vec<QueryToken>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BooleanOp {
    And,
    Or,
}

/// One `field <op> value` comparison from the query.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchFilter {
    pub key: String,
    pub op: SearchOp,
    pub value: SearchValue,
    /// `!field:value`
    pub negated: bool,
}

/// Comparison operator as written in the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOp {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
}

/// Right-hand side of a filter. Values stay raw strings until the compiler
/// coerces them against the field's declared type.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchValue {
    Scalar(String),
    List(Vec<String>),
}

impl SearchValue {
    /// Whether the value is a scalar containing a `*` wildcard.
    pub fn is_wildcard(&self) -> bool {
        matches!(self, SearchValue::Scalar(s) if s.contains('*'))
    }
}
