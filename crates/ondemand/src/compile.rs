//! Compiles a normalized token tree into a boolean condition tree
//!
//! The output is the document the extraction engine evaluates per event:
//! typed leaf comparisons joined by `and`/`or`/`not`. AND binds tighter than
//! OR, and adjacency of two filters is an implicit AND. Filters on ignored
//! fields are stripped before conversion, so a fully-ignored query compiles
//! to no condition at all ("aggregate over every event").

use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use thiserror::Error;

use crate::ast::{BooleanOp, QueryToken, SearchFilter, SearchOp, SearchValue};
use crate::fields::{FieldCatalog, ResolvedField, ValueType};
use crate::normalize;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error("operator {op} cannot be applied to {field}")]
    OperatorTypeMismatch { field: String, op: &'static str },

    #[error("cannot interpret {value:?} as a value for {field}")]
    InvalidLiteral { field: String, value: String },

    #[error("field {0:?} cannot be evaluated against events")]
    UnsupportedField(String),

    #[error("query structure cannot be compiled")]
    Malformed,
}

/// Comparison operator understood by the extraction engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
    Glob,
}

impl CompareOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompareOp::Eq => "eq",
            CompareOp::Gt => "gt",
            CompareOp::Gte => "gte",
            CompareOp::Lt => "lt",
            CompareOp::Lte => "lte",
            CompareOp::Glob => "glob",
        }
    }
}

/// A coerced comparison value: scalar or list of scalars.
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionValue {
    Text(String),
    Number(f64),
    List(Vec<ConditionValue>),
}

impl Serialize for ConditionValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ConditionValue::Text(s) => serializer.serialize_str(s),
            ConditionValue::Number(n) => serializer.serialize_f64(*n),
            ConditionValue::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
        }
    }
}

/// The compiled boolean condition tree. Immutable once built.
///
/// Serializes to the exact wire shapes the extraction engine expects:
/// `{"name", "op", "value"}` leaves, `{"op": "not", "inner": <node>}`, and
/// `{"op": "and"|"or", "inner": [<node>, ...]}`.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Compare {
        name: String,
        op: CompareOp,
        value: ConditionValue,
    },
    Not(Box<Condition>),
    And(Vec<Condition>),
    Or(Vec<Condition>),
}

impl Serialize for Condition {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Condition::Compare { name, op, value } => {
                let mut map = serializer.serialize_map(Some(3))?;
                map.serialize_entry("name", name)?;
                map.serialize_entry("op", op.as_str())?;
                map.serialize_entry("value", value)?;
                map.end()
            }
            Condition::Not(inner) => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("op", "not")?;
                map.serialize_entry("inner", inner)?;
                map.end()
            }
            Condition::And(inner) => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("op", "and")?;
                map.serialize_entry("inner", inner)?;
                map.end()
            }
            Condition::Or(inner) => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("op", "or")?;
                map.serialize_entry("inner", inner)?;
                map.end()
            }
        }
    }
}

/// Compile a token tree into a condition tree.
///
/// Ignored-field filters are stripped and the remainder normalized first; an
/// emptied query compiles to `Ok(None)`.
pub fn compile(
    catalog: &FieldCatalog,
    tokens: &[QueryToken],
) -> Result<Option<Condition>, CompileError> {
    let tokens = normalize::normalize(strip_ignored(catalog, tokens));
    if tokens.is_empty() {
        return Ok(None);
    }
    let mut cursor = Cursor {
        catalog,
        tokens: &tokens,
        pos: 0,
    };
    let condition = cursor.expression()?;
    debug_assert_eq!(cursor.pos, tokens.len());
    Ok(Some(condition))
}

/// Conjoin the query-derived condition with an aggregate's embedded
/// condition (`count_if`). Absent sides collapse away.
pub fn conjoin(query: Option<Condition>, embedded: Option<Condition>) -> Option<Condition> {
    match (query, embedded) {
        (Some(q), Some(e)) => Some(Condition::And(vec![q, e])),
        (q, e) => q.or(e),
    }
}

fn strip_ignored(catalog: &FieldCatalog, tokens: &[QueryToken]) -> Vec<QueryToken> {
    tokens
        .iter()
        .filter_map(|token| match token {
            QueryToken::Filter(f) => match catalog.map_field(&f.key) {
                Some(field) if field.ignored => None,
                _ => Some(token.clone()),
            },
            QueryToken::Paren(children) => {
                Some(QueryToken::Paren(strip_ignored(catalog, children)))
            }
            _ => Some(token.clone()),
        })
        .collect()
}

/// Recursive-descent cursor over one nesting level of normalized tokens.
///
/// expression := term (OR term)*
/// term       := factor ((AND)? factor)*
/// factor     := filter | group
struct Cursor<'a> {
    catalog: &'a FieldCatalog,
    tokens: &'a [QueryToken],
    pos: usize,
}

impl<'a> Cursor<'a> {
    // Reborrows at the slice's lifetime so match arms holding a token do
    // not pin `self`.
    fn peek(&self) -> Option<&'a QueryToken> {
        self.tokens.get(self.pos)
    }

    fn expression(&mut self) -> Result<Condition, CompileError> {
        let mut terms = vec![self.term()?];
        while matches!(self.peek(), Some(QueryToken::Bool(BooleanOp::Or))) {
            self.pos += 1;
            terms.push(self.term()?);
        }
        if terms.len() == 1 {
            Ok(terms.remove(0))
        } else {
            Ok(Condition::Or(terms))
        }
    }

    fn term(&mut self) -> Result<Condition, CompileError> {
        let mut factors = vec![self.factor()?];
        loop {
            match self.peek() {
                None | Some(QueryToken::Bool(BooleanOp::Or)) => break,
                Some(QueryToken::Bool(BooleanOp::And)) => {
                    self.pos += 1;
                    factors.push(self.factor()?);
                }
                Some(_) => factors.push(self.factor()?),
            }
        }
        if factors.len() == 1 {
            Ok(factors.remove(0))
        } else {
            Ok(Condition::And(factors))
        }
    }

    fn factor(&mut self) -> Result<Condition, CompileError> {
        match self.peek() {
            Some(QueryToken::Paren(children)) => {
                self.pos += 1;
                let mut inner = Cursor {
                    catalog: self.catalog,
                    tokens: children,
                    pos: 0,
                };
                inner.expression()
            }
            Some(QueryToken::Filter(filter)) => {
                self.pos += 1;
                filter_condition(self.catalog, filter)
            }
            Some(QueryToken::AggregateFilter(filter)) => {
                Err(CompileError::UnsupportedField(filter.key.clone()))
            }
            // Normalized input cannot start a factor with an operator.
            Some(QueryToken::Bool(_)) | None => Err(CompileError::Malformed),
        }
    }
}

fn filter_condition(
    catalog: &FieldCatalog,
    filter: &SearchFilter,
) -> Result<Condition, CompileError> {
    let field = catalog
        .map_field(&filter.key)
        .ok_or_else(|| CompileError::UnsupportedField(filter.key.clone()))?;
    let condition = leaf(&field, filter.op, &filter.value)?;
    Ok(if filter.negated {
        Condition::Not(Box::new(condition))
    } else {
        condition
    })
}

/// Build a single comparison leaf, applying operator mapping and value
/// coercion for the field's declared type.
pub(crate) fn leaf(
    field: &ResolvedField,
    op: SearchOp,
    value: &SearchValue,
) -> Result<Condition, CompileError> {
    match value {
        SearchValue::Scalar(raw) if raw.contains('*') => {
            if op != SearchOp::Eq || field.value_type != ValueType::String {
                return Err(CompileError::OperatorTypeMismatch {
                    field: field.name.clone(),
                    op: "glob",
                });
            }
            Ok(Condition::Compare {
                name: field.name.clone(),
                op: CompareOp::Glob,
                value: ConditionValue::List(vec![ConditionValue::Text(raw.clone())]),
            })
        }
        SearchValue::Scalar(raw) => Ok(Condition::Compare {
            name: field.name.clone(),
            op: compare_op(field, op)?,
            value: coerce_scalar(field, raw)?,
        }),
        SearchValue::List(items) => {
            if op != SearchOp::Eq {
                return Err(CompileError::OperatorTypeMismatch {
                    field: field.name.clone(),
                    op: compare_op(field, op)?.as_str(),
                });
            }
            let values = items
                .iter()
                .map(|item| coerce_scalar(field, item))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Condition::Compare {
                name: field.name.clone(),
                op: CompareOp::Eq,
                value: ConditionValue::List(values),
            })
        }
    }
}

fn compare_op(field: &ResolvedField, op: SearchOp) -> Result<CompareOp, CompileError> {
    let mapped = match op {
        SearchOp::Eq => return Ok(CompareOp::Eq),
        SearchOp::Gt => CompareOp::Gt,
        SearchOp::Gte => CompareOp::Gte,
        SearchOp::Lt => CompareOp::Lt,
        SearchOp::Lte => CompareOp::Lte,
    };
    // Ordering comparisons only make sense for numeric fields.
    if !matches!(field.value_type, ValueType::Duration | ValueType::Number) {
        return Err(CompileError::OperatorTypeMismatch {
            field: field.name.clone(),
            op: mapped.as_str(),
        });
    }
    Ok(mapped)
}

fn coerce_scalar(field: &ResolvedField, raw: &str) -> Result<ConditionValue, CompileError> {
    match field.value_type {
        ValueType::String | ValueType::List => Ok(ConditionValue::Text(raw.to_string())),
        ValueType::Number => raw
            .parse::<f64>()
            .map(ConditionValue::Number)
            .map_err(|_| CompileError::InvalidLiteral {
                field: field.name.clone(),
                value: raw.to_string(),
            }),
        ValueType::Duration => {
            parse_duration_ms(raw)
                .map(ConditionValue::Number)
                .ok_or_else(|| CompileError::InvalidLiteral {
                    field: field.name.clone(),
                    value: raw.to_string(),
                })
        }
    }
}

/// Parse a duration literal to milliseconds. A bare number is already in
/// milliseconds.
fn parse_duration_ms(raw: &str) -> Option<f64> {
    let unit_start = raw
        .find(|c: char| c.is_ascii_alphabetic())
        .unwrap_or(raw.len());
    let (number, unit) = raw.split_at(unit_start);
    let scale = match unit {
        "" | "ms" => 1.0,
        "s" => 1_000.0,
        "m" => 60_000.0,
        "h" => 3_600_000.0,
        "d" => 86_400_000.0,
        "w" => 604_800_000.0,
        _ => return None,
    };
    let value: f64 = number.parse().ok()?;
    Some(value * scale)
}

/// Build the condition embedded in a `count_if` aggregate. Returns `Ok(None)`
/// when the triple cannot be extracted (unknown comparison word or a key
/// that is not a per-event field), which classifies the aggregate as
/// unsupported rather than failing.
pub(crate) fn count_if_condition(
    catalog: &FieldCatalog,
    key: &str,
    op: &str,
    raw_value: &str,
) -> Result<Option<Condition>, CompileError> {
    let Some(field) = catalog.map_field(key) else {
        return Ok(None);
    };
    if field.ignored {
        return Ok(None);
    }
    let (op, negated) = match op {
        "equals" => (SearchOp::Eq, false),
        "notEquals" => (SearchOp::Eq, true),
        "greater" => (SearchOp::Gt, false),
        "less" => (SearchOp::Lt, false),
        "greaterOrEquals" => (SearchOp::Gte, false),
        "lessOrEquals" => (SearchOp::Lte, false),
        _ => return Ok(None),
    };
    let condition = leaf(&field, op, &SearchValue::Scalar(raw_value.to_string()))?;
    Ok(Some(if negated {
        Condition::Not(Box::new(condition))
    } else {
        condition
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse_query;

    fn compile_str(query: &str) -> Result<Option<Condition>, CompileError> {
        let catalog = FieldCatalog::new();
        let tokens = parse_query(query).unwrap();
        compile(&catalog, &tokens)
    }

    #[test]
    fn duration_coercion_to_milliseconds() {
        let condition = compile_str("transaction.duration:>1s").unwrap().unwrap();
        assert_eq!(
            condition,
            Condition::Compare {
                name: "event.duration".into(),
                op: CompareOp::Gt,
                value: ConditionValue::Number(1000.0),
            }
        );
    }

    #[test]
    fn duration_units() {
        for (raw, ms) in [
            ("250ms", 250.0),
            ("1.5s", 1500.0),
            ("2m", 120_000.0),
            ("1h", 3_600_000.0),
            ("7", 7.0),
        ] {
            assert_eq!(parse_duration_ms(raw), Some(ms), "literal: {raw}");
        }
        assert_eq!(parse_duration_ms("1y"), None);
        assert_eq!(parse_duration_ms("abc"), None);
    }

    #[test]
    fn groups_and_filters_advance_the_cursor() {
        let condition = compile_str("(release:a OR release:b) transaction.duration:>1s")
            .unwrap()
            .unwrap();
        match condition {
            Condition::And(inner) => {
                assert!(matches!(&inner[0], Condition::Or(terms) if terms.len() == 2));
                assert!(matches!(&inner[1], Condition::Compare { .. }));
            }
            other => panic!("expected and-node, got {other:?}"),
        }
    }

    #[test]
    fn string_field_rejects_ordering() {
        let err = compile_str("release:>1").unwrap_err();
        assert!(matches!(err, CompileError::OperatorTypeMismatch { .. }));
    }

    #[test]
    fn bad_duration_literal_fails_loudly() {
        let err = compile_str("transaction.duration:fast").unwrap_err();
        assert!(matches!(err, CompileError::InvalidLiteral { .. }));
    }

    #[test]
    fn ignored_fields_compile_to_nothing() {
        assert_eq!(compile_str("project:sentry").unwrap(), None);
        assert_eq!(compile_str("project:a event.type:transaction").unwrap(), None);
    }

    #[test]
    fn tag_fallback_compiles_to_tag_leaf() {
        let condition = compile_str("route.action:CloseBatch").unwrap().unwrap();
        assert_eq!(
            condition,
            Condition::Compare {
                name: "event.tags.route.action".into(),
                op: CompareOp::Eq,
                value: ConditionValue::Text("CloseBatch".into()),
            }
        );
    }

    #[test]
    fn conjoin_collapses_absent_sides() {
        let leaf = Condition::Compare {
            name: "event.duration".into(),
            op: CompareOp::Eq,
            value: ConditionValue::Number(1.0),
        };
        assert_eq!(conjoin(None, None), None);
        assert_eq!(conjoin(Some(leaf.clone()), None), Some(leaf.clone()));
        assert_eq!(conjoin(None, Some(leaf.clone())), Some(leaf.clone()));
        assert_eq!(
            conjoin(Some(leaf.clone()), Some(leaf.clone())),
            Some(Condition::And(vec![leaf.clone(), leaf]))
        );
    }
}
