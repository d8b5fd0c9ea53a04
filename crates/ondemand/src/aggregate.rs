//! Aggregate-expression resolver
//!
//! Parses expressions like `count()`, `p75(measurements.fp)` or
//! `count_if(transaction.duration,equals,300)` into a metric type, reducer
//! op, optional target field, and (for `count_if`) an embedded condition.
//! Unknown or unsupported functions are a normal negative classification,
//! not an error.

use std::fmt;

use serde::ser::{Serialize, Serializer};

use crate::compile::{self, CompileError, Condition};
use crate::fields::FieldCatalog;

/// Metric kind recorded by the extraction pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    Counter,
    Distribution,
    Set,
    Gauge,
}

impl MetricType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "c",
            MetricType::Distribution => "d",
            MetricType::Set => "s",
            MetricType::Gauge => "g",
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for MetricType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Reducer applied to extracted values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricOp {
    Sum,
    Avg,
    P50,
    P75,
    P90,
    P95,
    P99,
    CountUnique,
}

impl MetricOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricOp::Sum => "sum",
            MetricOp::Avg => "avg",
            MetricOp::P50 => "p50",
            MetricOp::P75 => "p75",
            MetricOp::P90 => "p90",
            MetricOp::P95 => "p95",
            MetricOp::P99 => "p99",
            MetricOp::CountUnique => "count_unique",
        }
    }
}

impl fmt::Display for MetricOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for MetricOp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// A supported aggregate, fully resolved against the field catalog.
#[derive(Debug, Clone)]
pub struct ResolvedAggregate {
    pub metric_type: MetricType,
    pub op: MetricOp,
    /// Canonical target field (percentiles and averages).
    pub field: Option<String>,
    /// Condition embedded in the aggregate itself (`count_if`).
    pub condition: Option<Condition>,
}

/// Which backends can serve a given aggregate or query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupportedBy {
    pub standard_metrics: bool,
    pub on_demand: bool,
}

impl SupportedBy {
    pub fn both() -> Self {
        Self {
            standard_metrics: true,
            on_demand: true,
        }
    }

    pub fn neither() -> Self {
        Self {
            standard_metrics: false,
            on_demand: false,
        }
    }

    pub fn combine(self, other: Self) -> Self {
        Self {
            standard_metrics: self.standard_metrics && other.standard_metrics,
            on_demand: self.on_demand && other.on_demand,
        }
    }
}

/// Functions the on-demand pipeline can extract, with their default reducer.
fn on_demand_function(name: &str) -> Option<(MetricType, MetricOp)> {
    match name {
        "count" | "count_if" => Some((MetricType::Counter, MetricOp::Sum)),
        "avg" => Some((MetricType::Distribution, MetricOp::Avg)),
        "p50" => Some((MetricType::Distribution, MetricOp::P50)),
        "p75" => Some((MetricType::Distribution, MetricOp::P75)),
        "p90" => Some((MetricType::Distribution, MetricOp::P90)),
        "p95" => Some((MetricType::Distribution, MetricOp::P95)),
        "p99" => Some((MetricType::Distribution, MetricOp::P99)),
        _ => None,
    }
}

fn arity_ok(name: &str, args: &[&str]) -> bool {
    match name {
        "count" => args.is_empty(),
        "count_if" => args.len() == 3,
        _ => args.len() == 1,
    }
}

/// Classify which backends can serve the aggregate. Never fails: anything
/// unparseable is simply not extractable on demand, while the standard
/// store may still serve it (e.g. `failure_rate()`).
pub fn aggregate_support(catalog: &FieldCatalog, aggregate: &str) -> SupportedBy {
    let aggregate = aggregate.trim();
    if aggregate.starts_with("equation|") {
        return SupportedBy::neither();
    }
    let Some((name, args)) = split_function(aggregate) else {
        return SupportedBy::neither();
    };
    if on_demand_function(name).is_none() || !arity_ok(name, &args) {
        // Still a real function; the standard store serves it only when
        // every argument is a field it knows.
        let standard = args
            .iter()
            .all(|&arg| standard_aggregate_argument(catalog, arg));
        return SupportedBy {
            standard_metrics: standard,
            on_demand: false,
        };
    }
    let (standard, on_demand) = match args.first() {
        // The target/condition field decides both axes.
        Some(&field) => (
            catalog.aggregatable_by_standard_metrics(field),
            catalog.map_field(field).is_some(),
        ),
        None => (true, true),
    };
    SupportedBy {
        standard_metrics: standard,
        on_demand,
    }
}

/// Resolve an aggregate expression. `Ok(None)` means the aggregate is not
/// extractable on demand (a valid negative); errors are reserved for
/// literals that fail coercion inside `count_if`.
pub fn resolve(
    catalog: &FieldCatalog,
    aggregate: &str,
) -> Result<Option<ResolvedAggregate>, CompileError> {
    let aggregate = aggregate.trim();
    if aggregate.starts_with("equation|") {
        return Ok(None);
    }
    let Some((name, args)) = split_function(aggregate) else {
        return Ok(None);
    };
    let Some((metric_type, op)) = on_demand_function(name) else {
        return Ok(None);
    };
    if !arity_ok(name, &args) {
        return Ok(None);
    }

    if name == "count_if" {
        let Some(condition) = compile::count_if_condition(catalog, args[0], args[1], args[2])?
        else {
            return Ok(None);
        };
        return Ok(Some(ResolvedAggregate {
            metric_type,
            op,
            field: None,
            condition: Some(condition),
        }));
    }

    let field = match args.first() {
        Some(&arg) => {
            let Some(resolved) = catalog.map_field(arg) else {
                return Ok(None);
            };
            Some(resolved.name)
        }
        None => None,
    };
    Ok(Some(ResolvedAggregate {
        metric_type,
        op,
        field,
        condition: None,
    }))
}

fn standard_aggregate_argument(catalog: &FieldCatalog, arg: &str) -> bool {
    catalog.aggregatable_by_standard_metrics(arg)
        || catalog.resolve(arg).is_some_and(|entry| entry.standard_metrics)
}

/// Split `name(arg, arg, ...)` into its parts. `None` when the expression is
/// not a simple function call (bare columns, equations, nested calls).
fn split_function(expr: &str) -> Option<(&str, Vec<&str>)> {
    let open = expr.find('(')?;
    if !expr.ends_with(')') {
        return None;
    }
    let name = &expr[..open];
    let inner = &expr[open + 1..expr.len() - 1];
    if name.is_empty() || !is_function_name(name) || inner.contains('(') {
        return None;
    }
    let args = if inner.trim().is_empty() {
        Vec::new()
    } else {
        inner.split(',').map(str::trim).collect()
    };
    Some((name, args))
}

fn is_function_name(name: &str) -> bool {
    name.chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::{CompareOp, ConditionValue};

    fn catalog() -> FieldCatalog {
        FieldCatalog::new()
    }

    #[test]
    fn count_resolves_to_counter_sum() {
        let resolved = resolve(&catalog(), "count()").unwrap().unwrap();
        assert_eq!(resolved.metric_type, MetricType::Counter);
        assert_eq!(resolved.op, MetricOp::Sum);
        assert_eq!(resolved.field, None);
        assert_eq!(resolved.condition, None);
    }

    #[test]
    fn percentiles_resolve_with_canonical_field() {
        let resolved = resolve(&catalog(), "p75(measurements.fp)").unwrap().unwrap();
        assert_eq!(resolved.metric_type, MetricType::Distribution);
        assert_eq!(resolved.op, MetricOp::P75);
        assert_eq!(resolved.field.as_deref(), Some("event.measurements.fp"));

        let resolved = resolve(&catalog(), "p95(transaction.duration)").unwrap().unwrap();
        assert_eq!(resolved.field.as_deref(), Some("event.duration"));
    }

    #[test]
    fn count_if_embeds_a_condition() {
        let resolved = resolve(&catalog(), "count_if(transaction.duration,equals,300)")
            .unwrap()
            .unwrap();
        assert_eq!(resolved.metric_type, MetricType::Counter);
        assert_eq!(resolved.op, MetricOp::Sum);
        assert_eq!(resolved.field, None);
        assert_eq!(
            resolved.condition,
            Some(Condition::Compare {
                name: "event.duration".into(),
                op: CompareOp::Eq,
                value: ConditionValue::Number(300.0),
            })
        );
    }

    #[test]
    fn count_if_not_equals_wraps_in_not() {
        let resolved = resolve(&catalog(), "count_if(transaction.duration,notEquals,300)")
            .unwrap()
            .unwrap();
        assert!(matches!(resolved.condition, Some(Condition::Not(_))));
    }

    #[test]
    fn unsupported_functions_are_a_negative_not_an_error() {
        for expr in [
            "failure_rate()",
            "count_unique(user)",
            "last_seen()",
            "any(user)",
            "message",
            "equation| count() / count()",
            "count_web_vitals(measurements.fcp,any)",
            "p75()",
            "count(user)",
            "count_if(transaction.duration,matches,300)",
        ] {
            assert!(resolve(&catalog(), expr).unwrap().is_none(), "expr: {expr}");
        }
    }

    #[test]
    fn support_classification() {
        let catalog = catalog();
        // Standard can serve these outright.
        for expr in [
            "count()",
            "p75(transaction.duration)",
            "p95(measurements.lcp)",
            "avg(spans.http)",
            "count_if(transaction.duration,equals,0)",
        ] {
            let by = aggregate_support(&catalog, expr);
            assert!(by.standard_metrics && by.on_demand, "expr: {expr}");
        }
        // On demand only.
        let by = aggregate_support(&catalog, "p75(custom_delay)");
        assert!(!by.standard_metrics && by.on_demand);
        // Not extractable at all.
        for expr in ["failure_rate()", "equation| count() / count()", "message"] {
            assert!(!aggregate_support(&catalog, expr).on_demand, "expr: {expr}");
        }
        // Argument-less functions stay standard-servable; a non-standard
        // argument makes the whole function non-standard.
        assert!(aggregate_support(&catalog, "failure_rate()").standard_metrics);
        assert_eq!(
            aggregate_support(&catalog, "count_unique(geo.city)"),
            SupportedBy::neither()
        );
        assert_eq!(
            aggregate_support(&catalog, "count_unique(environment)"),
            SupportedBy {
                standard_metrics: true,
                on_demand: false,
            }
        );
    }
}
