//! On-demand metric extraction: eligibility, the compiled metric record,
//! and the standard-metrics fallback query.

use serde::Serialize;

use crate::ExtractionError;
use crate::aggregate::{self, MetricOp, MetricType, SupportedBy};
use crate::ast::QueryToken;
use crate::compile::{self, Condition};
use crate::fields::FieldCatalog;
use crate::normalize;
use crate::parse::{self, QueryError};

/// Source dataset of the request. Only performance metrics support
/// on-demand extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dataset {
    PerformanceMetrics,
    Transactions,
    Events,
}

/// Whether serving `aggregate` filtered by `query` requires on-demand
/// extraction.
///
/// `false` means either the standard store can serve the pair outright, or
/// the aggregate cannot be extracted on demand at all (e.g.
/// `failure_rate()`), in which case there is nothing to compile and the
/// caller falls back to raw events. The unsupported-aggregate check is
/// terminal and precedes query inspection.
pub fn should_use_on_demand_metrics(
    catalog: &FieldCatalog,
    dataset: Dataset,
    aggregate: &str,
    query: &str,
) -> Result<bool, QueryError> {
    if dataset != Dataset::PerformanceMetrics {
        return Ok(false);
    }
    let by_aggregate = aggregate::aggregate_support(catalog, aggregate);
    if !by_aggregate.on_demand {
        return Ok(false);
    }
    let tokens = parse::parse_query(query)?;
    let supported = by_aggregate.combine(query_support(catalog, &tokens));
    if !supported.on_demand {
        log::debug!("query cannot be served on demand: {query:?}");
    }
    Ok(!supported.standard_metrics && supported.on_demand)
}

fn query_support(catalog: &FieldCatalog, tokens: &[QueryToken]) -> SupportedBy {
    tokens.iter().fold(SupportedBy::both(), |acc, token| {
        acc.combine(token_support(catalog, token))
    })
}

fn token_support(catalog: &FieldCatalog, token: &QueryToken) -> SupportedBy {
    match token {
        QueryToken::Bool(_) => SupportedBy::both(),
        QueryToken::Paren(children) => query_support(catalog, children),
        QueryToken::Filter(filter) => match catalog.map_field(&filter.key) {
            // Ignored fields constrain neither backend.
            Some(field) if field.ignored => SupportedBy::both(),
            Some(field) => SupportedBy {
                standard_metrics: field.standard_metrics,
                on_demand: true,
            },
            None => SupportedBy::neither(),
        },
        QueryToken::AggregateFilter(_) => SupportedBy::neither(),
    }
}

/// A compiled on-demand metric: what to extract (metric type, reducer,
/// target field) and the per-event condition gating extraction.
#[derive(Debug, Clone, Serialize)]
pub struct OnDemandMetricSpec {
    pub metric_type: MetricType,
    pub op: MetricOp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    condition: Option<Condition>,
}

impl OnDemandMetricSpec {
    /// Compile an (aggregate, query) pair into an extraction record.
    ///
    /// Callers classify the pair with [`should_use_on_demand_metrics`]
    /// first; aggregates that cannot be extracted are rejected here rather
    /// than compiled into something wrong.
    pub fn new(
        catalog: &FieldCatalog,
        aggregate: &str,
        query: &str,
    ) -> Result<Self, ExtractionError> {
        let resolved = aggregate::resolve(catalog, aggregate)?
            .ok_or_else(|| ExtractionError::UnsupportedAggregate(aggregate.to_string()))?;
        let tokens = parse::parse_query(query)?;
        let query_condition = compile::compile(catalog, &tokens)?;
        let condition = compile::conjoin(query_condition, resolved.condition);
        Ok(Self {
            metric_type: resolved.metric_type,
            op: resolved.op,
            field: resolved.field,
            condition,
        })
    }

    /// The compiled condition, if the query (plus any `count_if` argument)
    /// filters at all. `None` means every event contributes.
    pub fn condition(&self) -> Option<&Condition> {
        self.condition.as_ref()
    }
}

/// Strip filters the standard store cannot serve and render the remainder,
/// producing a reduced fallback query for the standard-metrics path.
pub fn to_standard_metrics_query(
    catalog: &FieldCatalog,
    query: &str,
) -> Result<String, QueryError> {
    let tokens = parse::parse_query(query)?;
    let kept = normalize::normalize(retain_standard(catalog, tokens));
    Ok(normalize::to_query_string(&kept))
}

fn retain_standard(catalog: &FieldCatalog, tokens: Vec<QueryToken>) -> Vec<QueryToken> {
    tokens
        .into_iter()
        .filter_map(|token| match token {
            QueryToken::Paren(children) => {
                Some(QueryToken::Paren(retain_standard(catalog, children)))
            }
            QueryToken::Bool(_) => Some(token),
            QueryToken::Filter(ref filter) => match catalog.map_field(&filter.key) {
                Some(field) if field.standard_metrics || field.ignored => Some(token),
                _ => None,
            },
            QueryToken::AggregateFilter(_) => None,
        })
        .collect()
}
