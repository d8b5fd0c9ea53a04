//! On-demand metric extraction for search queries
//!
//! Given an aggregate expression (`"p75(measurements.fp)"`) and a filter
//! query (`"release:foo transaction.duration:>1s"`), decides whether the
//! pair can be answered from the pre-aggregated standard-metrics store and,
//! when it cannot, compiles the query into the boolean condition tree the
//! extraction pipeline evaluates against raw events.
//!
//! ## Quick Start
//!
//! ```
//! use ondemand::{Dataset, FieldCatalog, OnDemandMetricSpec, should_use_on_demand_metrics};
//!
//! let catalog = FieldCatalog::new();
//!
//! let on_demand = should_use_on_demand_metrics(
//!     &catalog,
//!     Dataset::PerformanceMetrics,
//!     "count()",
//!     "transaction.duration:>1s",
//! )?;
//! assert!(on_demand);
//!
//! let spec = OnDemandMetricSpec::new(&catalog, "count()", "transaction.duration:>1s")?;
//! assert_eq!(spec.metric_type.as_str(), "c");
//! assert!(spec.condition().is_some());
//! # Ok::<(), ondemand::ExtractionError>(())
//! ```
//!
//! All operations are synchronous and pure; the [`FieldCatalog`] is built
//! once and shared read-only, so concurrent callers need no coordination.

mod aggregate;
mod ast;
mod compile;
mod extraction;
mod fields;
mod normalize;
mod parse;

use thiserror::Error;

// ============ Primary Public API ============

pub use extraction::{
    Dataset, OnDemandMetricSpec, should_use_on_demand_metrics, to_standard_metrics_query,
};
pub use fields::{FieldCatalog, FieldEntry, ResolvedField, ValueType};

// ============ Errors ============

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("query error: {0}")]
    Query(#[from] QueryError),
    #[error("compile error: {0}")]
    Compile(#[from] CompileError),
    #[error("aggregate {0:?} cannot be extracted on demand")]
    UnsupportedAggregate(String),
}

pub use compile::CompileError;
pub use parse::QueryError;

// ============ Token Trees & Conditions ============

pub use aggregate::{
    MetricOp, MetricType, ResolvedAggregate, SupportedBy, aggregate_support,
    resolve as resolve_aggregate,
};
pub use ast::{BooleanOp, QueryToken, SearchFilter, SearchOp, SearchValue};
pub use compile::{CompareOp, Condition, ConditionValue, compile, conjoin};
pub use normalize::{normalize, to_query_string};
pub use parse::parse_query;
