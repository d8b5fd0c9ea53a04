//! Field catalog: query fields and their event-protocol attributes
//!
//! Maps search fields like `transaction.duration` to the attribute path the
//! extraction engine reads (`event.duration`), together with the value type
//! used for coercion and whether the pre-aggregated standard-metrics store
//! can filter by the field. The catalog is built once at startup and shared
//! read-only; every pass takes it by reference.

use indexmap::IndexMap;

/// Declared type of a field's values, driving literal coercion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    String,
    /// Duration literals (`1s`, `300ms`, bare milliseconds), compiled to
    /// millisecond floats.
    Duration,
    Number,
    /// List-valued fields; elements coerce as strings.
    List,
}

/// Catalog row for a known query field.
#[derive(Debug, Clone)]
pub struct FieldEntry {
    /// Event-protocol attribute path, e.g. `event.duration`.
    pub canonical: &'static str,
    pub value_type: ValueType,
    /// Whether the standard-metrics store indexes this field for filtering.
    pub standard_metrics: bool,
    /// Ignored fields participate in eligibility but are dropped from
    /// compiled conditions entirely.
    pub ignored: bool,
}

/// Resolved view of a query field, covering both static catalog entries and
/// the dynamically mapped measurement and custom-tag families.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedField {
    pub name: String,
    pub value_type: ValueType,
    pub standard_metrics: bool,
    pub ignored: bool,
}

pub struct FieldCatalog {
    entries: IndexMap<&'static str, FieldEntry>,
}

impl FieldCatalog {
    pub fn new() -> Self {
        let defs: &[(&'static str, &'static str, ValueType, bool, bool)] = &[
            // (query field, canonical attribute, type, standard, ignored)
            ("release", "event.release", ValueType::String, true, false),
            ("dist", "event.dist", ValueType::String, true, false),
            ("environment", "event.environment", ValueType::String, true, false),
            ("transaction", "event.transaction", ValueType::String, true, false),
            ("platform", "event.platform", ValueType::String, true, false),
            ("transaction.status", "event.contexts.trace.status", ValueType::String, true, false),
            ("transaction.op", "event.contexts.trace.op", ValueType::String, true, false),
            ("http.method", "event.request.method", ValueType::String, true, false),
            ("http.status_code", "event.contexts.response.status_code", ValueType::String, true, false),
            ("browser.name", "event.contexts.browser.name", ValueType::String, true, false),
            ("os.name", "event.contexts.os.name", ValueType::String, true, false),
            ("geo.country_code", "event.user.geo.country_code", ValueType::String, true, false),
            // Scope filters that affect no extraction logic.
            ("project", "event.project", ValueType::String, true, true),
            ("event.type", "event.type", ValueType::String, true, true),
            // Fields only the on-demand path can filter by.
            ("transaction.duration", "event.duration", ValueType::Duration, false, false),
            ("release.build", "event.release.build", ValueType::String, false, false),
            ("release.package", "event.release.package", ValueType::String, false, false),
            ("release.version", "event.release.version.short", ValueType::String, false, false),
            ("geo.city", "event.user.geo.city", ValueType::String, false, false),
            ("geo.region", "event.user.geo.region", ValueType::String, false, false),
            ("user.email", "event.user.email", ValueType::String, false, false),
            ("user.id", "event.user.id", ValueType::String, false, false),
            ("user.ip_address", "event.user.ip_address", ValueType::String, false, false),
            ("user.name", "event.user.name", ValueType::String, false, false),
            ("user.segment", "event.user.segment", ValueType::String, false, false),
            ("os.build", "event.contexts.os.build", ValueType::String, false, false),
            ("os.kernel_version", "event.contexts.os.kernel_version", ValueType::String, false, false),
            ("os.version", "event.contexts.os.version", ValueType::String, false, false),
            ("sdk.name", "event.sdk.name", ValueType::String, false, false),
            ("sdk.version", "event.sdk.version", ValueType::String, false, false),
            ("url", "event.request.url", ValueType::String, false, false),
            ("device", "event.contexts.device.model", ValueType::String, false, false),
            ("device.arch", "event.contexts.device.arch", ValueType::String, false, false),
            ("device.brand", "event.contexts.device.brand", ValueType::String, false, false),
            ("device.family", "event.contexts.device.family", ValueType::String, false, false),
            ("device.name", "event.contexts.device.name", ValueType::String, false, false),
        ];

        let entries = defs
            .iter()
            .map(|&(key, canonical, value_type, standard_metrics, ignored)| {
                (
                    key,
                    FieldEntry {
                        canonical,
                        value_type,
                        standard_metrics,
                        ignored,
                    },
                )
            })
            .collect();
        Self { entries }
    }

    /// Look up a field in the static table. Unknown fields return `None`;
    /// use [`FieldCatalog::map_field`] for the full mapping.
    pub fn resolve(&self, field: &str) -> Option<&FieldEntry> {
        self.entries.get(field)
    }

    /// Resolve a query field to its extraction-engine view.
    ///
    /// Fields missing from the static table still resolve: measurement and
    /// span breakdowns map to numeric `event.<field>` attributes, and any
    /// other well-formed name is treated as a custom tag. `None` means the
    /// name is not a per-event field at all.
    pub fn map_field(&self, field: &str) -> Option<ResolvedField> {
        if let Some(entry) = self.entries.get(field) {
            return Some(ResolvedField {
                name: entry.canonical.to_string(),
                value_type: entry.value_type,
                standard_metrics: entry.standard_metrics,
                ignored: entry.ignored,
            });
        }
        if field.starts_with("measurements.") || field.starts_with("spans.") {
            return Some(ResolvedField {
                name: format!("event.{field}"),
                value_type: ValueType::Number,
                standard_metrics: false,
                ignored: false,
            });
        }
        if is_tag_key(field) {
            return Some(ResolvedField {
                name: format!("event.tags.{field}"),
                value_type: ValueType::String,
                standard_metrics: false,
                ignored: false,
            });
        }
        None
    }

    /// Whether the standard store pre-aggregates a distribution over this
    /// field, making it usable as an aggregate argument without extraction.
    /// This is a different axis than filterability: `p75(transaction.duration)`
    /// is a standard metric while the filter `transaction.duration:>1` is not.
    pub fn aggregatable_by_standard_metrics(&self, field: &str) -> bool {
        field == "transaction.duration"
            || field.starts_with("measurements.")
            || field.starts_with("spans.")
    }
}

impl Default for FieldCatalog {
    fn default() -> Self {
        Self::new()
    }
}

fn is_tag_key(field: &str) -> bool {
    !field.is_empty()
        && field
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-' | ':'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_fields_resolve_to_protocol_paths() {
        let catalog = FieldCatalog::new();
        assert_eq!(
            catalog.resolve("transaction.duration").unwrap().canonical,
            "event.duration"
        );
        assert_eq!(
            catalog.resolve("transaction.op").unwrap().canonical,
            "event.contexts.trace.op"
        );
        assert_eq!(
            catalog.resolve("release.version").unwrap().canonical,
            "event.release.version.short"
        );
        assert!(catalog.resolve("route.action").is_none());
    }

    #[test]
    fn measurements_map_dynamically() {
        let catalog = FieldCatalog::new();
        let field = catalog.map_field("measurements.fp").unwrap();
        assert_eq!(field.name, "event.measurements.fp");
        assert_eq!(field.value_type, ValueType::Number);
        assert!(!field.standard_metrics);
    }

    #[test]
    fn unknown_fields_fall_back_to_tags() {
        let catalog = FieldCatalog::new();
        let field = catalog.map_field("route.action").unwrap();
        assert_eq!(field.name, "event.tags.route.action");
        assert_eq!(field.value_type, ValueType::String);
        assert!(!field.standard_metrics);
        assert!(!field.ignored);

        // An aggregate expression is not a field.
        assert!(catalog.map_field("p75(transaction.duration)").is_none());
    }

    #[test]
    fn ignored_fields() {
        let catalog = FieldCatalog::new();
        assert!(catalog.map_field("project").unwrap().ignored);
        assert!(catalog.map_field("event.type").unwrap().ignored);
        assert!(catalog.map_field("event.type").unwrap().standard_metrics);
    }

    #[test]
    fn standard_aggregate_arguments() {
        let catalog = FieldCatalog::new();
        assert!(catalog.aggregatable_by_standard_metrics("transaction.duration"));
        assert!(catalog.aggregatable_by_standard_metrics("measurements.lcp"));
        assert!(catalog.aggregatable_by_standard_metrics("spans.http"));
        assert!(!catalog.aggregatable_by_standard_metrics("release"));
    }
}
