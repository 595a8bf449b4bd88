//! Metric-aggregator inference.
//!
//! If an operator has no explicit `METRICS_AGGREGATOR` attribute, its
//! `auto_metrics()` declarations (a reflection-free stand-in for
//! annotated fields/accessors) are scanned and turned into a default
//! aggregator: integral fields sum as `i64`, floating fields sum as
//! `f64`. Since there is only one declaration list in this reflection-free
//! model, this collapses to "first declaration of a name wins".

use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

use crate::attribute::AttributeKey;
use crate::descriptor::{AutoMetricKind, UserOperator};
use crate::ordered_map::OrderedMap;

/// Explicit override: an operator carrying this attribute skips inference
/// entirely and uses the stored aggregator metadata as-is.
pub static METRICS_AGGREGATOR: LazyLock<AttributeKey<MetricAggregatorMeta>> = LazyLock::new(|| AttributeKey::new("METRICS_AGGREGATOR"));

/// How one metric is combined across partitions/windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregatorKind {
    /// Sum partial values as 64-bit integers.
    SumLong,
    /// Sum partial values as 64-bit floats.
    SumDouble,
}

/// The inferred (or explicitly declared) metric-aggregator metadata for one operator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricAggregatorMeta {
    aggregators: OrderedMap<String, AggregatorKind>,
    /// Opaque dimensions-scheme payload bundled alongside the aggregator,
    /// carried through verbatim. Interpretation belongs to the
    /// out-of-scope stats recorder.
    dimensions_scheme: Option<String>,
}

impl MetricAggregatorMeta {
    /// The registered aggregators, keyed by metric name, in declaration order.
    pub fn aggregators(&self) -> &OrderedMap<String, AggregatorKind> {
        &self.aggregators
    }

    /// The bundled dimensions-scheme payload, if any.
    pub fn dimensions_scheme(&self) -> Option<&str> {
        self.dimensions_scheme.as_deref()
    }

    /// Sets the dimensions-scheme payload.
    pub fn set_dimensions_scheme(&mut self, scheme: impl Into<String>) {
        self.dimensions_scheme = Some(scheme.into());
    }

    /// True if no metrics were registered at all.
    pub fn is_empty(&self) -> bool {
        self.aggregators.is_empty()
    }
}

/// Infers the default aggregator metadata for a user operator from its
/// declared auto-metric fields.
///
/// Returns `None` if no auto-metric fields are declared at all. Callers
/// should only attach an aggregator when this returns something, since an
/// operator with no auto-metrics has no effective aggregator at all.
pub fn infer_metric_aggregator(user_operator: &dyn UserOperator) -> Option<MetricAggregatorMeta> {
    let mut meta = MetricAggregatorMeta::default();
    for field in user_operator.auto_metrics() {
        if meta.aggregators.contains_key(&field.name) {
            continue;
        }
        let kind = match field.kind {
            AutoMetricKind::Integral => AggregatorKind::SumLong,
            AutoMetricKind::Floating => AggregatorKind::SumDouble,
        };
        meta.aggregators.insert(field.name, kind);
    }
    if meta.is_empty() {
        None
    } else {
        Some(meta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{AutoMetricField, PortMappingDescriptor};
    use crate::error::SerializationError;

    #[derive(Debug)]
    struct FakeOperator {
        metrics: Vec<AutoMetricField>,
    }

    impl UserOperator for FakeOperator {
        fn port_mapping(&self) -> PortMappingDescriptor {
            PortMappingDescriptor::builder().build().unwrap()
        }
        fn auto_metrics(&self) -> Vec<AutoMetricField> {
            self.metrics.clone()
        }
        fn to_bytes(&self) -> Result<Vec<u8>, SerializationError> {
            Ok(Vec::new())
        }
        fn kind_tag(&self) -> &'static str {
            "fake"
        }
    }

    #[test]
    fn infers_long_and_double_sums() {
        let op = FakeOperator { metrics: vec![AutoMetricField::integral("bytesIn"), AutoMetricField::floating("rate")] };
        let meta = infer_metric_aggregator(&op).unwrap();
        assert_eq!(meta.aggregators().get("bytesIn"), Some(&AggregatorKind::SumLong));
        assert_eq!(meta.aggregators().get("rate"), Some(&AggregatorKind::SumDouble));
        assert_eq!(meta.aggregators().len(), 2);
    }

    #[test]
    fn no_metrics_declared_yields_none() {
        let op = FakeOperator { metrics: vec![] };
        assert!(infer_metric_aggregator(&op).is_none());
    }

    #[test]
    fn first_declaration_of_a_name_wins() {
        let op = FakeOperator { metrics: vec![AutoMetricField::integral("x"), AutoMetricField::floating("x")] };
        let meta = infer_metric_aggregator(&op).unwrap();
        assert_eq!(meta.aggregators().get("x"), Some(&AggregatorKind::SumLong));
    }
}
