//! Operator-author-supplied descriptors, replacing host-language reflection.
//!
//! Port discovery comes from an explicit descriptor the operator author
//! supplies rather than runtime field reflection (which Rust does not
//! have). This module is the descriptor surface: [`PortMappingDescriptor`]
//! (built via [`PortMappingDescriptorBuilder`], directly analogous to an
//! `OperatorBuilder` that operator authors use to declare named inputs
//! and outputs before wiring the operator into a dataflow graph) and the
//! [`UserOperator`] trait that ties a concrete operator type to its port
//! mapping, auto-metric fields, and field-level constraints.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{ConstraintViolation, PlanError, SerializationError};
use crate::port::PortKind;

/// One declared port in a [`PortMappingDescriptor`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSpec {
    /// Field name; the stable port identifier within the operator.
    pub name: String,
    /// Whether this is an input or output port.
    pub kind: PortKind,
    /// Whether the port may remain unconnected.
    pub optional: bool,
    /// Marked as carrying an app-data query (domain-specific annotation).
    pub app_data_query: bool,
    /// Marked as carrying an app-data result (domain-specific annotation).
    pub app_data_result: bool,
}

/// The full set of ports an operator declares, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMappingDescriptor {
    ports: Vec<PortSpec>,
}

impl PortMappingDescriptor {
    /// Starts a new builder.
    pub fn builder() -> PortMappingDescriptorBuilder {
        PortMappingDescriptorBuilder::default()
    }

    /// Declared ports in declaration order.
    pub fn ports(&self) -> &[PortSpec] {
        &self.ports
    }

    /// Ports of a given kind, in declaration order.
    pub fn ports_of(&self, kind: PortKind) -> impl Iterator<Item = &PortSpec> {
        self.ports.iter().filter(move |p| p.kind == kind)
    }
}

/// Builds a [`PortMappingDescriptor`], rejecting a duplicate port name
/// the moment two distinct ports would map to the same field name.
#[derive(Debug, Default)]
pub struct PortMappingDescriptorBuilder {
    ports: Vec<PortSpec>,
}

impl PortMappingDescriptorBuilder {
    /// Declares a required input port.
    pub fn input(self, name: impl Into<String>) -> Self {
        self.push(name, PortKind::Input, false, false, false)
    }

    /// Declares an optional input port.
    pub fn input_optional(self, name: impl Into<String>) -> Self {
        self.push(name, PortKind::Input, true, false, false)
    }

    /// Declares a required input port carrying an app-data query.
    pub fn input_app_data_query(self, name: impl Into<String>) -> Self {
        self.push(name, PortKind::Input, false, true, false)
    }

    /// Declares a required output port.
    pub fn output(self, name: impl Into<String>) -> Self {
        self.push(name, PortKind::Output, false, false, false)
    }

    /// Declares an optional output port.
    pub fn output_optional(self, name: impl Into<String>) -> Self {
        self.push(name, PortKind::Output, true, false, false)
    }

    /// Declares a required output port carrying an app-data result.
    pub fn output_app_data_result(self, name: impl Into<String>) -> Self {
        self.push(name, PortKind::Output, false, false, true)
    }

    fn push(mut self, name: impl Into<String>, kind: PortKind, optional: bool, app_data_query: bool, app_data_result: bool) -> Self {
        let name = name.into();
        self.ports.push(PortSpec { name, kind, optional, app_data_query, app_data_result });
        self
    }

    /// Finalizes the descriptor, or fails on a duplicate port name.
    pub fn build(self) -> Result<PortMappingDescriptor, PlanError> {
        let mut seen = HashSet::new();
        for port in &self.ports {
            if !seen.insert(port.name.clone()) {
                return Err(PlanError::DuplicatePortName { operator: String::new(), port: port.name.clone() });
            }
        }
        Ok(PortMappingDescriptor { ports: self.ports })
    }
}

/// The numeric shape of an auto-metric field, used to pick the default
/// aggregator (integral → sum-of-long, floating → sum-of-double).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AutoMetricKind {
    /// An integral-valued field or accessor; aggregated by summing as `i64`.
    Integral,
    /// A floating-point field or accessor; aggregated by summing as `f64`.
    Floating,
}

/// One field or accessor an operator has annotated as an auto-metric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoMetricField {
    /// Field or accessor name; becomes the metric name.
    pub name: String,
    /// Determines whether it aggregates as a long-sum or double-sum.
    pub kind: AutoMetricKind,
}

impl AutoMetricField {
    /// Declares an auto-metric field that aggregates by summing longs.
    pub fn integral(name: impl Into<String>) -> Self {
        AutoMetricField { name: name.into(), kind: AutoMetricKind::Integral }
    }

    /// Declares an auto-metric field that aggregates by summing doubles.
    pub fn floating(name: impl Into<String>) -> Self {
        AutoMetricField { name: name.into(), kind: AutoMetricKind::Floating }
    }
}

/// The operator-author-facing contract a user operator type implements.
///
/// Stands in for runtime reflection: rather than scanning fields at
/// runtime, the operator declares its own shape. Every method but
/// `port_mapping` has a conservative default so an operator with no
/// metrics, no constraints, and no partitioning concerns can implement
/// just the one required method.
pub trait UserOperator: std::fmt::Debug + Send + Sync {
    /// Declares this operator's input and output ports.
    fn port_mapping(&self) -> PortMappingDescriptor;

    /// Declares fields/accessors eligible for automatic metric aggregation.
    fn auto_metrics(&self) -> Vec<AutoMetricField> {
        Vec::new()
    }

    /// Runs this operator's field-level constraint checks.
    fn check_constraints(&self) -> Vec<ConstraintViolation> {
        Vec::new()
    }

    /// Whether the operator's class implements the partitioner capability
    /// (used when the operator is `!partitionable` to detect a mismatch
    /// even without an explicit partitioner attribute).
    fn supports_partitioner(&self) -> bool {
        false
    }

    /// Whether this operator may serve as a root (an input operator).
    fn is_input_operator(&self) -> bool {
        false
    }

    /// Serializes this operator instance to bytes for a [`crate::storage::StorageAgent`].
    fn to_bytes(&self) -> Result<Vec<u8>, SerializationError>;

    /// A stable tag identifying the concrete operator type, used to pick
    /// the right factory function when rehydrating bytes on retrieval.
    fn kind_tag(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_rejects_duplicate_names() {
        let result = PortMappingDescriptor::builder().input("in1").input("in1").build();
        assert!(matches!(result, Err(PlanError::DuplicatePortName { .. })));
    }

    #[test]
    fn builder_preserves_declaration_order() {
        let descriptor = PortMappingDescriptor::builder().input("in1").input_optional("in2").output("out1").build().unwrap();
        let names: Vec<&str> = descriptor.ports().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["in1", "in2", "out1"]);
        assert!(!descriptor.ports()[0].optional);
        assert!(descriptor.ports()[1].optional);
    }
}
