//! Port descriptors.
//!
//! A port is a typed attachment point on an operator, named stably by its
//! declared field name. Ports are owned by their operator; a port's
//! back-reference to that operator is by id only, resolved through
//! [`crate::plan::Plan`] on demand.

use serde::{Deserialize, Serialize};

use crate::attribute::AttributeMap;
use crate::operator::OperatorId;

/// Whether a port accepts tuples (input) or produces them (output).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortKind {
    /// Accepts a single stream's tuples.
    Input,
    /// Produces tuples for a (possibly fanned-out) stream.
    Output,
}

/// Placement hint on a stream's endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Locality {
    /// No placement preference.
    #[default]
    Unspecified,
    /// Endpoints must run on the same physical node.
    NodeLocal,
    /// Endpoints must run in the same container.
    ContainerLocal,
    /// Endpoints must run in the same thread.
    ThreadLocal,
    /// Endpoints must run in the same rack.
    RackLocal,
}

/// A synthesized merge point for fanned-in partitioned streams.
///
/// Out of scope for this crate (physical planning) beyond carrying the
/// fact that one was requested; downstream physical planning interprets
/// it. Created lazily, at most once per output port.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnifierMeta {
    /// Name synthesized for the unifier sub-operator.
    pub name: String,
}

/// A synthesized windowing helper paired with a unifier at a physical
/// boundary. Same out-of-scope status as [`UnifierMeta`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliderMeta {
    /// Name synthesized for the slider sub-operator.
    pub name: String,
}

/// One input or output port on an operator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortDescriptor {
    operator: OperatorId,
    field_name: String,
    kind: PortKind,
    optional: bool,
    app_data_query: bool,
    app_data_result: bool,
    attributes: AttributeMap,
    unifier: Option<UnifierMeta>,
    slider: Option<SliderMeta>,
}

impl PortDescriptor {
    pub(crate) fn new(operator: OperatorId, field_name: String, kind: PortKind, optional: bool, app_data_query: bool, app_data_result: bool) -> Self {
        PortDescriptor {
            operator,
            field_name,
            kind,
            optional,
            app_data_query,
            app_data_result,
            attributes: AttributeMap::new(),
            unifier: None,
            slider: None,
        }
    }

    /// Id of the operator that owns this port.
    pub fn operator(&self) -> OperatorId {
        self.operator
    }

    /// Stable field name within the owning operator.
    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    /// Whether this is an input or output port.
    pub fn kind(&self) -> PortKind {
        self.kind
    }

    /// Whether the port may remain unconnected after validation.
    pub fn is_optional(&self) -> bool {
        self.optional
    }

    /// Whether this port is annotated as carrying an app-data query.
    pub fn is_app_data_query(&self) -> bool {
        self.app_data_query
    }

    /// Whether this port is annotated as carrying an app-data result.
    pub fn is_app_data_result(&self) -> bool {
        self.app_data_result
    }

    /// The port's own attribute map.
    ///
    /// Port-level lookup never chains to the owning operator's map:
    /// callers use `attributes().get(key)`, which already falls
    /// back only to the key's own default.
    pub fn attributes(&self) -> &AttributeMap {
        &self.attributes
    }

    /// Mutable access to the port's own attribute map.
    pub fn attributes_mut(&mut self) -> &mut AttributeMap {
        &mut self.attributes
    }

    /// The lazily created unifier, if one has been requested for this (output) port.
    pub fn unifier(&self) -> Option<&UnifierMeta> {
        self.unifier.as_ref()
    }

    /// The lazily created slider, if one has been requested for this (output) port.
    pub fn slider(&self) -> Option<&SliderMeta> {
        self.slider.as_ref()
    }

    /// Materializes (or returns the existing) unifier for this output port.
    ///
    /// Only meaningful on output ports; the physical planner requests one
    /// when it must fan in partitioned streams at this port.
    pub fn ensure_unifier(&mut self, name: impl Into<String>) -> &UnifierMeta {
        self.unifier.get_or_insert_with(|| UnifierMeta { name: name.into() })
    }

    /// Materializes (or returns the existing) slider for this output port.
    pub fn ensure_slider(&mut self, name: impl Into<String>) -> &SliderMeta {
        self.slider.get_or_insert_with(|| SliderMeta { name: name.into() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unifier_is_created_once() {
        let mut port = PortDescriptor::new(1, "out1".into(), PortKind::Output, false, false, false);
        assert!(port.unifier().is_none());
        port.ensure_unifier("out1-unifier");
        port.ensure_unifier("ignored-second-name");
        assert_eq!(port.unifier().unwrap().name, "out1-unifier");
    }

    #[test]
    fn port_attributes_do_not_chain_to_operator() {
        let port = PortDescriptor::new(1, "in1".into(), PortKind::Input, true, false, false);
        assert!(port.attributes().get_own(&crate::attribute::AttributeKey::<i64>::new("X")).is_none());
    }
}
