//! The plan container.
//!
//! `Plan` owns every operator and stream by value, keyed by name/id so
//! that ports and streams can hold plain references instead of object
//! pointers. It tracks the root set incrementally rather than
//! recomputing it, and every mutator validates its arguments before
//! touching any state so a failed call has no observable effect.

use std::collections::HashMap;

use streamplan_logging::PlanEvent;

use crate::attribute::AttributeMap;
use crate::descriptor::UserOperator;
use crate::error::{PlanError, ValidationError};
use crate::operator::{OperatorId, OperatorMeta};
use crate::ordered_map::OrderedMap;
use crate::port::{Locality, PortKind};
use crate::stream::{PortRef, StreamMeta};

/// The in-memory, mutable logical plan.
///
/// Not a concurrent data structure: construction and validation
/// are both single-threaded, and a reader thread may serialize a
/// validated plan concurrently with other readers but never with a
/// mutator; that synchronization is the caller's responsibility.
#[derive(Default)]
pub struct Plan {
    pub(crate) operators: OrderedMap<String, OperatorMeta>,
    pub(crate) id_to_name: HashMap<OperatorId, String>,
    pub(crate) streams: OrderedMap<String, StreamMeta>,
    pub(crate) roots: OrderedMap<String, ()>,
    pub(crate) attributes: AttributeMap,
    events: Vec<PlanEvent>,
}

impl Plan {
    /// Creates an empty plan.
    pub fn new() -> Self {
        Self::default()
    }

    /// The plan's own (top-level) attribute scope.
    pub fn attributes(&self) -> &AttributeMap {
        &self.attributes
    }

    /// Mutable access to the plan's own attribute scope.
    pub fn attributes_mut(&mut self) -> &mut AttributeMap {
        &mut self.attributes
    }

    /// Registers `user_operator` under `name`.
    ///
    /// Fails if `name` is already bound. The newly added
    /// operator enters the root set immediately, since it has no streams
    /// yet.
    pub fn add_operator(&mut self, name: impl Into<String>, user_operator: Box<dyn UserOperator>) -> Result<OperatorId, PlanError> {
        let name = name.into();
        if self.operators.contains_key(&name) {
            return Err(PlanError::DuplicateOperatorName(name));
        }
        let meta = OperatorMeta::new(name.clone(), user_operator)?;
        let id = meta.id();
        self.operators.insert(name.clone(), meta);
        self.id_to_name.insert(id, name.clone());
        self.roots.insert(name.clone(), ());
        tracing::debug!(operator = %name, id, "operator added to plan");
        self.events.push(PlanEvent::create_operator(name, id));
        Ok(id)
    }

    /// Removes the operator named `name`.
    ///
    /// Unbinds every input-port sink it owns from the streams they were
    /// attached to, and deletes (rather than orphans) every stream whose
    /// *source* was on this operator, rather than leaving it dangling
    /// with no producer.
    pub fn remove_operator(&mut self, name: &str) -> Result<(), PlanError> {
        if !self.operators.contains_key(name) {
            return Err(PlanError::UnknownOperator(name.to_string()));
        }
        let op = self.operators.get(name).unwrap();
        let id = op.id();
        let input_bindings: Vec<(String, String)> = op.input_streams().iter().map(|(port, stream)| (port.clone(), stream.clone())).collect();
        let output_bindings: Vec<(String, String)> = op.output_streams().iter().map(|(port, stream)| (port.clone(), stream.clone())).collect();

        for (port, stream_id) in &input_bindings {
            let sink = PortRef::new(id, port.clone());
            if let Some(stream) = self.streams.get_mut(stream_id) {
                stream.remove_sink(&sink);
            }
        }

        for (_, stream_id) in &output_bindings {
            self.delete_stream_and_promote_sinks(stream_id);
        }

        self.roots.remove(name);
        self.id_to_name.remove(&id);
        self.operators.remove(name);
        tracing::debug!(operator = %name, id, "operator removed from plan");
        self.events.push(PlanEvent::remove_operator(name, id));
        Ok(())
    }

    fn delete_stream_and_promote_sinks(&mut self, stream_id: &str) {
        let Some(stream) = self.streams.remove(stream_id) else { return };
        for sink in stream.sinks() {
            if let Some(sink_name) = self.id_to_name.get(&sink.operator).cloned() {
                if let Some(sink_op) = self.operators.get_mut(&sink_name) {
                    sink_op.unbind_input_stream(&sink.port);
                    if sink_op.input_count() == 0 {
                        self.roots.insert(sink_name, ());
                    }
                }
            }
        }
    }

    /// Creates an empty stream under `id`. Fails on a duplicate id.
    pub fn add_stream(&mut self, id: impl Into<String>) -> Result<(), PlanError> {
        let id = id.into();
        if self.streams.contains_key(&id) {
            return Err(PlanError::DuplicateStreamId(id));
        }
        self.streams.insert(id.clone(), StreamMeta::new(id));
        Ok(())
    }

    /// Binds `stream`'s source to the output port `port` on operator `operator_name`.
    ///
    /// Fails if the port is unknown, not an output port, or already
    /// carries a source stream.
    pub fn set_source(&mut self, stream_id: &str, operator_name: &str, port: &str) -> Result<(), PlanError> {
        if !self.streams.contains_key(stream_id) {
            return Err(PlanError::UnknownStream(stream_id.to_string()));
        }
        let op = self.operators.get(operator_name).ok_or_else(|| PlanError::UnknownOperator(operator_name.to_string()))?;
        let id = op.id();
        let descriptor = op.ports().get(port).ok_or_else(|| PlanError::UnknownPort { operator: operator_name.to_string(), port: port.to_string() })?;
        if descriptor.kind() != PortKind::Output {
            return Err(PlanError::UnknownPort { operator: operator_name.to_string(), port: port.to_string() });
        }
        if op.output_stream(port).is_some() {
            return Err(PlanError::SourceAlreadyBound { operator: operator_name.to_string(), port: port.to_string() });
        }

        let op = self.operators.get_mut(operator_name).unwrap();
        op.bind_output_stream(port, stream_id.to_string());
        let stream = self.streams.get_mut(stream_id).unwrap();
        stream.bind_source(PortRef::new(id, port.to_string()));
        Ok(())
    }

    /// Appends a sink on the input port `port` on operator `operator_name` to `stream`.
    ///
    /// Fails if the port is unknown, not an input port, or already bound
    /// to any stream. Removes the sink's operator from the
    /// root set.
    pub fn add_sink(&mut self, stream_id: &str, operator_name: &str, port: &str) -> Result<(), PlanError> {
        if !self.streams.contains_key(stream_id) {
            return Err(PlanError::UnknownStream(stream_id.to_string()));
        }
        let op = self.operators.get(operator_name).ok_or_else(|| PlanError::UnknownOperator(operator_name.to_string()))?;
        let id = op.id();
        let descriptor = op.ports().get(port).ok_or_else(|| PlanError::UnknownPort { operator: operator_name.to_string(), port: port.to_string() })?;
        if descriptor.kind() != PortKind::Input {
            return Err(PlanError::UnknownPort { operator: operator_name.to_string(), port: port.to_string() });
        }
        if op.input_stream(port).is_some() {
            return Err(PlanError::SinkAlreadyBound { operator: operator_name.to_string(), port: port.to_string() });
        }

        let op = self.operators.get_mut(operator_name).unwrap();
        op.bind_input_stream(port, stream_id.to_string());
        let stream = self.streams.get_mut(stream_id).unwrap();
        stream.push_sink(PortRef::new(id, port.to_string()));
        self.roots.remove(operator_name);
        Ok(())
    }

    /// Sets `stream`'s placement locality tag.
    pub fn set_stream_locality(&mut self, stream_id: &str, locality: Locality) -> Result<(), PlanError> {
        let stream = self.streams.get_mut(stream_id).ok_or_else(|| PlanError::UnknownStream(stream_id.to_string()))?;
        stream.set_locality(locality);
        Ok(())
    }

    /// Removes `stream` entirely: detaches all sinks (re-promoting newly
    /// isolated operators to the root set), clears its source, and
    /// unregisters it from the plan.
    pub fn remove_stream(&mut self, stream_id: &str) -> Result<(), PlanError> {
        let stream = self.streams.get(stream_id).ok_or_else(|| PlanError::UnknownStream(stream_id.to_string()))?;
        let source = stream.source().cloned();
        let sinks: Vec<PortRef> = stream.sinks().to_vec();

        if let Some(source) = source {
            if let Some(name) = self.id_to_name.get(&source.operator).cloned() {
                if let Some(op) = self.operators.get_mut(&name) {
                    op.unbind_output_stream(&source.port);
                }
            }
        }
        for sink in &sinks {
            if let Some(name) = self.id_to_name.get(&sink.operator).cloned() {
                if let Some(op) = self.operators.get_mut(&name) {
                    op.unbind_input_stream(&sink.port);
                    if op.input_count() == 0 {
                        self.roots.insert(name, ());
                    }
                }
            }
        }
        self.streams.remove(stream_id);
        Ok(())
    }

    /// The operator named `name`, if registered.
    pub fn operator(&self, name: &str) -> Option<&OperatorMeta> {
        self.operators.get(name)
    }

    /// Mutable access to the operator named `name`, if registered.
    pub fn operator_mut(&mut self, name: &str) -> Option<&mut OperatorMeta> {
        self.operators.get_mut(name)
    }

    /// The operator with process-global id `id`, if registered.
    pub fn operator_by_id(&self, id: OperatorId) -> Option<&OperatorMeta> {
        self.id_to_name.get(&id).and_then(|name| self.operators.get(name))
    }

    /// Mutable access to the operator with process-global id `id`, if registered.
    pub fn operator_by_id_mut(&mut self, id: OperatorId) -> Option<&mut OperatorMeta> {
        let name = self.id_to_name.get(&id)?.clone();
        self.operators.get_mut(&name)
    }

    /// All operators, in insertion order.
    pub fn operators(&self) -> impl Iterator<Item = &OperatorMeta> {
        self.operators.values()
    }

    /// The stream with id `id`, if registered.
    pub fn stream(&self, id: &str) -> Option<&StreamMeta> {
        self.streams.get(id)
    }

    /// All streams, in insertion order.
    pub fn streams(&self) -> impl Iterator<Item = &StreamMeta> {
        self.streams.values()
    }

    /// Names of operators currently in the root set (no inbound stream),
    /// in the order they most recently entered it.
    pub fn roots(&self) -> impl Iterator<Item = &str> {
        self.roots.keys().map(String::as_str)
    }

    /// Drains the operational events accumulated by builder
    /// calls since the last drain.
    pub fn drain_events(&mut self) -> Vec<PlanEvent> {
        std::mem::take(&mut self.events)
    }

    /// Runs the full multi-pass structural validator against this plan:
    /// constraint checks, OIO scheduling, cycle detection,
    /// dangling-stream and root-typing checks, processing-mode
    /// propagation, and metric-aggregator inference. On success, operator
    /// metadata is left populated with its inferred processing mode and
    /// metric aggregator; on failure the plan may be left partially
    /// annotated by whichever pass ran before the error (construction
    /// itself is always consistent; only validation is all-or-nothing
    /// about its own side effects).
    pub fn validate(&mut self) -> Result<(), ValidationError> {
        crate::validator::validate(self)
    }

    /// Reassembles a plan from its serialized parts, used by
    /// [`crate::storage`] once every operator's bytes have been rehydrated
    /// through a [`crate::storage::StorageAgent`].
    pub(crate) fn from_parts(operators: OrderedMap<String, OperatorMeta>, streams: OrderedMap<String, StreamMeta>, roots: OrderedMap<String, ()>, attributes: AttributeMap) -> Self {
        let id_to_name = operators.iter().map(|(name, op)| (op.id(), name.clone())).collect();
        Plan { operators, id_to_name, streams, roots, attributes, events: Vec::new() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::PortMappingDescriptor;
    use crate::error::SerializationError;

    #[derive(Debug)]
    struct TestOp {
        descriptor: PortMappingDescriptor,
        is_input_operator: bool,
    }

    impl UserOperator for TestOp {
        fn port_mapping(&self) -> PortMappingDescriptor {
            self.descriptor.clone()
        }
        fn is_input_operator(&self) -> bool {
            self.is_input_operator
        }
        fn to_bytes(&self) -> Result<Vec<u8>, SerializationError> {
            Ok(Vec::new())
        }
        fn kind_tag(&self) -> &'static str {
            "test-op"
        }
    }

    fn source_op() -> Box<dyn UserOperator> {
        Box::new(TestOp { descriptor: PortMappingDescriptor::builder().output("out1").build().unwrap(), is_input_operator: true })
    }

    fn pass_through_op() -> Box<dyn UserOperator> {
        Box::new(TestOp { descriptor: PortMappingDescriptor::builder().input("in1").output("out1").build().unwrap(), is_input_operator: false })
    }

    fn sink_op() -> Box<dyn UserOperator> {
        Box::new(TestOp { descriptor: PortMappingDescriptor::builder().input("in1").build().unwrap(), is_input_operator: false })
    }

    #[test]
    fn root_set_tracks_creation_and_wiring() {
        let mut plan = Plan::new();
        plan.add_operator("A", source_op()).unwrap();
        plan.add_operator("B", pass_through_op()).unwrap();
        assert_eq!(plan.roots().collect::<Vec<_>>(), vec!["A", "B"]);

        plan.add_stream("s1").unwrap();
        plan.set_source("s1", "A", "out1").unwrap();
        plan.add_sink("s1", "B", "in1").unwrap();

        assert_eq!(plan.roots().collect::<Vec<_>>(), vec!["A"]);
    }

    #[test]
    fn duplicate_operator_name_rejected() {
        let mut plan = Plan::new();
        plan.add_operator("A", source_op()).unwrap();
        let err = plan.add_operator("A", source_op()).unwrap_err();
        assert!(matches!(err, PlanError::DuplicateOperatorName(_)));
    }

    #[test]
    fn stream_remove_repromotes_isolated_sinks() {
        let mut plan = Plan::new();
        plan.add_operator("A", source_op()).unwrap();
        plan.add_operator("B", sink_op()).unwrap();
        plan.add_stream("s1").unwrap();
        plan.set_source("s1", "A", "out1").unwrap();
        plan.add_sink("s1", "B", "in1").unwrap();
        assert!(!plan.roots().any(|r| r == "B"));

        plan.remove_stream("s1").unwrap();
        assert!(plan.roots().any(|r| r == "B"));
        assert!(plan.stream("s1").is_none());
    }

    #[test]
    fn remove_operator_deletes_its_source_streams() {
        let mut plan = Plan::new();
        plan.add_operator("A", source_op()).unwrap();
        plan.add_operator("B", sink_op()).unwrap();
        plan.add_stream("s1").unwrap();
        plan.set_source("s1", "A", "out1").unwrap();
        plan.add_sink("s1", "B", "in1").unwrap();

        plan.remove_operator("A").unwrap();
        assert!(plan.stream("s1").is_none());
        assert!(plan.roots().any(|r| r == "B"));
    }

    #[test]
    fn sink_already_bound_rejected() {
        let mut plan = Plan::new();
        plan.add_operator("A", source_op()).unwrap();
        plan.add_operator("B", sink_op()).unwrap();
        plan.add_stream("s1").unwrap();
        plan.add_stream("s2").unwrap();
        plan.set_source("s1", "A", "out1").unwrap();
        plan.add_sink("s1", "B", "in1").unwrap();
        let err = plan.add_sink("s2", "B", "in1").unwrap_err();
        assert!(matches!(err, PlanError::SinkAlreadyBound { .. }));
    }
}
