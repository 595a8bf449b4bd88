//! Operator metadata.
//!
//! `OperatorMeta` owns the user's operator object (as a [`UserOperator`]
//! trait object), its discovered port descriptors, the stream adjacency
//! maps keyed by port name, its own attribute scope, and the validator's
//! transient scratch fields. Streams are referenced by id rather than by
//! object identity, so the plan is the only place that resolves a stream
//! id to a [`StreamMeta`].

use std::sync::atomic::{AtomicI64, Ordering};

use serde::{Deserialize, Serialize};

use crate::attribute::AttributeMap;
use crate::descriptor::{PortMappingDescriptor, UserOperator};
use crate::error::PlanError;
use crate::metrics::MetricAggregatorMeta;
use crate::ordered_map::OrderedMap;
use crate::port::{PortDescriptor, PortKind};

/// A process-global operator identifier.
///
/// Allocated from a monotonically *decreasing* sequencer: later ids sort
/// before earlier ones.
pub type OperatorId = i64;

static NEXT_OPERATOR_ID: AtomicI64 = AtomicI64::new(i64::MAX);

pub(crate) fn next_operator_id() -> OperatorId {
    NEXT_OPERATOR_ID.fetch_sub(1, Ordering::Relaxed)
}

/// Seeds the operator id sequencer below `min_seen`, for use when
/// rehydrating a deserialized plan so freshly allocated ids never
/// collide with ones already on disk. This sequencer counts down, so it
/// seeds below the minimum id seen rather than above the maximum.
pub fn seed_operator_id_sequencer_below(min_seen: OperatorId) {
    let mut current = NEXT_OPERATOR_ID.load(Ordering::Relaxed);
    while min_seen - 1 < current {
        match NEXT_OPERATOR_ID.compare_exchange_weak(current, min_seen - 1, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => break,
            Err(observed) => current = observed,
        }
    }
}

/// The delivery-semantics contract of an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessingMode {
    /// Tuples may be dropped; never duplicated.
    AtMostOnce,
    /// Tuples are never dropped; may be duplicated on recovery.
    AtLeastOnce,
    /// Tuples are delivered exactly once, end to end.
    ExactlyOnce,
}

/// Transient fields used only while `Plan::validate` is running.
///
/// Reset at the start of every validation pass. Two independent fields
/// back the OIO root (`oio_visited` / `oio_root`) rather than overloading
/// one nullable field as sentinel-and-payload, which would leave "not yet
/// visited" and "visited, root is self" indistinguishable.
#[derive(Debug, Clone, Default)]
pub(crate) struct ValidatorScratch {
    pub(crate) tarjan_index: Option<usize>,
    pub(crate) tarjan_lowlink: usize,
    pub(crate) on_stack: bool,
    pub(crate) oio_visited: bool,
    pub(crate) oio_root: Option<OperatorId>,
}

/// A registered operator: its user object, discovered ports, and stream wiring.
#[derive(Serialize, Deserialize)]
pub struct OperatorMeta {
    name: String,
    id: OperatorId,
    #[serde(skip)]
    user_operator: Option<Box<dyn UserOperator>>,
    ports: OrderedMap<String, PortDescriptor>,
    input_streams: OrderedMap<String, String>,
    output_streams: OrderedMap<String, String>,
    attributes: AttributeMap,
    partitionable: bool,
    checkpointable_within_app_window: bool,
    processing_mode: Option<ProcessingMode>,
    metric_aggregator: Option<MetricAggregatorMeta>,
    #[serde(skip)]
    scratch: ValidatorScratch,
}

impl std::fmt::Debug for OperatorMeta {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperatorMeta").field("name", &self.name).field("id", &self.id).finish_non_exhaustive()
    }
}

impl PartialEq for OperatorMeta {
    /// Includes the attribute map: two operators with the same name and
    /// id but differently configured attributes are not considered equal.
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.id == other.id && self.attributes_json() == other.attributes_json()
    }
}
impl Eq for OperatorMeta {}

impl std::hash::Hash for OperatorMeta {
    /// Deliberately excludes the attribute map: it is mutable over the
    /// operator's lifetime and would make the hash unstable across a
    /// mutation, even though `eq` considers it.
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.id.hash(state);
    }
}

impl OperatorMeta {
    pub(crate) fn new(name: String, user_operator: Box<dyn UserOperator>) -> Result<Self, PlanError> {
        let descriptor: PortMappingDescriptor = user_operator.port_mapping();
        let id = next_operator_id();
        let mut ports = OrderedMap::new();
        for spec in descriptor.ports() {
            if ports.contains_key(&spec.name) {
                return Err(PlanError::DuplicatePortName { operator: name.clone(), port: spec.name.clone() });
            }
            let port = PortDescriptor::new(id, spec.name.clone(), spec.kind, spec.optional, spec.app_data_query, spec.app_data_result);
            ports.insert(spec.name.clone(), port);
        }
        Ok(OperatorMeta {
            name,
            id,
            user_operator: Some(user_operator),
            ports,
            input_streams: OrderedMap::new(),
            output_streams: OrderedMap::new(),
            attributes: AttributeMap::new(),
            partitionable: true,
            checkpointable_within_app_window: true,
            processing_mode: None,
            metric_aggregator: None,
            scratch: ValidatorScratch::default(),
        })
    }

    fn attributes_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.attributes).unwrap_or(serde_json::Value::Null)
    }

    /// Stable operator name, unique within its plan.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Process-global operator id (decreasing sequencer).
    pub fn id(&self) -> OperatorId {
        self.id
    }

    /// The user operator object, if still attached (absent only
    /// transiently between deserializing metadata and rehydrating bytes
    /// through a [`crate::storage::StorageAgent`]).
    pub fn user_operator(&self) -> Option<&dyn UserOperator> {
        self.user_operator.as_deref()
    }

    pub(crate) fn set_user_operator(&mut self, user_operator: Box<dyn UserOperator>) {
        self.user_operator = Some(user_operator);
    }

    pub(crate) fn take_user_operator(&mut self) -> Option<Box<dyn UserOperator>> {
        self.user_operator.take()
    }

    /// This operator's discovered port descriptors, keyed by field name.
    pub fn ports(&self) -> &OrderedMap<String, PortDescriptor> {
        &self.ports
    }

    pub(crate) fn ports_mut(&mut self) -> &mut OrderedMap<String, PortDescriptor> {
        &mut self.ports
    }

    /// The stream id bound to `port` (an input port), if any.
    pub fn input_stream(&self, port: &str) -> Option<&str> {
        self.input_streams.get(port).map(String::as_str)
    }

    /// The stream id bound to `port` (an output port), if any.
    pub fn output_stream(&self, port: &str) -> Option<&str> {
        self.output_streams.get(port).map(String::as_str)
    }

    /// Input ports and their bound stream ids, in the order ports were connected.
    pub fn input_streams(&self) -> &OrderedMap<String, String> {
        &self.input_streams
    }

    /// Output ports and their bound stream ids, in the order ports were connected.
    pub fn output_streams(&self) -> &OrderedMap<String, String> {
        &self.output_streams
    }

    pub(crate) fn bind_input_stream(&mut self, port: &str, stream_id: String) {
        self.input_streams.insert(port.to_string(), stream_id);
    }

    pub(crate) fn bind_output_stream(&mut self, port: &str, stream_id: String) {
        self.output_streams.insert(port.to_string(), stream_id);
    }

    pub(crate) fn unbind_input_stream(&mut self, port: &str) {
        self.input_streams.remove(port);
    }

    pub(crate) fn unbind_output_stream(&mut self, port: &str) {
        self.output_streams.remove(port);
    }

    /// Number of inbound streams this operator currently has (for OIO/root checks).
    pub fn input_count(&self) -> usize {
        self.input_streams.len()
    }

    /// This operator's own attribute map.
    pub fn attributes(&self) -> &AttributeMap {
        &self.attributes
    }

    /// Mutable access to this operator's own attribute map.
    pub fn attributes_mut(&mut self) -> &mut AttributeMap {
        &mut self.attributes
    }

    /// Class-level annotation: whether this operator may be partitioned.
    pub fn is_partitionable(&self) -> bool {
        self.partitionable
    }

    /// Sets the partitionable class-level annotation.
    pub fn set_partitionable(&mut self, partitionable: bool) {
        self.partitionable = partitionable;
    }

    /// Class-level annotation: whether this operator can be checkpointed
    /// within the application window.
    pub fn is_checkpointable_within_app_window(&self) -> bool {
        self.checkpointable_within_app_window
    }

    /// Sets the checkpointable-within-app-window class-level annotation.
    pub fn set_checkpointable_within_app_window(&mut self, value: bool) {
        self.checkpointable_within_app_window = value;
    }

    /// The processing mode assigned during the last successful validation, if any.
    pub fn processing_mode(&self) -> Option<ProcessingMode> {
        self.processing_mode
    }

    /// Explicitly declares this operator's processing mode ahead of validation.
    pub fn set_processing_mode(&mut self, mode: ProcessingMode) {
        self.processing_mode = Some(mode);
    }

    pub(crate) fn set_processing_mode_inferred(&mut self, mode: ProcessingMode) {
        self.processing_mode = Some(mode);
    }

    /// The metric aggregator inferred (or explicitly set) during the last validation.
    pub fn metric_aggregator(&self) -> Option<&MetricAggregatorMeta> {
        self.metric_aggregator.as_ref()
    }

    pub(crate) fn set_metric_aggregator(&mut self, aggregator: MetricAggregatorMeta) {
        self.metric_aggregator = Some(aggregator);
    }

    pub(crate) fn scratch(&self) -> &ValidatorScratch {
        &self.scratch
    }

    pub(crate) fn scratch_mut(&mut self) -> &mut ValidatorScratch {
        &mut self.scratch
    }

    pub(crate) fn reset_scratch(&mut self) {
        self.scratch = ValidatorScratch::default();
    }

    /// All ports of a given kind, in declaration order.
    pub fn ports_of(&self, kind: PortKind) -> impl Iterator<Item = &PortDescriptor> {
        self.ports.values().filter(move |p| p.kind() == kind)
    }

    /// Reconstructs operator metadata from its serialized parts plus a
    /// freshly rehydrated user operator object: the storage agent rebinds
    /// the operator instance, and this rebinds everything around it
    /// exactly as it was serialized, rather than rederiving ports from
    /// the rehydrated object's `port_mapping()`.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        name: String,
        id: OperatorId,
        user_operator: Option<Box<dyn UserOperator>>,
        ports: OrderedMap<String, PortDescriptor>,
        input_streams: OrderedMap<String, String>,
        output_streams: OrderedMap<String, String>,
        attributes: AttributeMap,
        partitionable: bool,
        checkpointable_within_app_window: bool,
        processing_mode: Option<ProcessingMode>,
        metric_aggregator: Option<MetricAggregatorMeta>,
    ) -> Self {
        OperatorMeta {
            name,
            id,
            user_operator,
            ports,
            input_streams,
            output_streams,
            attributes,
            partitionable,
            checkpointable_within_app_window,
            processing_mode,
            metric_aggregator,
            scratch: ValidatorScratch::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::PortMappingDescriptor;
    use crate::error::SerializationError;

    #[derive(Debug)]
    struct TestOp(PortMappingDescriptor);

    impl UserOperator for TestOp {
        fn port_mapping(&self) -> PortMappingDescriptor {
            self.0.clone()
        }
        fn to_bytes(&self) -> Result<Vec<u8>, SerializationError> {
            Ok(Vec::new())
        }
        fn kind_tag(&self) -> &'static str {
            "test-op"
        }
    }

    #[test]
    fn port_descriptors_are_stable_across_repeated_introspection() {
        let descriptor = PortMappingDescriptor::builder().input("in1").output("out1").build().unwrap();
        let meta = OperatorMeta::new("A".to_string(), Box::new(TestOp(descriptor))).unwrap();

        let names_first: Vec<&str> = meta.ports().keys().map(String::as_str).collect();
        let names_second: Vec<&str> = meta.ports().keys().map(String::as_str).collect();
        assert_eq!(names_first, names_second);
        assert_eq!(names_first, vec!["in1", "out1"]);
    }

    #[test]
    fn operator_id_sequencer_decreases() {
        let meta_a = OperatorMeta::new("A".to_string(), Box::new(TestOp(PortMappingDescriptor::builder().build().unwrap()))).unwrap();
        let meta_b = OperatorMeta::new("B".to_string(), Box::new(TestOp(PortMappingDescriptor::builder().build().unwrap()))).unwrap();
        assert!(meta_b.id() < meta_a.id());
    }
}
