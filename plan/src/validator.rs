//! The multi-pass structural validator.
//!
//! `validate()` runs seven passes in order, stopping at the first
//! failure: reset scratch, per-operator checks (constraints,
//! partitioner/checkpoint annotations, port connectivity, OIO
//! scheduling), Tarjan SCC cycle detection, dangling-stream detection,
//! root-operator typing, processing-mode propagation, and finally
//! metric-aggregator inference so the validated plan is self-describing.
//!
//! Tarjan's algorithm is implemented iteratively with an explicit frame
//! stack rather than recursively, to avoid stack overflow on structures
//! of unbounded size.

use crate::attribute::get_scoped;
use crate::config::{APPLICATION_WINDOW_COUNT, CHECKPOINT_WINDOW_COUNT, DIMENSIONS_SCHEME, PARTITIONER, PARTITION_PARALLEL, PROCESSING_MODE};
use crate::error::ValidationError;
use crate::metrics::{infer_metric_aggregator, METRICS_AGGREGATOR};
use crate::operator::{OperatorId, ProcessingMode};
use crate::plan::Plan;
use crate::port::{Locality, PortKind};

/// Runs every validation pass against `plan`, stopping at the first failure.
#[tracing::instrument(skip(plan), fields(operators = plan.operators().count(), streams = plan.streams().count()))]
pub fn validate(plan: &mut Plan) -> Result<(), ValidationError> {
    reset_scratch(plan);

    let mut oio_candidates = Vec::new();
    per_operator_checks(plan, &mut oio_candidates)?;

    for id in oio_candidates {
        validate_oio(plan, id)?;
    }

    let cycles = run_tarjan(plan);
    if let Some(cycle) = cycles.into_iter().next() {
        let operators: Vec<String> = cycle.into_iter().map(|id| plan.operator_by_id(id).map(|op| op.name().to_string()).unwrap_or_default()).collect();
        tracing::warn!(cycle = ?operators, "validation found a cycle");
        return Err(ValidationError::Cycle { operators });
    }

    check_dangling_streams(plan)?;
    check_root_typing(plan)?;
    propagate_processing_modes(plan)?;
    infer_metrics(plan);

    tracing::debug!("plan validated successfully");
    Ok(())
}

fn reset_scratch(plan: &mut Plan) {
    for op in plan.operators.values_mut() {
        op.reset_scratch();
    }
}

fn per_operator_checks(plan: &mut Plan, oio_candidates: &mut Vec<OperatorId>) -> Result<(), ValidationError> {
    let names: Vec<String> = plan.operators().map(|op| op.name().to_string()).collect();
    for name in names {
        check_constraints(plan, &name)?;
        check_partitionable(plan, &name)?;
        check_checkpointable(plan, &name)?;
        check_ports(plan, &name, oio_candidates)?;
    }
    Ok(())
}

fn check_constraints(plan: &Plan, name: &str) -> Result<(), ValidationError> {
    let op = plan.operator(name).expect("operator just listed");
    let Some(user_operator) = op.user_operator() else { return Ok(()) };
    let violations = user_operator.check_constraints();
    if violations.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::ConstraintViolations { operator: name.to_string(), violations })
    }
}

fn check_partitionable(plan: &Plan, name: &str) -> Result<(), ValidationError> {
    let op = plan.operator(name).expect("operator just listed");
    if op.is_partitionable() {
        return Ok(());
    }
    for port in op.ports_of(PortKind::Input) {
        if port.attributes().get(&PARTITION_PARALLEL).unwrap_or(false) {
            return Err(ValidationError::PartitionerOnNonPartitionable(name.to_string()));
        }
    }
    if op.attributes().contains_own(&PARTITIONER) {
        return Err(ValidationError::PartitionerOnNonPartitionable(name.to_string()));
    }
    let supports_partitioner = op.user_operator().map(|u| u.supports_partitioner()).unwrap_or(false);
    if supports_partitioner {
        return Err(ValidationError::PartitionerOnNonPartitionable(name.to_string()));
    }
    Ok(())
}

fn check_checkpointable(plan: &Plan, name: &str) -> Result<(), ValidationError> {
    let op = plan.operator(name).expect("operator just listed");
    if op.is_checkpointable_within_app_window() {
        return Ok(());
    }
    let checkpoint_window = get_scoped(op.attributes(), plan.attributes(), &CHECKPOINT_WINDOW_COUNT).unwrap_or(1);
    let application_window = get_scoped(op.attributes(), plan.attributes(), &APPLICATION_WINDOW_COUNT).unwrap_or(1);
    if application_window != 0 && checkpoint_window % application_window == 0 {
        Ok(())
    } else {
        Err(ValidationError::CheckpointWindowMismatch { operator: name.to_string(), checkpoint_window, application_window })
    }
}

fn check_ports(plan: &Plan, name: &str, oio_candidates: &mut Vec<OperatorId>) -> Result<(), ValidationError> {
    let op = plan.operator(name).expect("operator just listed");
    let mut needs_oio = false;

    for port in op.ports_of(PortKind::Input) {
        let stream_id = op.input_stream(port.field_name());
        match stream_id {
            None if !port.is_optional() => {
                return Err(ValidationError::RequiredInputUnconnected { operator: name.to_string(), port: port.field_name().to_string() });
            }
            Some(stream_id) => {
                if let Some(stream) = plan.stream(stream_id) {
                    if stream.locality() == Locality::ThreadLocal && op.input_count() > 1 {
                        needs_oio = true;
                    }
                }
            }
            None => {}
        }
    }
    if needs_oio {
        oio_candidates.push(op.id());
    }

    let mut has_non_optional_output = false;
    for port in op.ports_of(PortKind::Output) {
        if op.output_stream(port.field_name()).is_none() {
            if !port.is_optional() {
                return Err(ValidationError::RequiredOutputUnconnected { operator: name.to_string(), port: port.field_name().to_string() });
            }
        }
        if !port.is_optional() {
            has_non_optional_output = true;
        }
    }
    if has_non_optional_output && op.output_streams().is_empty() {
        return Err(ValidationError::MissingOutputStream(name.to_string()));
    }

    Ok(())
}

/// OIO validation for one operator.
///
/// The OIO root lookup is inlined via `oio_root_of`, which recurses upward
/// through single-input `THREAD_LOCAL` chains; both fields are memoized
/// per operator (`oio_visited`/`oio_root`) to avoid repeated work and to
/// keep "not yet visited" distinguishable from "visited, root is self"
/// rather than overloading one nullable field as both sentinel and payload.
fn validate_oio(plan: &mut Plan, id: OperatorId) -> Result<(), ValidationError> {
    if plan.operator_by_id(id).and_then(|op| op.scratch().oio_root).is_some() {
        return Ok(());
    }

    let op = plan.operator_by_id(id).expect("oio candidate exists");
    let name = op.name().to_string();
    let stream_ids: Vec<String> = op.input_streams().values().cloned().collect();

    let mut common_root: Option<OperatorId> = None;
    for stream_id in &stream_ids {
        let stream = plan.stream(stream_id).expect("bound stream exists");
        if stream.locality() != Locality::ThreadLocal {
            return Err(ValidationError::OioLocalityMismatch { operator: name.clone(), stream: stream_id.clone() });
        }
        let Some(source) = stream.source() else {
            return Err(ValidationError::DanglingStream(stream_id.clone()));
        };
        let root = oio_root_of(plan, source.operator)?;
        match common_root {
            None => common_root = Some(root),
            Some(existing) if existing == root => {}
            Some(existing) => {
                let root_a = plan.operator_by_id(existing).map(|o| o.name().to_string()).unwrap_or_default();
                let root_b = plan.operator_by_id(root).map(|o| o.name().to_string()).unwrap_or_default();
                return Err(ValidationError::OioRootDivergence { operator: name, root_a, root_b });
            }
        }
    }

    let op = plan.operator_by_id_mut(id).expect("oio candidate exists");
    op.scratch_mut().oio_visited = true;
    op.scratch_mut().oio_root = common_root;
    Ok(())
}

fn oio_root_of(plan: &mut Plan, id: OperatorId) -> Result<OperatorId, ValidationError> {
    {
        let op = plan.operator_by_id(id).expect("operator exists");
        if op.scratch().oio_visited {
            return Ok(op.scratch().oio_root.unwrap_or(id));
        }
    }
    let input_count = plan.operator_by_id(id).expect("operator exists").input_count();
    if input_count == 0 {
        let op = plan.operator_by_id_mut(id).unwrap();
        op.scratch_mut().oio_visited = true;
        op.scratch_mut().oio_root = Some(id);
        return Ok(id);
    }
    if input_count == 1 {
        let stream_id = {
            let op = plan.operator_by_id(id).expect("operator exists");
            op.input_streams().values().next().cloned().expect("single input has a stream")
        };
        let (locality, source) = {
            let stream = plan.stream(&stream_id).expect("bound stream exists");
            let Some(source) = stream.source() else {
                return Err(ValidationError::DanglingStream(stream_id.clone()));
            };
            (stream.locality(), source.operator)
        };
        let root = if locality == Locality::ThreadLocal { oio_root_of(plan, source)? } else { id };
        let op = plan.operator_by_id_mut(id).unwrap();
        op.scratch_mut().oio_visited = true;
        op.scratch_mut().oio_root = Some(root);
        return Ok(root);
    }
    validate_oio(plan, id)?;
    Ok(plan.operator_by_id(id).unwrap().scratch().oio_root.unwrap_or(id))
}

struct TarjanFrame {
    node: OperatorId,
    successors: Vec<OperatorId>,
    pos: usize,
}

fn successors(plan: &Plan, id: OperatorId) -> Vec<OperatorId> {
    let mut result = Vec::new();
    if let Some(op) = plan.operator_by_id(id) {
        for stream_id in op.output_streams().values() {
            if let Some(stream) = plan.stream(stream_id) {
                for sink in stream.sinks() {
                    result.push(sink.operator);
                }
            }
        }
    }
    result
}

/// Runs Tarjan's SCC algorithm over the whole plan, returning every
/// strongly-connected component of size > 1, plus every self-loop as a
/// singleton.
fn run_tarjan(plan: &mut Plan) -> Vec<Vec<OperatorId>> {
    let mut index_counter: usize = 0;
    let mut tarjan_stack: Vec<OperatorId> = Vec::new();
    let mut cycles: Vec<Vec<OperatorId>> = Vec::new();

    let ids: Vec<OperatorId> = plan.operators().map(|op| op.id()).collect();
    for id in ids {
        if plan.operator_by_id(id).unwrap().scratch().tarjan_index.is_none() {
            strongconnect(plan, id, &mut index_counter, &mut tarjan_stack, &mut cycles);
        }
    }
    cycles
}

fn strongconnect(plan: &mut Plan, start: OperatorId, index_counter: &mut usize, tarjan_stack: &mut Vec<OperatorId>, cycles: &mut Vec<Vec<OperatorId>>) {
    let mut frames: Vec<TarjanFrame> = vec![open_frame(plan, start, index_counter, tarjan_stack)];

    while let Some(frame) = frames.last_mut() {
        if frame.pos < frame.successors.len() {
            let successor = frame.successors[frame.pos];
            frame.pos += 1;
            let node = frame.node;

            if successor == node {
                cycles.push(vec![successor]);
                continue;
            }

            let successor_index = plan.operator_by_id(successor).unwrap().scratch().tarjan_index;
            match successor_index {
                None => {
                    frames.push(open_frame(plan, successor, index_counter, tarjan_stack));
                }
                Some(idx) => {
                    if plan.operator_by_id(successor).unwrap().scratch().on_stack {
                        let op = plan.operator_by_id_mut(node).unwrap();
                        let scratch = op.scratch_mut();
                        scratch.tarjan_lowlink = scratch.tarjan_lowlink.min(idx);
                    }
                }
            }
        } else {
            let node = frame.node;
            let lowlink = plan.operator_by_id(node).unwrap().scratch().tarjan_lowlink;
            let index = plan.operator_by_id(node).unwrap().scratch().tarjan_index.unwrap();
            frames.pop();

            if let Some(parent) = frames.last() {
                let parent_node = parent.node;
                let op = plan.operator_by_id_mut(parent_node).unwrap();
                let scratch = op.scratch_mut();
                scratch.tarjan_lowlink = scratch.tarjan_lowlink.min(lowlink);
            }

            if lowlink == index {
                let mut component = Vec::new();
                loop {
                    let popped = tarjan_stack.pop().expect("node is on the tarjan stack");
                    plan.operator_by_id_mut(popped).unwrap().scratch_mut().on_stack = false;
                    component.push(popped);
                    if popped == node {
                        break;
                    }
                }
                if component.len() > 1 {
                    cycles.push(component);
                }
            }
        }
    }
}

fn open_frame(plan: &mut Plan, node: OperatorId, index_counter: &mut usize, tarjan_stack: &mut Vec<OperatorId>) -> TarjanFrame {
    let idx = *index_counter;
    *index_counter += 1;
    let op = plan.operator_by_id_mut(node).unwrap();
    let scratch = op.scratch_mut();
    scratch.tarjan_index = Some(idx);
    scratch.tarjan_lowlink = idx;
    scratch.on_stack = true;
    tarjan_stack.push(node);
    let successors = successors(plan, node);
    TarjanFrame { node, successors, pos: 0 }
}

fn check_dangling_streams(plan: &Plan) -> Result<(), ValidationError> {
    for stream in plan.streams() {
        if stream.is_dangling() {
            return Err(ValidationError::DanglingStream(stream.id().to_string()));
        }
    }
    Ok(())
}

fn check_root_typing(plan: &Plan) -> Result<(), ValidationError> {
    for name in plan.roots() {
        let op = plan.operator(name).expect("root operator is registered");
        let is_input_operator = op.user_operator().map(|u| u.is_input_operator()).unwrap_or(false);
        if !is_input_operator {
            return Err(ValidationError::NonInputRoot(name.to_string()));
        }
    }
    Ok(())
}

/// Propagates processing mode downstream in topological order. The graph
/// is known acyclic by this point, so a simple
/// in-degree count (over distinct upstream *operators*, not streams) give
/// a valid visitation order via Kahn's algorithm.
fn propagate_processing_modes(plan: &mut Plan) -> Result<(), ValidationError> {
    use std::collections::{HashMap, VecDeque};

    let ids: Vec<OperatorId> = plan.operators().map(|op| op.id()).collect();
    let mut upstream: HashMap<OperatorId, Vec<OperatorId>> = HashMap::new();
    for &id in &ids {
        let mut sources = Vec::new();
        if let Some(op) = plan.operator_by_id(id) {
            for stream_id in op.input_streams().values() {
                if let Some(stream) = plan.stream(stream_id) {
                    if let Some(source) = stream.source() {
                        sources.push(source.operator);
                    }
                }
            }
        }
        upstream.insert(id, sources);
    }

    let mut in_degree: HashMap<OperatorId, usize> = HashMap::new();
    for &id in &ids {
        in_degree.insert(id, upstream[&id].len());
    }
    let mut queue: VecDeque<OperatorId> = ids.iter().copied().filter(|id| in_degree[id] == 0).collect();

    let mut downstream: HashMap<OperatorId, Vec<OperatorId>> = HashMap::new();
    for &id in &ids {
        for &up in &upstream[&id] {
            downstream.entry(up).or_default().push(id);
        }
    }

    let mut visited = 0usize;
    while let Some(id) = queue.pop_front() {
        visited += 1;
        for &up in &upstream[&id] {
            apply_processing_mode_edge(plan, up, id)?;
        }
        for &down in downstream.get(&id).into_iter().flatten() {
            let entry = in_degree.get_mut(&down).unwrap();
            *entry -= 1;
            if *entry == 0 {
                queue.push_back(down);
            }
        }
    }
    debug_assert_eq!(visited, ids.len(), "graph must be acyclic by this pass");
    Ok(())
}

fn apply_processing_mode_edge(plan: &mut Plan, upstream_id: OperatorId, downstream_id: OperatorId) -> Result<(), ValidationError> {
    let upstream_mode = resolve_processing_mode(plan, upstream_id);
    let Some(upstream_mode) = upstream_mode else { return Ok(()) };
    let downstream_mode = resolve_processing_mode(plan, downstream_id);

    match downstream_mode {
        None => match upstream_mode {
            ProcessingMode::AtMostOnce => set_inferred_mode(plan, downstream_id, ProcessingMode::AtMostOnce),
            ProcessingMode::ExactlyOnce => {
                let upstream_name = plan.operator_by_id(upstream_id).map(|o| o.name().to_string()).unwrap_or_default();
                let downstream_name = plan.operator_by_id(downstream_id).map(|o| o.name().to_string()).unwrap_or_default();
                return Err(ValidationError::ProcessingModeConflict {
                    operator: downstream_name,
                    upstream: upstream_name,
                    upstream_mode,
                    downstream_mode: ProcessingMode::ExactlyOnce,
                });
            }
            ProcessingMode::AtLeastOnce => {}
        },
        Some(downstream_mode) => {
            let conflict = match upstream_mode {
                ProcessingMode::AtMostOnce => downstream_mode != ProcessingMode::AtMostOnce,
                ProcessingMode::ExactlyOnce => downstream_mode != ProcessingMode::AtMostOnce,
                ProcessingMode::AtLeastOnce => false,
            };
            if conflict {
                let upstream_name = plan.operator_by_id(upstream_id).map(|o| o.name().to_string()).unwrap_or_default();
                let downstream_name = plan.operator_by_id(downstream_id).map(|o| o.name().to_string()).unwrap_or_default();
                return Err(ValidationError::ProcessingModeConflict { operator: downstream_name, upstream: upstream_name, upstream_mode, downstream_mode });
            }
        }
    }
    Ok(())
}

fn resolve_processing_mode(plan: &Plan, id: OperatorId) -> Option<ProcessingMode> {
    let op = plan.operator_by_id(id)?;
    op.processing_mode().or_else(|| get_scoped(op.attributes(), plan.attributes(), &PROCESSING_MODE))
}

fn set_inferred_mode(plan: &mut Plan, id: OperatorId, mode: ProcessingMode) {
    if let Some(op) = plan.operator_by_id_mut(id) {
        op.set_processing_mode_inferred(mode);
    }
}

fn infer_metrics(plan: &mut Plan) {
    let names: Vec<String> = plan.operators().map(|op| op.name().to_string()).collect();
    for name in names {
        let Some(op) = plan.operator_mut(&name) else { continue };
        let dimensions_scheme = op.attributes().get_own(&DIMENSIONS_SCHEME);

        let mut aggregator = if op.attributes().contains_own(&METRICS_AGGREGATOR) {
            op.attributes().get_own(&METRICS_AGGREGATOR)
        } else {
            op.user_operator().and_then(infer_metric_aggregator)
        };

        if let (Some(aggregator), Some(scheme)) = (aggregator.as_mut(), dimensions_scheme) {
            aggregator.set_dimensions_scheme(scheme);
        }
        if let Some(aggregator) = aggregator {
            op.set_metric_aggregator(aggregator);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{PortMappingDescriptor, UserOperator};
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

    fn source(descriptor: PortMappingDescriptor) -> Box<dyn UserOperator> {
        Box::new(TestOp { descriptor, is_input_operator: true })
    }

    fn passthrough(descriptor: PortMappingDescriptor) -> Box<dyn UserOperator> {
        Box::new(TestOp { descriptor, is_input_operator: false })
    }

    #[test]
    fn self_loop_reported_as_singleton_cycle() {
        let mut plan = Plan::new();
        plan.add_operator("A", passthrough(PortMappingDescriptor::builder().input("in1").output("out1").build().unwrap())).unwrap();
        plan.add_stream("s1").unwrap();
        plan.set_source("s1", "A", "out1").unwrap();
        plan.add_sink("s1", "A", "in1").unwrap();

        let err = plan.validate().unwrap_err();
        match err {
            ValidationError::Cycle { operators } => assert_eq!(operators, vec!["A".to_string()]),
            other => panic!("expected a self-loop cycle, got {other:?}"),
        }
    }

    #[test]
    fn validate_is_idempotent_on_a_passing_plan() {
        let mut plan = Plan::new();
        plan.add_operator("A", source(PortMappingDescriptor::builder().output("out1").build().unwrap())).unwrap();
        plan.add_operator("B", passthrough(PortMappingDescriptor::builder().input("in1").build().unwrap())).unwrap();
        plan.add_stream("s1").unwrap();
        plan.set_source("s1", "A", "out1").unwrap();
        plan.add_sink("s1", "B", "in1").unwrap();
        plan.operator_mut("A").unwrap().set_processing_mode(ProcessingMode::AtMostOnce);

        plan.validate().unwrap();
        let mode_after_first = plan.operator("B").unwrap().processing_mode();
        assert_eq!(mode_after_first, Some(ProcessingMode::AtMostOnce));
        plan.validate().unwrap();
        assert_eq!(plan.operator("B").unwrap().processing_mode(), mode_after_first);
        assert_eq!(plan.roots().collect::<Vec<_>>(), vec!["A"]);
    }

    #[test]
    fn oio_root_converges_on_a_shared_thread_local_ancestor() {
        // R fans out on two output ports to X and Y; both chains feed B's
        // two inputs over THREAD_LOCAL streams and must resolve to the
        // same OIO root (R) for validation to succeed.
        let mut plan = Plan::new();
        plan.add_operator("R", source(PortMappingDescriptor::builder().output("out_a").output("out_b").build().unwrap())).unwrap();
        plan.add_operator("X", passthrough(PortMappingDescriptor::builder().input("in1").output("out1").build().unwrap())).unwrap();
        plan.add_operator("Y", passthrough(PortMappingDescriptor::builder().input("in1").output("out1").build().unwrap())).unwrap();
        plan.add_operator("B", passthrough(PortMappingDescriptor::builder().input("in1").input("in2").build().unwrap())).unwrap();

        plan.add_stream("s1").unwrap();
        plan.set_source("s1", "R", "out_a").unwrap();
        plan.add_sink("s1", "X", "in1").unwrap();
        plan.set_stream_locality("s1", Locality::ThreadLocal).unwrap();

        plan.add_stream("s2").unwrap();
        plan.set_source("s2", "X", "out1").unwrap();
        plan.add_sink("s2", "B", "in1").unwrap();
        plan.set_stream_locality("s2", Locality::ThreadLocal).unwrap();

        plan.add_stream("s3").unwrap();
        plan.set_source("s3", "R", "out_b").unwrap();
        plan.add_sink("s3", "Y", "in1").unwrap();
        plan.set_stream_locality("s3", Locality::ThreadLocal).unwrap();

        plan.add_stream("s4").unwrap();
        plan.set_source("s4", "Y", "out1").unwrap();
        plan.add_sink("s4", "B", "in2").unwrap();
        plan.set_stream_locality("s4", Locality::ThreadLocal).unwrap();

        plan.validate().unwrap();
        let r_id = plan.operator("R").unwrap().id();
        assert_eq!(plan.operator("B").unwrap().scratch().oio_root, Some(r_id));
    }
}
