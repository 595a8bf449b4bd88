//! End-to-end validator scenarios.
//!
//! Each test wires a small [`Plan`] by hand and checks `validate()`'s
//! outcome: a passing linear plan, a rejected cycle, an unconnected
//! required input, a processing-mode conflict, and a thread-local
//! fan-in OIO-root divergence.

use streamplan::descriptor::{AutoMetricField, PortMappingDescriptor};
use streamplan::error::{SerializationError, ValidationError};
use streamplan::operator::ProcessingMode;
use streamplan::plan::Plan;
use streamplan::port::Locality;
use streamplan::UserOperator;

#[derive(Debug)]
struct TestOp {
    descriptor: PortMappingDescriptor,
    is_input_operator: bool,
    auto_metrics: Vec<AutoMetricField>,
}

impl TestOp {
    fn new(descriptor: PortMappingDescriptor) -> Box<dyn UserOperator> {
        Box::new(TestOp { descriptor, is_input_operator: false, auto_metrics: Vec::new() })
    }

    fn source(descriptor: PortMappingDescriptor) -> Box<dyn UserOperator> {
        Box::new(TestOp { descriptor, is_input_operator: true, auto_metrics: Vec::new() })
    }

    fn with_metrics(descriptor: PortMappingDescriptor, auto_metrics: Vec<AutoMetricField>) -> Box<dyn UserOperator> {
        Box::new(TestOp { descriptor, is_input_operator: true, auto_metrics })
    }
}

impl UserOperator for TestOp {
    fn port_mapping(&self) -> PortMappingDescriptor {
        self.descriptor.clone()
    }
    fn auto_metrics(&self) -> Vec<AutoMetricField> {
        self.auto_metrics.clone()
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

#[test]
fn s1_linear_plan_passes() {
    let mut plan = Plan::new();
    plan.add_operator("A", TestOp::source(PortMappingDescriptor::builder().output("out1").build().unwrap())).unwrap();
    plan.add_operator("B", TestOp::new(PortMappingDescriptor::builder().input("in1").output("out1").build().unwrap())).unwrap();
    plan.add_operator("C", TestOp::new(PortMappingDescriptor::builder().input("in1").build().unwrap())).unwrap();

    plan.add_stream("s1").unwrap();
    plan.set_source("s1", "A", "out1").unwrap();
    plan.add_sink("s1", "B", "in1").unwrap();

    plan.add_stream("s2").unwrap();
    plan.set_source("s2", "B", "out1").unwrap();
    plan.add_sink("s2", "C", "in1").unwrap();

    plan.validate().unwrap();
    assert_eq!(plan.roots().collect::<Vec<_>>(), vec!["A"]);
}

#[test]
fn s2_cycle_rejected() {
    let mut plan = Plan::new();
    plan.add_operator("A", TestOp::source(PortMappingDescriptor::builder().output("out1").build().unwrap())).unwrap();
    plan.add_operator(
        "B",
        TestOp::new(PortMappingDescriptor::builder().input("in1").input("in2").output("out1").build().unwrap()),
    )
    .unwrap();
    plan.add_operator("C", TestOp::new(PortMappingDescriptor::builder().input("in1").output("out1").build().unwrap())).unwrap();

    plan.add_stream("s1").unwrap();
    plan.set_source("s1", "A", "out1").unwrap();
    plan.add_sink("s1", "B", "in1").unwrap();

    plan.add_stream("s2").unwrap();
    plan.set_source("s2", "B", "out1").unwrap();
    plan.add_sink("s2", "C", "in1").unwrap();

    plan.add_stream("s3").unwrap();
    plan.set_source("s3", "C", "out1").unwrap();
    plan.add_sink("s3", "B", "in2").unwrap();

    let err = plan.validate().unwrap_err();
    match err {
        ValidationError::Cycle { operators } => {
            let mut operators = operators;
            operators.sort();
            assert_eq!(operators, vec!["B".to_string(), "C".to_string()]);
        }
        other => panic!("expected a cycle error, got {other:?}"),
    }
}

#[test]
fn s3_unconnected_required_input() {
    let mut plan = Plan::new();
    plan.add_operator("A", TestOp::source(PortMappingDescriptor::builder().output("out1").build().unwrap())).unwrap();
    plan.add_operator(
        "B",
        TestOp::new(PortMappingDescriptor::builder().input("in1").input_optional("in2").build().unwrap()),
    )
    .unwrap();

    plan.add_stream("s1").unwrap();
    plan.set_source("s1", "A", "out1").unwrap();
    plan.add_sink("s1", "B", "in2").unwrap();

    let err = plan.validate().unwrap_err();
    match err {
        ValidationError::RequiredInputUnconnected { operator, port } => {
            assert_eq!(operator, "B");
            assert_eq!(port, "in1");
        }
        other => panic!("expected a required-input error, got {other:?}"),
    }
    assert_eq!(err.to_string(), "Input port connection required: B.in1");
}

#[test]
fn s4_processing_mode_conflict() {
    let mut plan = Plan::new();
    plan.add_operator("A", TestOp::source(PortMappingDescriptor::builder().output("out1").build().unwrap())).unwrap();
    plan.add_operator("B", TestOp::new(PortMappingDescriptor::builder().input("in1").build().unwrap())).unwrap();

    plan.add_stream("s1").unwrap();
    plan.set_source("s1", "A", "out1").unwrap();
    plan.add_sink("s1", "B", "in1").unwrap();

    plan.operator_mut("A").unwrap().set_processing_mode(ProcessingMode::AtMostOnce);
    plan.operator_mut("B").unwrap().set_processing_mode(ProcessingMode::AtLeastOnce);

    let err = plan.validate().unwrap_err();
    match err {
        ValidationError::ProcessingModeConflict { operator, .. } => assert_eq!(operator, "B"),
        other => panic!("expected a processing-mode conflict, got {other:?}"),
    }
}

#[test]
fn s5_thread_local_fan_in_mismatch() {
    let mut plan = Plan::new();
    plan.add_operator("R1", TestOp::source(PortMappingDescriptor::builder().output("out1").build().unwrap())).unwrap();
    plan.add_operator("R2", TestOp::source(PortMappingDescriptor::builder().output("out1").build().unwrap())).unwrap();
    plan.add_operator("X", TestOp::new(PortMappingDescriptor::builder().input("in1").output("out1").build().unwrap())).unwrap();
    plan.add_operator("B", TestOp::new(PortMappingDescriptor::builder().input("in1").input("in2").build().unwrap())).unwrap();

    plan.add_stream("s1").unwrap();
    plan.set_source("s1", "R1", "out1").unwrap();
    plan.add_sink("s1", "X", "in1").unwrap();
    plan.set_stream_locality("s1", Locality::ThreadLocal).unwrap();

    plan.add_stream("s2").unwrap();
    plan.set_source("s2", "X", "out1").unwrap();
    plan.add_sink("s2", "B", "in1").unwrap();
    plan.set_stream_locality("s2", Locality::ThreadLocal).unwrap();

    plan.add_stream("s3").unwrap();
    plan.set_source("s3", "R2", "out1").unwrap();
    plan.add_sink("s3", "B", "in2").unwrap();
    plan.set_stream_locality("s3", Locality::ThreadLocal).unwrap();

    let err = plan.validate().unwrap_err();
    match err {
        ValidationError::OioRootDivergence { operator, .. } => assert_eq!(operator, "B"),
        other => panic!("expected an OIO-root divergence, got {other:?}"),
    }
}

#[test]
fn s6_metric_inference_end_to_end() {
    let mut plan = Plan::new();
    plan.add_operator(
        "A",
        TestOp::with_metrics(
            PortMappingDescriptor::builder().output_optional("out1").build().unwrap(),
            vec![AutoMetricField::integral("bytesIn"), AutoMetricField::floating("rate")],
        ),
    )
    .unwrap();

    plan.validate().unwrap();

    let aggregator = plan.operator("A").unwrap().metric_aggregator().expect("aggregator inferred");
    assert_eq!(aggregator.aggregators().len(), 2);
    assert!(aggregator.aggregators().get("bytesIn").is_some());
    assert!(aggregator.aggregators().get("rate").is_some());
}

#[test]
fn metric_inference_bundles_dimensions_scheme_attribute() {
    use streamplan::config::DIMENSIONS_SCHEME;

    let mut plan = Plan::new();
    plan.add_operator(
        "A",
        TestOp::with_metrics(PortMappingDescriptor::builder().output_optional("out1").build().unwrap(), vec![AutoMetricField::integral("bytesIn")]),
    )
    .unwrap();
    plan.operator_mut("A").unwrap().attributes_mut().put(&DIMENSIONS_SCHEME, "time=MINUTES".to_string()).unwrap();

    plan.validate().unwrap();

    let aggregator = plan.operator("A").unwrap().metric_aggregator().expect("aggregator inferred");
    assert_eq!(aggregator.dimensions_scheme(), Some("time=MINUTES"));
}
