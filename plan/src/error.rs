//! Error taxonomy for the logical plan core.
//!
//! Two families: [`PlanError`] for synchronous builder/graph-wiring
//! failures, and [`ValidationError`] for everything `Plan::validate` can
//! report. Both are terminal for the call that raised them: a failed
//! builder call leaves the plan exactly as it was before the call, which
//! is why every mutator below validates its arguments before touching any
//! state. [`SerializationError`] covers storage-agent I/O failures.

use thiserror::Error;

/// A constraint violation reported by an operator's field-level checker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintViolation {
    /// Dotted path to the offending field, e.g. `"windowCount"`.
    pub path: String,
    /// Human-readable explanation.
    pub message: String,
}

/// Errors raised synchronously while building a plan.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// `addOperator` called with a name already bound to a different operator.
    #[error("operator name already in use: {0}")]
    DuplicateOperatorName(String),

    /// `addStream` called with an id already bound to a stream.
    #[error("stream id already in use: {0}")]
    DuplicateStreamId(String),

    /// Two ports on the same operator map to the same field name.
    #[error("duplicate port name on operator {operator}: {port}")]
    DuplicatePortName {
        /// Owning operator's name.
        operator: String,
        /// The colliding port name.
        port: String,
    },

    /// `setSource` called on an output port already carrying a stream.
    #[error("output port {operator}.{port} already has a source stream")]
    SourceAlreadyBound {
        /// Owning operator's name.
        operator: String,
        /// The output port's field name.
        port: String,
    },

    /// `addSink` called on an input port already bound in some stream.
    #[error("input port {operator}.{port} already has a sink stream")]
    SinkAlreadyBound {
        /// Owning operator's name.
        operator: String,
        /// The input port's field name.
        port: String,
    },

    /// A port name was referenced that the operator does not declare.
    #[error("operator {operator} has no port named {port}")]
    UnknownPort {
        /// Owning operator's name.
        operator: String,
        /// The requested port name.
        port: String,
    },

    /// A referenced operator is not registered in the plan.
    #[error("no operator named {0} in this plan")]
    UnknownOperator(String),

    /// A referenced stream is not registered in the plan.
    #[error("no stream with id {0} in this plan")]
    UnknownStream(String),

    /// An attribute was looked up or set with the wrong runtime type.
    #[error("attribute {0} stored with an incompatible type")]
    AttributeTypeMismatch(String),
}

/// Errors raised from [`crate::plan::Plan::validate`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    /// A required (non-optional) input port has no sink stream attached.
    #[error("Input port connection required: {operator}.{port}")]
    RequiredInputUnconnected {
        /// Owning operator's name.
        operator: String,
        /// The unconnected input port.
        port: String,
    },

    /// A required (non-optional) output port has no source stream attached.
    #[error("Output port connection required: {operator}.{port}")]
    RequiredOutputUnconnected {
        /// Owning operator's name.
        operator: String,
        /// The unconnected output port.
        port: String,
    },

    /// An operator has declared non-optional outputs but produced no output streams at all.
    #[error("operator {0} has non-optional outputs but produced no output stream")]
    MissingOutputStream(String),

    /// One or more field-level constraints failed on an operator.
    #[error("operator {operator} failed one or more constraints")]
    ConstraintViolations {
        /// Owning operator's name.
        operator: String,
        /// The individual violations, in checker order.
        violations: Vec<ConstraintViolation>,
    },

    /// A cycle was found among operators reachable via stream edges.
    #[error("cycle detected among operators")]
    Cycle {
        /// Operator names participating in the cycle, in Tarjan pop order.
        operators: Vec<String>,
    },

    /// A stream has no source, no sinks, or both.
    #[error("stream {0} is dangling (missing source and/or sinks)")]
    DanglingStream(String),

    /// A root operator (no inbound stream) does not support the input-operator capability.
    #[error("root operator {0} is not an input operator")]
    NonInputRoot(String),

    /// A `THREAD_LOCAL` input stream's locality requirement was violated.
    #[error("operator {operator} has a non-THREAD_LOCAL input among its THREAD_LOCAL fan-in: {stream}")]
    OioLocalityMismatch {
        /// Owning operator's name.
        operator: String,
        /// The offending stream id.
        stream: String,
    },

    /// Two `THREAD_LOCAL` inputs of one operator trace to distinct OIO roots.
    #[error("operator {operator} has THREAD_LOCAL inputs tracing to distinct OIO roots: {root_a} and {root_b}")]
    OioRootDivergence {
        /// Owning operator's name.
        operator: String,
        /// First OIO root encountered.
        root_a: String,
        /// Second, diverging OIO root.
        root_b: String,
    },

    /// Downstream processing mode is incompatible with its upstream's.
    #[error("processing mode conflict at operator {operator}: upstream {upstream} is {upstream_mode:?}, downstream is {downstream_mode:?}")]
    ProcessingModeConflict {
        /// The downstream operator whose mode conflicts.
        operator: String,
        /// The upstream operator supplying the conflicting mode.
        upstream: String,
        /// Upstream's processing mode.
        upstream_mode: crate::operator::ProcessingMode,
        /// Downstream's (incompatible) processing mode.
        downstream_mode: crate::operator::ProcessingMode,
    },

    /// A non-partitionable operator has a partition-related attribute or capability set.
    #[error("operator {0} is not partitionable but declares a partitioner")]
    PartitionerOnNonPartitionable(String),

    /// `CHECKPOINT_WINDOW_COUNT % APPLICATION_WINDOW_COUNT != 0` on an operator requiring it.
    #[error("operator {operator} is not checkpointable within the application window: checkpoint window {checkpoint_window} is not a multiple of application window {application_window}")]
    CheckpointWindowMismatch {
        /// Owning operator's name.
        operator: String,
        /// `CHECKPOINT_WINDOW_COUNT` value.
        checkpoint_window: u32,
        /// `APPLICATION_WINDOW_COUNT` value.
        application_window: u32,
    },
}

/// Errors surfaced by a [`crate::storage::StorageAgent`] during serialize/deserialize.
#[derive(Debug, Error)]
pub enum SerializationError {
    /// The storage agent reported an I/O failure.
    #[error("storage agent I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The byte-stream encoding/decoding failed.
    #[error("encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    /// No bytes were found under the requested storage key.
    #[error("no stored operator instance under key {0}")]
    MissingKey(String),

    /// No factory was registered to rehydrate an operator's bytes on retrieval.
    #[error("no operator factory registered for {0}")]
    UnknownOperatorKind(String),
}
