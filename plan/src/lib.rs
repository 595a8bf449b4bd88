//! The logical plan core of a distributed streaming dataflow engine.
//!
//! This crate builds and validates the *logical* dataflow graph: typed,
//! port-based operators wired together by named streams, a scoped
//! attribute system for configuration, and a multi-pass validator that
//! checks structural invariants (cycles, dangling streams, root typing,
//! one-input-operator thread-locality, processing-mode propagation) before
//! a plan is handed to whatever does physical placement.
//!
//! **Graph construction**: [`plan`] owns the [`plan::Plan`] container
//! (operators, streams, and the incrementally tracked root set) plus the
//! builder API used to assemble one.
//!
//! **Operators**: [`operator`] holds per-operator metadata and id
//! allocation; [`descriptor`] is the reflection-free contract
//! ([`descriptor::UserOperator`]) an operator author implements to declare
//! its ports, auto-metrics, and field constraints; [`port`] and [`stream`]
//! describe the typed attachment points and the edges between them.
//!
//! **Configuration**: [`attribute`] defines the scoped, process-unique
//! [`attribute::AttributeKey`] system; [`config`] declares the plan- and
//! operator-level keys this crate understands.
//!
//! **Validation**: [`validator`] runs the full structural check in one
//! pass, reachable as [`plan::Plan::validate`]. [`metrics`] infers default
//! metric aggregators for operators that declare auto-metric fields but no
//! explicit aggregator.
//!
//! **Serialization**: [`storage`] is the serialize/deserialize boundary;
//! plan metadata travels through `serde`/`bincode` directly, while each
//! operator instance's bytes are handed to an external
//! [`storage::StorageAgent`], mirroring how a plan is actually persisted
//! and later rehydrated on another host.
//!
//! [`error`] collects the three error enums construction, validation, and
//! serialization can each raise. [`ordered_map`] is a small internal
//! insertion-ordered map used throughout so that two plans built with
//! identical calls serialize identically.

mod ordered_map;

pub mod attribute;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod metrics;
pub mod operator;
pub mod plan;
pub mod port;
pub mod storage;
pub mod stream;
mod validator;

pub use attribute::{AttributeKey, AttributeMap};
pub use descriptor::{AutoMetricField, AutoMetricKind, PortMappingDescriptor, PortMappingDescriptorBuilder, PortSpec, UserOperator};
pub use error::{ConstraintViolation, PlanError, SerializationError, ValidationError};
pub use metrics::{AggregatorKind, MetricAggregatorMeta};
pub use operator::{OperatorId, OperatorMeta, ProcessingMode};
pub use plan::Plan;
pub use port::{Locality, PortDescriptor, PortKind, SliderMeta, UnifierMeta};
pub use storage::{deserialize_plan, serialize_plan, FileStorageAgent, OperatorFactory, PlanSnapshot, StorageAgent};
pub use stream::{PortRef, StreamMeta};
