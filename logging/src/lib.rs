//! Event model for the logical plan.
//!
//! The plan core and its runtime collaborators communicate operational
//! changes (operator lifecycle, container lifecycle, plan mutation) as a
//! closed family of tagged events rather than through a deep class
//! hierarchy. Consumers pattern-match on [`PlanEvent`]; no dynamic dispatch
//! is required.
//!
//! This mirrors the split of `timely`'s own event stream into a standalone
//! crate (`timely_logging`): the event types have no dependency on the
//! plan's graph data structures, so they live here and the plan crate
//! depends on them, not the reverse.

#![forbid(missing_docs)]

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Global, monotonically increasing event id sequencer.
///
/// The only state shared across producer threads: a single
/// atomic counter, incremented with `fetch_add`. Ordering between events
/// from different threads is not otherwise guaranteed, only that every
/// event receives a strictly larger id than any event allocated before it
/// started.
static NEXT_EVENT_ID: AtomicI64 = AtomicI64::new(0);

/// Allocates the next event id.
fn next_event_id() -> i64 {
    NEXT_EVENT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Severity of a [`PlanEvent`], used by downstream log sinks to filter or
/// route without inspecting the event payload.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub enum LogLevel {
    /// Routine lifecycle notification.
    Info,
    /// Unexpected but non-fatal condition.
    Warn,
    /// A failure worth surfacing to an operator.
    Error,
}

/// Fields shared by every [`PlanEvent`], regardless of variant.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EventHeader {
    /// Monotonic id, unique within this process.
    pub id: i64,
    /// Milliseconds since the Unix epoch at event construction.
    pub timestamp_millis: u64,
    /// Severity for log routing.
    pub level: LogLevel,
    /// Optional human-readable explanation, e.g. a failure message.
    pub reason: Option<String>,
}

impl EventHeader {
    fn new(level: LogLevel, reason: Option<String>) -> Self {
        let timestamp_millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        EventHeader { id: next_event_id(), timestamp_millis, level, reason }
    }
}

/// A change to a named, value-typed operator property.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SetOperatorProperty {
    /// Name of the affected operator.
    pub operator_name: String,
    /// Name of the property that changed.
    pub property: String,
    /// New value, as its serialized string form.
    pub value: String,
}

/// A change in the number of partitions backing an operator.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Partition {
    /// Name of the repartitioned operator.
    pub operator_name: String,
    /// Partition count before the change.
    pub old_count: u32,
    /// Partition count after the change.
    pub new_count: u32,
}

/// An operator was added to the plan.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CreateOperator {
    /// Name of the created operator.
    pub operator_name: String,
    /// Process-global id assigned to the operator.
    pub operator_id: i64,
}

/// An operator was removed from the plan.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RemoveOperator {
    /// Name of the removed operator.
    pub operator_name: String,
    /// Process-global id the operator held.
    pub operator_id: i64,
}

/// A physical operator instance began executing inside a container.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StartOperator {
    /// Name of the logical operator.
    pub operator_name: String,
    /// Process-global id of the logical operator.
    pub operator_id: i64,
    /// Container the instance started in.
    pub container_id: String,
    /// Failure id, if this start is a recovery from a prior failure.
    pub failure_id: Option<i64>,
}

/// A physical operator instance stopped executing.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StopOperator {
    /// Name of the logical operator.
    pub operator_name: String,
    /// Process-global id of the logical operator.
    pub operator_id: i64,
    /// Container the instance ran in.
    pub container_id: String,
    /// Failure id, if the stop was caused by a failure.
    pub failure_id: Option<i64>,
}

/// A change to a physical (post-launch) operator property.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SetPhysicalOperatorProperty {
    /// Name of the logical operator.
    pub operator_name: String,
    /// Process-global id of the logical operator.
    pub operator_id: i64,
    /// Name of the property that changed.
    pub property: String,
    /// New value, as its serialized string form.
    pub value: String,
}

/// A container started on a node.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StartContainer {
    /// Id of the started container.
    pub container_id: String,
    /// Id of the node hosting the container.
    pub node_id: String,
}

/// A container stopped.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StopContainer {
    /// Id of the stopped container.
    pub container_id: String,
    /// Process exit status, if known.
    pub exit_status: Option<i32>,
    /// Failure id, if the stop was caused by a failure.
    pub failure_id: Option<i64>,
}

/// A request to change the logical plan while it is running.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ChangeLogicalPlan {
    /// Opaque description of the requested change, serialized by the
    /// caller (the plan core does not interpret it).
    pub request: String,
}

/// An operator instance raised an error.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct OperatorError {
    /// Name of the logical operator.
    pub operator_name: String,
    /// Process-global id of the logical operator.
    pub operator_id: i64,
    /// Container the instance ran in.
    pub container_id: String,
    /// The error message reported by the operator.
    pub error_message: String,
    /// Failure id assigned to this error.
    pub failure_id: i64,
}

/// A container-level error, not attributable to a single operator.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ContainerError {
    /// Id of the container that errored.
    pub container_id: String,
    /// The error message reported by the container.
    pub error_message: String,
}

/// The closed family of operational events emitted by the plan and its
/// runtime collaborators.
///
/// Each variant carries only its payload; the shared [`EventHeader`] is
/// stored alongside it in [`PlanEvent`] rather than duplicated into every
/// variant, collapsing what would otherwise be a deep inheritance
/// hierarchy into one tagged enum.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum PlanEventKind {
    /// See [`SetOperatorProperty`].
    SetOperatorProperty(SetOperatorProperty),
    /// See [`Partition`].
    Partition(Partition),
    /// See [`CreateOperator`].
    CreateOperator(CreateOperator),
    /// See [`RemoveOperator`].
    RemoveOperator(RemoveOperator),
    /// See [`StartOperator`].
    StartOperator(StartOperator),
    /// See [`StopOperator`].
    StopOperator(StopOperator),
    /// See [`SetPhysicalOperatorProperty`].
    SetPhysicalOperatorProperty(SetPhysicalOperatorProperty),
    /// See [`StartContainer`].
    StartContainer(StartContainer),
    /// See [`StopContainer`].
    StopContainer(StopContainer),
    /// See [`ChangeLogicalPlan`].
    ChangeLogicalPlan(ChangeLogicalPlan),
    /// See [`OperatorError`].
    OperatorError(OperatorError),
    /// See [`ContainerError`].
    ContainerError(ContainerError),
}

/// A single operational event: a shared [`EventHeader`] plus its
/// variant-specific payload.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PlanEvent {
    /// Fields common to every event.
    pub header: EventHeader,
    /// The variant-specific payload.
    pub kind: PlanEventKind,
}

impl PlanEvent {
    fn with_level(kind: PlanEventKind, level: LogLevel) -> Self {
        PlanEvent { header: EventHeader::new(level, None), kind }
    }

    fn with_reason(kind: PlanEventKind, level: LogLevel, reason: impl Into<String>) -> Self {
        PlanEvent { header: EventHeader::new(level, Some(reason.into())), kind }
    }

    /// Constructs a [`PlanEventKind::SetOperatorProperty`] event at `Info` level.
    pub fn set_operator_property(operator_name: impl Into<String>, property: impl Into<String>, value: impl Into<String>) -> Self {
        Self::with_level(
            PlanEventKind::SetOperatorProperty(SetOperatorProperty {
                operator_name: operator_name.into(),
                property: property.into(),
                value: value.into(),
            }),
            LogLevel::Info,
        )
    }

    /// Constructs a [`PlanEventKind::Partition`] event at `Info` level.
    pub fn partition(operator_name: impl Into<String>, old_count: u32, new_count: u32) -> Self {
        Self::with_level(
            PlanEventKind::Partition(Partition { operator_name: operator_name.into(), old_count, new_count }),
            LogLevel::Info,
        )
    }

    /// Constructs a [`PlanEventKind::CreateOperator`] event at `Info` level.
    pub fn create_operator(operator_name: impl Into<String>, operator_id: i64) -> Self {
        Self::with_level(
            PlanEventKind::CreateOperator(CreateOperator { operator_name: operator_name.into(), operator_id }),
            LogLevel::Info,
        )
    }

    /// Constructs a [`PlanEventKind::RemoveOperator`] event at `Info` level.
    pub fn remove_operator(operator_name: impl Into<String>, operator_id: i64) -> Self {
        Self::with_level(
            PlanEventKind::RemoveOperator(RemoveOperator { operator_name: operator_name.into(), operator_id }),
            LogLevel::Info,
        )
    }

    /// Constructs a [`PlanEventKind::StartOperator`] event at `Info` level.
    pub fn start_operator(operator_name: impl Into<String>, operator_id: i64, container_id: impl Into<String>, failure_id: Option<i64>) -> Self {
        Self::with_level(
            PlanEventKind::StartOperator(StartOperator {
                operator_name: operator_name.into(),
                operator_id,
                container_id: container_id.into(),
                failure_id,
            }),
            LogLevel::Info,
        )
    }

    /// Constructs a [`PlanEventKind::StopOperator`] event at `Warn` level.
    pub fn stop_operator(operator_name: impl Into<String>, operator_id: i64, container_id: impl Into<String>, failure_id: Option<i64>) -> Self {
        Self::with_level(
            PlanEventKind::StopOperator(StopOperator {
                operator_name: operator_name.into(),
                operator_id,
                container_id: container_id.into(),
                failure_id,
            }),
            LogLevel::Warn,
        )
    }

    /// Constructs a [`PlanEventKind::SetPhysicalOperatorProperty`] event at `Info` level.
    pub fn set_physical_operator_property(operator_name: impl Into<String>, operator_id: i64, property: impl Into<String>, value: impl Into<String>) -> Self {
        Self::with_level(
            PlanEventKind::SetPhysicalOperatorProperty(SetPhysicalOperatorProperty {
                operator_name: operator_name.into(),
                operator_id,
                property: property.into(),
                value: value.into(),
            }),
            LogLevel::Info,
        )
    }

    /// Constructs a [`PlanEventKind::StartContainer`] event at `Info` level.
    pub fn start_container(container_id: impl Into<String>, node_id: impl Into<String>) -> Self {
        Self::with_level(
            PlanEventKind::StartContainer(StartContainer { container_id: container_id.into(), node_id: node_id.into() }),
            LogLevel::Info,
        )
    }

    /// Constructs a [`PlanEventKind::StopContainer`] event at `Warn` level.
    pub fn stop_container(container_id: impl Into<String>, exit_status: Option<i32>, failure_id: Option<i64>) -> Self {
        Self::with_level(
            PlanEventKind::StopContainer(StopContainer { container_id: container_id.into(), exit_status, failure_id }),
            LogLevel::Warn,
        )
    }

    /// Constructs a [`PlanEventKind::ChangeLogicalPlan`] event at `Info` level.
    pub fn change_logical_plan(request: impl Into<String>) -> Self {
        Self::with_level(PlanEventKind::ChangeLogicalPlan(ChangeLogicalPlan { request: request.into() }), LogLevel::Info)
    }

    /// Constructs a [`PlanEventKind::OperatorError`] event at `Error` level.
    pub fn operator_error(operator_name: impl Into<String>, operator_id: i64, container_id: impl Into<String>, error_message: impl Into<String>, failure_id: i64) -> Self {
        let message = error_message.into();
        Self::with_reason(
            PlanEventKind::OperatorError(OperatorError {
                operator_name: operator_name.into(),
                operator_id,
                container_id: container_id.into(),
                error_message: message.clone(),
                failure_id,
            }),
            LogLevel::Error,
            message,
        )
    }

    /// Constructs a [`PlanEventKind::ContainerError`] event at `Error` level.
    pub fn container_error(container_id: impl Into<String>, error_message: impl Into<String>) -> Self {
        let message = error_message.into();
        Self::with_reason(
            PlanEventKind::ContainerError(ContainerError { container_id: container_id.into(), error_message: message.clone() }),
            LogLevel::Error,
            message,
        )
    }
}

/// Receives periodic snapshots of container and operator state.
///
/// An out-of-scope collaborator: the plan core never implements
/// this trait, only declares it, so that a stats-recording subsystem can
/// be wired in without this crate depending on its storage backend.
pub trait StatsRecorder {
    /// The I/O error type a concrete recorder may surface.
    type Error: std::error::Error;

    /// Records the current state of a set of containers, keyed by container id.
    fn record_containers(&mut self, containers: &std::collections::HashMap<String, StartContainer>, timestamp_millis: u64) -> Result<(), Self::Error>;

    /// Records the current state of a list of operators.
    fn record_operators(&mut self, operators: &[CreateOperator], timestamp_millis: u64) -> Result<(), Self::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_ids_strictly_increase() {
        let a = PlanEvent::create_operator("op-a", 1);
        let b = PlanEvent::create_operator("op-b", 2);
        assert!(b.header.id > a.header.id);
    }

    #[test]
    fn default_log_levels_match_expected_severity() {
        assert_eq!(PlanEvent::create_operator("a", 1).header.level, LogLevel::Info);
        assert_eq!(PlanEvent::stop_operator("a", 1, "c", None).header.level, LogLevel::Warn);
        assert_eq!(PlanEvent::stop_container("c", Some(1), None).header.level, LogLevel::Warn);
        assert_eq!(PlanEvent::operator_error("a", 1, "c", "boom", 7).header.level, LogLevel::Error);
        assert_eq!(PlanEvent::container_error("c", "boom").header.level, LogLevel::Error);
    }

    #[test]
    fn error_events_carry_reason() {
        let event = PlanEvent::operator_error("a", 1, "c", "disk full", 9);
        assert_eq!(event.header.reason.as_deref(), Some("disk full"));
    }
}
