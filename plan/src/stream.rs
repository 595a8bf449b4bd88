//! Stream metadata.
//!
//! A stream carries tuples from exactly one source output-port to an
//! ordered list of sink input-ports. It does not own its endpoints;
//! those belong to the owning operators, so it records them as
//! `(operator, field name)` references, resolved through [`crate::plan::Plan`].

use serde::{Deserialize, Serialize};

use crate::operator::OperatorId;
use crate::port::Locality;

/// A reference to a port without owning it: the operator that owns it,
/// plus the port's stable field name on that operator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortRef {
    /// The owning operator's id.
    pub operator: OperatorId,
    /// The port's field name on that operator.
    pub port: String,
}

impl PortRef {
    /// Builds a reference to `port` on `operator`.
    pub fn new(operator: OperatorId, port: impl Into<String>) -> Self {
        PortRef { operator, port: port.into() }
    }
}

/// A directed, multi-sink edge between operators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamMeta {
    id: String,
    source: Option<PortRef>,
    sinks: Vec<PortRef>,
    locality: Locality,
}

impl StreamMeta {
    pub(crate) fn new(id: impl Into<String>) -> Self {
        StreamMeta { id: id.into(), source: None, sinks: Vec::new(), locality: Locality::Unspecified }
    }

    /// The stream's unique id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The stream's source port, if bound.
    pub fn source(&self) -> Option<&PortRef> {
        self.source.as_ref()
    }

    /// The stream's sink ports, in the order they were added.
    pub fn sinks(&self) -> &[PortRef] {
        &self.sinks
    }

    /// The stream's placement locality.
    pub fn locality(&self) -> Locality {
        self.locality
    }

    /// Sets the placement locality.
    pub fn set_locality(&mut self, locality: Locality) {
        self.locality = locality;
    }

    pub(crate) fn bind_source(&mut self, source: PortRef) {
        self.source = Some(source);
    }

    pub(crate) fn push_sink(&mut self, sink: PortRef) {
        self.sinks.push(sink);
    }

    pub(crate) fn clear_source(&mut self) {
        self.source = None;
    }

    pub(crate) fn clear_sinks(&mut self) -> Vec<PortRef> {
        std::mem::take(&mut self.sinks)
    }

    pub(crate) fn remove_sink(&mut self, sink: &PortRef) -> bool {
        if let Some(pos) = self.sinks.iter().position(|s| s == sink) {
            self.sinks.remove(pos);
            true
        } else {
            false
        }
    }

    /// True if the stream is missing a source, has no sinks, or both;
    /// a dangling stream the validator rejects.
    pub fn is_dangling(&self) -> bool {
        self.source.is_none() || self.sinks.is_empty()
    }
}
