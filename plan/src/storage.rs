//! Serialization and the storage-agent interface.
//!
//! The plan's metadata serializes directly through `serde`/`bincode`; the
//! user's operator *instances* are handed off to an external
//! [`StorageAgent`] by byte key instead
//! (`storageAgent.store(stream, operatorInstance)` /
//! `retrieve(stream) -> operatorInstance`). Rehydrating an instance from
//! bytes needs to know its concrete type, which Rust cannot recover from
//! bytes alone, so callers supply an [`OperatorFactory`] registry keyed by
//! [`crate::descriptor::UserOperator::kind_tag`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::attribute::AttributeMap;
use crate::descriptor::UserOperator;
use crate::error::SerializationError;
use crate::metrics::MetricAggregatorMeta;
use crate::operator::{seed_operator_id_sequencer_below, OperatorId, OperatorMeta, ProcessingMode};
use crate::ordered_map::OrderedMap;
use crate::plan::Plan;
use crate::port::PortDescriptor;
use crate::stream::StreamMeta;

/// A byte-addressable store the plan hands operator instances to.
///
/// The plan never assumes a specific backend; [`FileStorageAgent`]
/// is the default path-addressable implementation.
pub trait StorageAgent {
    /// Persists `bytes` under `key`, overwriting any prior value.
    fn store(&mut self, key: &str, bytes: &[u8]) -> Result<(), SerializationError>;

    /// Retrieves the bytes previously stored under `key`.
    fn retrieve(&mut self, key: &str) -> Result<Vec<u8>, SerializationError>;
}

/// A [`StorageAgent`] backed by one file per key under a root directory.
#[derive(Debug, Clone)]
pub struct FileStorageAgent {
    root: PathBuf,
}

impl FileStorageAgent {
    /// Creates an agent rooted at `root`. The directory is created lazily on first store.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FileStorageAgent { root: root.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

impl StorageAgent for FileStorageAgent {
    fn store(&mut self, key: &str, bytes: &[u8]) -> Result<(), SerializationError> {
        std::fs::create_dir_all(&self.root)?;
        std::fs::write(self.path_for(key), bytes)?;
        Ok(())
    }

    fn retrieve(&mut self, key: &str) -> Result<Vec<u8>, SerializationError> {
        match std::fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(SerializationError::MissingKey(key.to_string())),
            Err(err) => Err(err.into()),
        }
    }
}

/// A factory function rehydrating one operator kind's bytes into a live
/// [`UserOperator`] object, keyed by [`UserOperator::kind_tag`].
pub type OperatorFactory = HashMap<String, Box<dyn Fn(&[u8]) -> Result<Box<dyn UserOperator>, SerializationError>>>;

#[derive(Serialize, Deserialize)]
struct OperatorSnapshot {
    name: String,
    id: OperatorId,
    ports: OrderedMap<String, PortDescriptor>,
    input_streams: OrderedMap<String, String>,
    output_streams: OrderedMap<String, String>,
    attributes: AttributeMap,
    partitionable: bool,
    checkpointable_within_app_window: bool,
    processing_mode: Option<ProcessingMode>,
    metric_aggregator: Option<MetricAggregatorMeta>,
    storage_key: String,
    kind_tag: String,
}

/// The fully serializable, storage-agent-agnostic form of a [`Plan`].
///
/// This is what actually gets written to `dt-conf.ser`; it
/// holds a storage key per operator rather than the operator instance
/// itself.
#[derive(Serialize, Deserialize)]
pub struct PlanSnapshot {
    operators: Vec<OperatorSnapshot>,
    streams: OrderedMap<String, StreamMeta>,
    roots: OrderedMap<String, ()>,
    attributes: AttributeMap,
}

impl PlanSnapshot {
    /// Captures `plan`'s metadata and stores every operator instance's
    /// bytes through `storage`, keyed by its own name.
    pub fn capture(plan: &Plan, storage: &mut dyn StorageAgent) -> Result<Self, SerializationError> {
        let mut operators = Vec::new();
        for op in plan.operators() {
            let user_operator = op.user_operator().expect("operator instance attached while plan is live");
            let storage_key = op.name().to_string();
            storage.store(&storage_key, &user_operator.to_bytes()?)?;
            operators.push(OperatorSnapshot {
                name: op.name().to_string(),
                id: op.id(),
                ports: op.ports().clone(),
                input_streams: op.input_streams().clone(),
                output_streams: op.output_streams().clone(),
                attributes: op.attributes().clone(),
                partitionable: op.is_partitionable(),
                checkpointable_within_app_window: op.is_checkpointable_within_app_window(),
                processing_mode: op.processing_mode(),
                metric_aggregator: op.metric_aggregator().cloned(),
                storage_key,
                kind_tag: user_operator.kind_tag().to_string(),
            });
        }
        Ok(PlanSnapshot {
            operators,
            streams: plan.streams().cloned().map(|s| (s.id().to_string(), s)).collect(),
            roots: plan.roots().map(|r| (r.to_string(), ())).collect(),
            attributes: plan.attributes().clone(),
        })
    }

    /// Rehydrates a full [`Plan`], retrieving each operator's bytes from
    /// `storage` and rebuilding its instance via the matching entry in
    /// `factories`.
    pub fn restore(self, storage: &mut dyn StorageAgent, factories: &OperatorFactory) -> Result<Plan, SerializationError> {
        let mut operators = OrderedMap::new();
        let mut min_id = i64::MAX;
        for snapshot in self.operators {
            let bytes = storage.retrieve(&snapshot.storage_key)?;
            let factory = factories.get(&snapshot.kind_tag).ok_or_else(|| SerializationError::UnknownOperatorKind(snapshot.kind_tag.clone()))?;
            let user_operator = factory(&bytes)?;
            min_id = min_id.min(snapshot.id);
            let meta = OperatorMeta::from_parts(
                snapshot.name.clone(),
                snapshot.id,
                Some(user_operator),
                snapshot.ports,
                snapshot.input_streams,
                snapshot.output_streams,
                snapshot.attributes,
                snapshot.partitionable,
                snapshot.checkpointable_within_app_window,
                snapshot.processing_mode,
                snapshot.metric_aggregator,
            );
            operators.insert(snapshot.name, meta);
        }
        if min_id < i64::MAX {
            seed_operator_id_sequencer_below(min_id);
        }
        Ok(Plan::from_parts(operators, self.streams, self.roots, self.attributes))
    }
}

/// Serializes `plan` to the byte-stream form written to `dt-conf.ser`,
/// storing operator instances through `storage` along the way.
pub fn serialize_plan(plan: &Plan, storage: &mut dyn StorageAgent) -> Result<Vec<u8>, SerializationError> {
    let snapshot = PlanSnapshot::capture(plan, storage)?;
    Ok(bincode::serialize(&snapshot)?)
}

/// Deserializes a plan previously written by [`serialize_plan`], retrieving
/// operator instances through `storage` and rebuilding them via `factories`.
pub fn deserialize_plan(bytes: &[u8], storage: &mut dyn StorageAgent, factories: &OperatorFactory) -> Result<Plan, SerializationError> {
    let snapshot: PlanSnapshot = bincode::deserialize(bytes)?;
    snapshot.restore(storage, factories)
}

/// The artifact path for the serialized plan under `application_path`.
pub fn serialized_plan_path(application_path: &Path) -> PathBuf {
    application_path.join(crate::config::SERIALIZED_PLAN_FILE)
}

/// The artifact path for the generated launch config under `application_path`.
pub fn launch_config_path(application_path: &Path) -> PathBuf {
    application_path.join(crate::config::LAUNCH_CONFIG_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::PortMappingDescriptor;

    #[derive(Debug, Serialize, Deserialize)]
    struct EchoOp {
        label: String,
    }

    impl UserOperator for EchoOp {
        fn port_mapping(&self) -> PortMappingDescriptor {
            PortMappingDescriptor::builder().output("out1").build().unwrap()
        }
        fn is_input_operator(&self) -> bool {
            true
        }
        fn to_bytes(&self) -> Result<Vec<u8>, SerializationError> {
            Ok(bincode::serialize(self)?)
        }
        fn kind_tag(&self) -> &'static str {
            "echo"
        }
    }

    fn factories() -> OperatorFactory {
        let mut map: OperatorFactory = HashMap::new();
        map.insert(
            "echo".to_string(),
            Box::new(|bytes: &[u8]| -> Result<Box<dyn UserOperator>, SerializationError> { Ok(Box::new(bincode::deserialize::<EchoOp>(bytes)?)) }),
        );
        map
    }

    #[test]
    fn round_trips_through_file_storage() {
        let dir = std::env::temp_dir().join(format!("streamplan-test-{}", std::process::id()));
        let mut storage = FileStorageAgent::new(&dir);

        let mut plan = Plan::new();
        plan.add_operator("A", Box::new(EchoOp { label: "hello".to_string() })).unwrap();

        let bytes = serialize_plan(&plan, &mut storage).unwrap();
        let restored = deserialize_plan(&bytes, &mut storage, &factories()).unwrap();

        assert!(restored.operator("A").is_some());
        assert_eq!(restored.roots().collect::<Vec<_>>(), vec!["A"]);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn serialize_deserialize_serialize_is_byte_identical() {
        let dir = std::env::temp_dir().join(format!("streamplan-test-roundtrip-{}", std::process::id()));
        let mut storage = FileStorageAgent::new(&dir);

        let mut plan = Plan::new();
        plan.add_operator("A", Box::new(EchoOp { label: "hello".to_string() })).unwrap();
        plan.add_operator("B", Box::new(EchoOp { label: "world".to_string() })).unwrap();

        let first = serialize_plan(&plan, &mut storage).unwrap();
        let restored = deserialize_plan(&first, &mut storage, &factories()).unwrap();
        let second = serialize_plan(&restored, &mut storage).unwrap();

        assert_eq!(first, second);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
