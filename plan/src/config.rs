//! Plan-level attribute keys and artifact naming.
//!
//! These are the configuration surface for the plan: there is no
//! separate config-file loader in scope (CLI/credential loading are
//! out-of-scope collaborators), so everything a launcher needs to know
//! is a plan- or operator-level [`crate::attribute::AttributeKey`].

use std::sync::LazyLock;
use std::time::Duration;

use crate::attribute::AttributeKey;
use crate::operator::ProcessingMode;

/// Selects a faster but less battle-tested pub/sub transport.
pub static FAST_PUBLISHER_SUBSCRIBER: LazyLock<AttributeKey<bool>> = LazyLock::new(|| AttributeKey::with_default("FAST_PUBLISHER_SUBSCRIBER", false));

/// Lifetime of HDFS delegation tokens, in milliseconds.
pub static HDFS_TOKEN_LIFE_TIME: LazyLock<AttributeKey<u64>> =
    LazyLock::new(|| AttributeKey::with_default("HDFS_TOKEN_LIFE_TIME", Duration::from_secs(7 * 24 * 60 * 60).as_millis() as u64));

/// Lifetime of resource-manager tokens, in milliseconds. No cross-platform default.
pub static RM_TOKEN_LIFE_TIME: LazyLock<AttributeKey<u64>> = LazyLock::new(|| AttributeKey::new("RM_TOKEN_LIFE_TIME"));

/// Path to the Kerberos keytab file.
pub static KEY_TAB_FILE: LazyLock<AttributeKey<String>> = LazyLock::new(|| AttributeKey::new("KEY_TAB_FILE"));

/// Fraction of a token's lifetime elapsed before it is proactively refreshed.
pub static TOKEN_REFRESH_ANTICIPATORY_FACTOR: LazyLock<AttributeKey<f64>> =
    LazyLock::new(|| AttributeKey::with_default("TOKEN_REFRESH_ANTICIPATORY_FACTOR", 0.7));

/// Licensing metadata string.
pub static LICENSE: LazyLock<AttributeKey<String>> = LazyLock::new(|| AttributeKey::new("LICENSE"));

/// Root path under which licensing metadata is resolved.
pub static LICENSE_ROOT: LazyLock<AttributeKey<String>> = LazyLock::new(|| AttributeKey::new("LICENSE_ROOT"));

/// Comma-separated list of extra jars to stage alongside the plan.
pub static LIBRARY_JARS: LazyLock<AttributeKey<String>> = LazyLock::new(|| AttributeKey::new("LIBRARY_JARS"));

/// Comma-separated list of archive artifacts to stage.
pub static ARCHIVES: LazyLock<AttributeKey<String>> = LazyLock::new(|| AttributeKey::new("ARCHIVES"));

/// Comma-separated list of plain file artifacts to stage.
pub static FILES: LazyLock<AttributeKey<String>> = LazyLock::new(|| AttributeKey::new("FILES"));

/// Upper bound on the number of containers this plan may request.
pub static CONTAINERS_MAX_COUNT: LazyLock<AttributeKey<u32>> = LazyLock::new(|| AttributeKey::with_default("CONTAINERS_MAX_COUNT", u32::MAX));

/// Persistent root for checkpoints/stats/events. Required at launch; no default here.
pub static APPLICATION_PATH: LazyLock<AttributeKey<String>> = LazyLock::new(|| AttributeKey::new("APPLICATION_PATH"));

/// Whether the launcher should run in debug mode.
pub static DEBUG: LazyLock<AttributeKey<bool>> = LazyLock::new(|| AttributeKey::with_default("DEBUG", false));

/// Heap size, in megabytes, requested for the master container.
pub static MASTER_MEMORY_MB: LazyLock<AttributeKey<u32>> = LazyLock::new(|| AttributeKey::new("MASTER_MEMORY_MB"));

/// Extra JVM options passed to launched containers.
pub static CONTAINER_JVM_OPTIONS: LazyLock<AttributeKey<String>> = LazyLock::new(|| AttributeKey::new("CONTAINER_JVM_OPTIONS"));

/// Operator-level: number of streaming windows per application window,
/// used by the checkpointable-within-app-window validation.
pub static APPLICATION_WINDOW_COUNT: LazyLock<AttributeKey<u32>> = LazyLock::new(|| AttributeKey::with_default("APPLICATION_WINDOW_COUNT", 1));

/// Operator-level: number of streaming windows between checkpoints.
pub static CHECKPOINT_WINDOW_COUNT: LazyLock<AttributeKey<u32>> = LazyLock::new(|| AttributeKey::with_default("CHECKPOINT_WINDOW_COUNT", 1));

/// Operator-level: an explicitly assigned partitioner identifier.
pub static PARTITIONER: LazyLock<AttributeKey<String>> = LazyLock::new(|| AttributeKey::new("PARTITIONER"));

/// Explicitly declared processing mode, bypassing inference/propagation.
pub static PROCESSING_MODE: LazyLock<AttributeKey<ProcessingMode>> = LazyLock::new(|| AttributeKey::new("PROCESSING_MODE"));

/// Port-level: whether an input port accepts a parallel-partitioned stream.
pub static PARTITION_PARALLEL: LazyLock<AttributeKey<bool>> = LazyLock::new(|| AttributeKey::with_default("PARTITION_PARALLEL", false));

/// Operator-level: an opaque dimensions-scheme payload bundled into the
/// operator's metric-aggregator metadata during inference, not otherwise
/// interpreted by this crate.
pub static DIMENSIONS_SCHEME: LazyLock<AttributeKey<String>> = LazyLock::new(|| AttributeKey::new("DIMENSIONS_SCHEME"));

/// Subdirectory, under `APPLICATION_PATH`, holding checkpoint state.
pub const CHECKPOINTS_DIR: &str = "checkpoints";
/// Subdirectory, under `APPLICATION_PATH`, holding recorded stats.
pub const STATS_DIR: &str = "stats";
/// Subdirectory, under `APPLICATION_PATH`, holding recorded events.
pub const EVENTS_DIR: &str = "events";

/// File name of the serialized plan artifact.
pub const SERIALIZED_PLAN_FILE: &str = "dt-conf.ser";
/// File name of the generated launch configuration.
pub const LAUNCH_CONFIG_FILE: &str = "dt-launch-config.xml";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_expected_values() {
        assert_eq!(FAST_PUBLISHER_SUBSCRIBER.name(), "FAST_PUBLISHER_SUBSCRIBER");
        assert_eq!(CONTAINERS_MAX_COUNT.name(), "CONTAINERS_MAX_COUNT");
        assert_eq!(SERIALIZED_PLAN_FILE, "dt-conf.ser");
        assert_eq!(LAUNCH_CONFIG_FILE, "dt-launch-config.xml");
    }
}
