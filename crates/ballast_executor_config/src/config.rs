use std::collections::BTreeMap;
use std::time::Duration;

use ballast_config::converters::deserialize_milliseconds_to_duration;
use ballast_config::dumping::{ser_param, SerializeConfig};
use ballast_config::{ParamPath, ParamPrivacyInput, SerializedParam};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Strategy identifiers accepted by `replica_movement_strategies`.
pub const KNOWN_REPLICA_MOVEMENT_STRATEGIES: [&str; 3] =
    ["base", "prioritize-large", "prioritize-small"];

/// Configuration of the rebalance execution engine.
#[derive(Clone, Debug, Serialize, Deserialize, Validate, PartialEq)]
#[validate(schema(function = "validate_executor_config"))]
pub struct ExecutorConfig {
    /// Address of the coordination store backing the control plane.
    pub control_plane_endpoint: String,
    /// Per-broker cap on concurrent replica movements.
    pub num_concurrent_partition_movements_per_broker: u64,
    /// Global cap on concurrent leadership movements.
    pub num_concurrent_leader_movements: u64,
    #[serde(deserialize_with = "deserialize_milliseconds_to_duration")]
    pub execution_progress_check_interval_millis: Duration,
    /// Ordered strategy identifiers applied to pending replica movements;
    /// natural proposal order is always the final tie-break.
    pub replica_movement_strategies: Vec<String>,
    #[serde(deserialize_with = "deserialize_milliseconds_to_duration")]
    pub demotion_history_retention_millis: Duration,
    #[serde(deserialize_with = "deserialize_milliseconds_to_duration")]
    pub removal_history_retention_millis: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            control_plane_endpoint: "localhost:2181".to_owned(),
            num_concurrent_partition_movements_per_broker: 5,
            num_concurrent_leader_movements: 1000,
            execution_progress_check_interval_millis: Duration::from_millis(10_000),
            replica_movement_strategies: vec!["base".to_owned()],
            // Two weeks.
            demotion_history_retention_millis: Duration::from_millis(1_209_600_000),
            removal_history_retention_millis: Duration::from_millis(1_209_600_000),
        }
    }
}

impl SerializeConfig for ExecutorConfig {
    fn dump(&self) -> BTreeMap<ParamPath, SerializedParam> {
        BTreeMap::from([
            ser_param(
                "control_plane_endpoint",
                &self.control_plane_endpoint,
                "Address of the coordination store backing the control plane.",
                ParamPrivacyInput::Public,
            ),
            ser_param(
                "num_concurrent_partition_movements_per_broker",
                &self.num_concurrent_partition_movements_per_broker,
                "Maximum number of concurrent replica movements a single broker may take part \
                 in, counting both source and destination brokers.",
                ParamPrivacyInput::Public,
            ),
            ser_param(
                "num_concurrent_leader_movements",
                &self.num_concurrent_leader_movements,
                "Maximum number of concurrent leadership movements across the cluster.",
                ParamPrivacyInput::Public,
            ),
            ser_param(
                "execution_progress_check_interval_millis",
                &self.execution_progress_check_interval_millis.as_millis(),
                "Time to wait (in milliseconds) between progress checks of in-flight movements.",
                ParamPrivacyInput::Public,
            ),
            ser_param(
                "replica_movement_strategies",
                &self.replica_movement_strategies,
                "Ordered strategy identifiers applied when picking the next replica movements.",
                ParamPrivacyInput::Public,
            ),
            ser_param(
                "demotion_history_retention_millis",
                &self.demotion_history_retention_millis.as_millis(),
                "How long (in milliseconds) a broker stays in the recently-demoted set.",
                ParamPrivacyInput::Public,
            ),
            ser_param(
                "removal_history_retention_millis",
                &self.removal_history_retention_millis.as_millis(),
                "How long (in milliseconds) a broker stays in the recently-removed set.",
                ParamPrivacyInput::Public,
            ),
        ])
    }
}

fn validate_executor_config(executor_config: &ExecutorConfig) -> Result<(), ValidationError> {
    if executor_config.num_concurrent_partition_movements_per_broker == 0 {
        return Err(ValidationError::new(
            "num_concurrent_partition_movements_per_broker must be positive",
        ));
    }
    if executor_config.num_concurrent_leader_movements == 0 {
        return Err(ValidationError::new("num_concurrent_leader_movements must be positive"));
    }
    for strategy in &executor_config.replica_movement_strategies {
        if !KNOWN_REPLICA_MOVEMENT_STRATEGIES.contains(&strategy.as_str()) {
            return Err(ValidationError::new("unknown replica movement strategy"));
        }
    }
    Ok(())
}
