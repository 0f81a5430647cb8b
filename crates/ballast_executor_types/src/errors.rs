use ballast_cluster_types::cluster_types::TopicPartition;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::executor_types::ExecutionId;

#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutorError {
    #[error("Cannot accept new proposals while execution {execution_id:?} is in progress.")]
    ExecutionInProgress { execution_id: Option<ExecutionId> },
    #[error("Invalid execution proposal: {0}")]
    InvalidProposal(String),
    #[error(
        "The cluster has ongoing partition reassignments not started by this executor: \
         {partitions:?}."
    )]
    ConcurrentReassignment { partitions: Vec<TopicPartition> },
    #[error("Failed to refresh cluster metadata: {0}")]
    MetadataRefreshFailed(String),
    #[error("Control plane request failed: {0}")]
    ControlPlaneRequestFailed(String),
    #[error("Executor is shutting down.")]
    ShuttingDown,
}

pub type ExecutorResult<T> = Result<T, ExecutorError>;
