use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
#[cfg(any(feature = "testing", test))]
use mockall::automock;

use crate::cluster_types::{ClusterState, ReplicaReassignment, TopicPartition};
use crate::errors::{ClusterViewError, ControlPlaneError};

pub type ControlPlaneResult<T> = Result<T, ControlPlaneError>;
pub type ClusterViewResult<T> = Result<T, ClusterViewError>;
pub type SharedControlPlaneClient = Arc<dyn ControlPlaneClient>;
pub type SharedClusterViewClient = Arc<dyn ClusterViewClient>;

/// The coordination-store surface through which replica and leadership changes
/// are requested. Requires `Send + Sync` to allow sharing across tasks.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait ControlPlaneClient: Send + Sync {
    /// Submits one reassignment request per entry: "partition X should become
    /// replica list R". Submission is atomic per entry, not per batch.
    async fn submit_replica_reassignments(
        &self,
        reassignments: Vec<ReplicaReassignment>,
    ) -> ControlPlaneResult<()>;

    /// Requests that each partition's current preferred (first) replica
    /// become its leader.
    async fn submit_preferred_leader_election(
        &self,
        partitions: Vec<TopicPartition>,
    ) -> ControlPlaneResult<()>;

    /// The partitions the control plane currently knows to be undergoing
    /// replica reassignment.
    async fn partitions_being_reassigned(&self) -> ControlPlaneResult<HashSet<TopicPartition>>;

    /// The partitions currently undergoing a leader election.
    async fn ongoing_leader_election(&self) -> ControlPlaneResult<HashSet<TopicPartition>>;

    /// Closes the underlying coordination-store connection.
    async fn close(&self, timeout: Duration) -> ControlPlaneResult<()>;
}

/// Read-only access to cluster metadata.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait ClusterViewClient: Send + Sync {
    /// Fetches a fresh snapshot of cluster membership and partition placement.
    async fn refresh(&self) -> ClusterViewResult<ClusterState>;
}
