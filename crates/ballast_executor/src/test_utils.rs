use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ballast_cluster_types::cluster_types::{
    BrokerId,
    ClusterState,
    PartitionInfo,
    ReplicaReassignment,
    TopicPartition,
};
use ballast_cluster_types::communication::{
    ClusterViewClient,
    ClusterViewResult,
    ControlPlaneClient,
    ControlPlaneResult,
};
use ballast_cluster_types::errors::ClusterViewError;
use ballast_executor_types::executor_types::ExecutionProposal;
use ballast_load_monitor_types::{LoadMonitorClient, LoadMonitorError, LoadMonitorResult};

pub(crate) fn brokers(ids: &[u32]) -> Vec<BrokerId> {
    ids.iter().copied().map(BrokerId).collect()
}

pub(crate) fn broker_set(ids: &[u32]) -> HashSet<BrokerId> {
    ids.iter().copied().map(BrokerId).collect()
}

pub(crate) fn tp(topic: &str, partition: u32) -> TopicPartition {
    TopicPartition::new(topic, partition)
}

/// A replica movement; the old leader is the head of the old replica list.
pub(crate) fn replica_move(
    topic: &str,
    partition: u32,
    old: &[u32],
    new: &[u32],
    data_to_move_mb: u64,
) -> ExecutionProposal {
    ExecutionProposal::new(
        tp(topic, partition),
        brokers(old),
        brokers(new),
        BrokerId(old[0]),
        data_to_move_mb,
    )
    .unwrap()
}

/// A leadership-only movement: same replica list, leadership moves from
/// `old_leader` to the head of `replicas`.
pub(crate) fn leader_move(
    topic: &str,
    partition: u32,
    replicas: &[u32],
    old_leader: u32,
) -> ExecutionProposal {
    ExecutionProposal::new(
        tp(topic, partition),
        brokers(replicas),
        brokers(replicas),
        BrokerId(old_leader),
        0,
    )
    .unwrap()
}

/// Builds a cluster snapshot; each partition entry is
/// `(topic_partition, replicas, isr, leader)`.
pub(crate) fn cluster_state(
    broker_ids: &[u32],
    partitions: Vec<(TopicPartition, Vec<u32>, Vec<u32>, Option<u32>)>,
) -> ClusterState {
    ClusterState {
        brokers: broker_ids.iter().copied().map(BrokerId).collect::<BTreeSet<_>>(),
        partitions: partitions
            .into_iter()
            .map(|(topic_partition, replicas, isr, leader)| {
                (
                    topic_partition,
                    PartitionInfo {
                        replicas: brokers(&replicas),
                        isr: brokers(&isr),
                        leader: leader.map(BrokerId),
                    },
                )
            })
            .collect::<HashMap<_, _>>(),
    }
}

/// A cluster view that replays a queue of snapshots: each refresh pops the
/// next one, and the last snapshot repeats forever. More snapshots can be
/// appended while the executor is running.
pub(crate) struct FakeClusterView {
    snapshots: Mutex<VecDeque<ClusterState>>,
}

impl FakeClusterView {
    pub(crate) fn new(initial: ClusterState) -> Arc<Self> {
        Arc::new(Self { snapshots: Mutex::new(VecDeque::from([initial])) })
    }

    pub(crate) fn push(&self, snapshot: ClusterState) {
        self.snapshots.lock().unwrap().push_back(snapshot);
    }
}

#[async_trait]
impl ClusterViewClient for FakeClusterView {
    async fn refresh(&self) -> ClusterViewResult<ClusterState> {
        let mut snapshots = self.snapshots.lock().unwrap();
        if snapshots.is_empty() {
            return Err(ClusterViewError::RefreshFailed("no snapshot".to_owned()));
        }
        if snapshots.len() == 1 {
            return Ok(snapshots.front().unwrap().clone());
        }
        Ok(snapshots.pop_front().unwrap())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Submission {
    Reassignment(Vec<ReplicaReassignment>),
    Election(Vec<TopicPartition>),
}

/// A control plane that records every submission in order. The set reported
/// by `partitions_being_reassigned` is controlled by the test.
#[derive(Default)]
pub(crate) struct FakeControlPlane {
    pub(crate) submissions: Mutex<Vec<Submission>>,
    pub(crate) reassigning: Mutex<HashSet<TopicPartition>>,
    pub(crate) electing: Mutex<HashSet<TopicPartition>>,
    pub(crate) closed: Mutex<bool>,
}

impl FakeControlPlane {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn submissions(&self) -> Vec<Submission> {
        self.submissions.lock().unwrap().clone()
    }

    /// Topic partitions that appeared in any reassignment submission.
    pub(crate) fn reassigned_partitions(&self) -> HashSet<TopicPartition> {
        self.submissions()
            .into_iter()
            .filter_map(|submission| match submission {
                Submission::Reassignment(reassignments) => Some(reassignments),
                Submission::Election(_) => None,
            })
            .flatten()
            .map(|reassignment| reassignment.topic_partition)
            .collect()
    }

    pub(crate) fn elected_partitions(&self) -> HashSet<TopicPartition> {
        self.submissions()
            .into_iter()
            .filter_map(|submission| match submission {
                Submission::Election(partitions) => Some(partitions),
                Submission::Reassignment(_) => None,
            })
            .flatten()
            .collect()
    }

    pub(crate) fn is_closed(&self) -> bool {
        *self.closed.lock().unwrap()
    }
}

#[async_trait]
impl ControlPlaneClient for FakeControlPlane {
    async fn submit_replica_reassignments(
        &self,
        reassignments: Vec<ReplicaReassignment>,
    ) -> ControlPlaneResult<()> {
        self.submissions.lock().unwrap().push(Submission::Reassignment(reassignments));
        Ok(())
    }

    async fn submit_preferred_leader_election(
        &self,
        partitions: Vec<TopicPartition>,
    ) -> ControlPlaneResult<()> {
        self.submissions.lock().unwrap().push(Submission::Election(partitions));
        Ok(())
    }

    async fn partitions_being_reassigned(&self) -> ControlPlaneResult<HashSet<TopicPartition>> {
        Ok(self.reassigning.lock().unwrap().clone())
    }

    async fn ongoing_leader_election(&self) -> ControlPlaneResult<HashSet<TopicPartition>> {
        Ok(self.electing.lock().unwrap().clone())
    }

    async fn close(&self, _timeout: Duration) -> ControlPlaneResult<()> {
        *self.closed.lock().unwrap() = true;
        Ok(())
    }
}

/// A load monitor that counts pause/resume calls and can refuse the first
/// few pause attempts with `NotReady`.
#[derive(Default)]
pub(crate) struct FakeLoadMonitor {
    not_ready_pauses: Mutex<u32>,
    pause_count: Mutex<u32>,
    resume_count: Mutex<u32>,
}

impl FakeLoadMonitor {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn not_ready_for(not_ready_pauses: u32) -> Arc<Self> {
        Arc::new(Self { not_ready_pauses: Mutex::new(not_ready_pauses), ..Self::default() })
    }

    pub(crate) fn pause_count(&self) -> u32 {
        *self.pause_count.lock().unwrap()
    }

    pub(crate) fn resume_count(&self) -> u32 {
        *self.resume_count.lock().unwrap()
    }
}

#[async_trait]
impl LoadMonitorClient for FakeLoadMonitor {
    async fn pause_metric_sampling(&self, _reason: String) -> LoadMonitorResult<()> {
        let mut not_ready = self.not_ready_pauses.lock().unwrap();
        if *not_ready > 0 {
            *not_ready -= 1;
            return Err(LoadMonitorError::NotReady);
        }
        *self.pause_count.lock().unwrap() += 1;
        Ok(())
    }

    async fn resume_metric_sampling(&self, _reason: String) -> LoadMonitorResult<()> {
        *self.resume_count.lock().unwrap() += 1;
        Ok(())
    }
}
