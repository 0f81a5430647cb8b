use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

/// The identity of a broker in the cluster.
#[derive(
    Copy,
    Clone,
    Debug,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Default,
    derive_more::Display,
    Hash,
)]
pub struct BrokerId(pub u32);

/// One ordered shard of a topic.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TopicPartition {
    pub topic: String,
    pub partition: u32,
}

impl TopicPartition {
    pub fn new(topic: impl Into<String>, partition: u32) -> Self {
        Self { topic: topic.into(), partition }
    }
}

impl fmt::Display for TopicPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.topic, self.partition)
    }
}

/// The observed state of one partition: ordered replica list, in-sync subset,
/// and current leader (`None` while the partition is leaderless).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PartitionInfo {
    pub replicas: Vec<BrokerId>,
    pub isr: Vec<BrokerId>,
    pub leader: Option<BrokerId>,
}

impl PartitionInfo {
    /// Whether `broker` is currently in sync for this partition.
    pub fn is_in_sync(&self, broker: BrokerId) -> bool {
        self.isr.contains(&broker)
    }
}

/// A point-in-time snapshot of cluster membership and partition placement,
/// produced by [`crate::communication::ClusterViewClient::refresh`].
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClusterState {
    pub brokers: BTreeSet<BrokerId>,
    pub partitions: HashMap<TopicPartition, PartitionInfo>,
}

impl ClusterState {
    pub fn partition(&self, topic_partition: &TopicPartition) -> Option<&PartitionInfo> {
        self.partitions.get(topic_partition)
    }

    pub fn contains_broker(&self, broker: BrokerId) -> bool {
        self.brokers.contains(&broker)
    }

    pub fn leader_of(&self, topic_partition: &TopicPartition) -> Option<BrokerId> {
        self.partition(topic_partition).and_then(|info| info.leader)
    }
}

/// A request that a partition's replica set become a new ordered list.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReplicaReassignment {
    pub topic_partition: TopicPartition,
    pub new_replicas: Vec<BrokerId>,
}
