use std::collections::{BTreeMap, BTreeSet, HashSet};

use ballast_cluster_types::cluster_types::{BrokerId, TopicPartition};
use serde::{Deserialize, Serialize};

use crate::errors::{ExecutorError, ExecutorResult};

/// Identity of one execution, carried through logs, state snapshots and
/// history entries.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, derive_more::Display)]
pub struct ExecutionId(pub String);

impl ExecutionId {
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

/// A desired post-move state for one partition, produced by the upstream
/// optimizer. The new leader is by construction the head of the new replica
/// list, matching the preferred-leader election the control plane offers.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecutionProposal {
    pub topic_partition: TopicPartition,
    pub old_replicas: Vec<BrokerId>,
    pub new_replicas: Vec<BrokerId>,
    pub old_leader: BrokerId,
    pub new_leader: BrokerId,
    pub data_to_move_mb: u64,
}

impl ExecutionProposal {
    pub fn new(
        topic_partition: TopicPartition,
        old_replicas: Vec<BrokerId>,
        new_replicas: Vec<BrokerId>,
        old_leader: BrokerId,
        data_to_move_mb: u64,
    ) -> ExecutorResult<Self> {
        if old_replicas.is_empty() || new_replicas.is_empty() {
            return Err(ExecutorError::InvalidProposal(format!(
                "Proposal for {topic_partition} has an empty replica list."
            )));
        }
        for replicas in [&old_replicas, &new_replicas] {
            let unique: HashSet<_> = replicas.iter().collect();
            if unique.len() != replicas.len() {
                return Err(ExecutorError::InvalidProposal(format!(
                    "Proposal for {topic_partition} repeats a broker in {replicas:?}."
                )));
            }
        }
        if !old_replicas.contains(&old_leader) {
            return Err(ExecutorError::InvalidProposal(format!(
                "Old leader {old_leader} of {topic_partition} is not an old replica."
            )));
        }
        let new_leader = new_replicas[0];
        if old_replicas == new_replicas && old_leader == new_leader {
            return Err(ExecutorError::InvalidProposal(format!(
                "Proposal for {topic_partition} moves nothing."
            )));
        }
        Ok(Self {
            topic_partition,
            old_replicas,
            new_replicas,
            old_leader,
            new_leader,
            data_to_move_mb,
        })
    }

    /// Whether this proposal rewrites the replica set.
    pub fn has_replica_action(&self) -> bool {
        self.old_replicas != self.new_replicas
    }

    /// Whether this proposal changes the leader.
    pub fn has_leader_action(&self) -> bool {
        self.old_leader != self.new_leader
    }

    /// The replica movement completed: the observed replica list equals the
    /// proposed one, as ordered sequences.
    pub fn completed_successfully(&self, current_replicas: &[BrokerId]) -> bool {
        current_replicas == self.new_replicas
    }

    /// The replica movement rolled back to its pre-move placement.
    pub fn aborted(&self, current_replicas: &[BrokerId]) -> bool {
        current_replicas == self.old_replicas
    }

    /// Brokers gaining a replica of this partition.
    pub fn replicas_to_add(&self) -> Vec<BrokerId> {
        self.new_replicas
            .iter()
            .filter(|broker| !self.old_replicas.contains(broker))
            .copied()
            .collect()
    }

    /// Brokers losing their replica of this partition.
    pub fn replicas_to_remove(&self) -> Vec<BrokerId> {
        self.old_replicas
            .iter()
            .filter(|broker| !self.new_replicas.contains(broker))
            .copied()
            .collect()
    }

    /// All brokers touched by the movement: the union of the old and new
    /// replica sets. These are the brokers counted against the per-broker
    /// movement cap.
    pub fn brokers_involved(&self) -> BTreeSet<BrokerId> {
        self.old_replicas.iter().chain(self.new_replicas.iter()).copied().collect()
    }
}

/// The kind of work one task performs.
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
    Hash,
    strum_macros::Display,
)]
pub enum ExecutionTaskType {
    ReplicaAction,
    LeaderAction,
}

/// The lifecycle state of a task. `Completed`, `Aborted` and `Dead` are
/// terminal; a task never leaves a terminal state.
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
    Hash,
    strum_macros::Display,
)]
pub enum ExecutionTaskState {
    Pending,
    InProgress,
    Aborting,
    Aborted,
    Dead,
    Completed,
}

impl ExecutionTaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Aborted | Self::Dead)
    }
}

/// The stable identity of a task: the same proposal re-submitted with the
/// same action type is the same task.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExecutionTaskId {
    pub topic_partition: TopicPartition,
    pub task_type: ExecutionTaskType,
}

/// One unit of execution work: a proposal bound to an action type, a state,
/// and the time the work started.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecutionTask {
    pub proposal: ExecutionProposal,
    pub task_type: ExecutionTaskType,
    state: ExecutionTaskState,
    start_time_ms: Option<u64>,
}

impl ExecutionTask {
    pub fn new(proposal: ExecutionProposal, task_type: ExecutionTaskType) -> Self {
        Self { proposal, task_type, state: ExecutionTaskState::Pending, start_time_ms: None }
    }

    pub fn id(&self) -> ExecutionTaskId {
        ExecutionTaskId {
            topic_partition: self.proposal.topic_partition.clone(),
            task_type: self.task_type,
        }
    }

    pub fn state(&self) -> ExecutionTaskState {
        self.state
    }

    /// The unix millis at which the task left `Pending`, if it has.
    pub fn start_time_ms(&self) -> Option<u64> {
        self.start_time_ms
    }

    pub fn topic_partition(&self) -> &TopicPartition {
        &self.proposal.topic_partition
    }

    /// Whether the task is dispatched and not yet terminal.
    pub fn is_in_execution(&self) -> bool {
        matches!(self.state, ExecutionTaskState::InProgress | ExecutionTaskState::Aborting)
    }

    pub fn mark_in_progress(&mut self, now_ms: u64) {
        self.transition_to(ExecutionTaskState::InProgress);
        self.start_time_ms = Some(now_ms);
    }

    /// Drives the task to its natural terminal state: `InProgress` completes,
    /// `Aborting` aborts, `Dead` stays dead.
    pub fn mark_done(&mut self) {
        match self.state {
            ExecutionTaskState::InProgress => self.transition_to(ExecutionTaskState::Completed),
            ExecutionTaskState::Aborting => self.transition_to(ExecutionTaskState::Aborted),
            ExecutionTaskState::Dead => {}
            state => panic!("Task {} cannot be marked done from state {state}.", self.id_display()),
        }
    }

    pub fn mark_aborting(&mut self) {
        self.transition_to(ExecutionTaskState::Aborting);
    }

    /// Kills the task. Legal from any non-terminal state; calling on an
    /// already-dead task is a no-op.
    pub fn mark_dead(&mut self) {
        if self.state == ExecutionTaskState::Dead {
            return;
        }
        self.transition_to(ExecutionTaskState::Dead);
    }

    fn transition_to(&mut self, next: ExecutionTaskState) {
        assert!(
            Self::is_legal_transition(self.state, next),
            "Illegal task state transition {} -> {next} for {}.",
            self.state,
            self.id_display(),
        );
        self.state = next;
    }

    fn is_legal_transition(from: ExecutionTaskState, to: ExecutionTaskState) -> bool {
        use ExecutionTaskState::{Aborted, Aborting, Completed, Dead, InProgress, Pending};
        matches!(
            (from, to),
            (Pending, InProgress)
                | (Pending, Dead)
                | (InProgress, Completed)
                | (InProgress, Aborting)
                | (InProgress, Dead)
                | (Aborting, Aborted)
                | (Aborting, Dead)
        )
    }

    fn id_display(&self) -> String {
        format!("{}/{}", self.proposal.topic_partition, self.task_type)
    }
}

/// Counts and task sets describing where an execution stands, captured at one
/// point in time.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecutionTasksSummary {
    pub task_count_by_state: BTreeMap<ExecutionTaskState, usize>,
    pub remaining_replica_movements: Vec<ExecutionProposal>,
    pub remaining_leadership_movements: Vec<ExecutionProposal>,
    pub in_execution_tasks: Vec<ExecutionTask>,
    pub in_progress_tasks: Vec<ExecutionTask>,
    pub aborting_tasks: usize,
    pub aborted_tasks: Vec<ExecutionTask>,
    pub dead_tasks: Vec<ExecutionTask>,
    pub remaining_data_to_move_mb: u64,
    pub in_execution_data_to_move_mb: u64,
}

/// What the executor is doing right now.
#[derive(
    Copy, Clone, Debug, Serialize, Deserialize, PartialEq, Eq, strum_macros::Display,
)]
pub enum ExecutionState {
    NoTaskInProgress,
    StartingExecution,
    ReplicaMovementTaskInProgress,
    LeaderMovementTaskInProgress,
    StoppingExecution,
}

/// An immutable snapshot of the executor for external observers. All numbers
/// are captured at snapshot creation, never read by reference.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecutorState {
    pub state: ExecutionState,
    pub finished_partition_movements: u64,
    pub finished_leadership_movements: u64,
    pub finished_data_movement_mb: u64,
    pub total_partition_movements: u64,
    pub total_leadership_movements: u64,
    pub total_data_to_move_mb: u64,
    pub partition_movement_concurrency: u64,
    pub leadership_movement_concurrency: u64,
    pub execution_id: Option<ExecutionId>,
    pub recently_demoted_brokers: BTreeSet<BrokerId>,
    pub recently_removed_brokers: BTreeSet<BrokerId>,
    pub tasks_summary: Option<ExecutionTasksSummary>,
}

impl ExecutorState {
    pub fn no_task_in_progress(
        recently_demoted_brokers: BTreeSet<BrokerId>,
        recently_removed_brokers: BTreeSet<BrokerId>,
    ) -> Self {
        Self {
            state: ExecutionState::NoTaskInProgress,
            finished_partition_movements: 0,
            finished_leadership_movements: 0,
            finished_data_movement_mb: 0,
            total_partition_movements: 0,
            total_leadership_movements: 0,
            total_data_to_move_mb: 0,
            partition_movement_concurrency: 0,
            leadership_movement_concurrency: 0,
            execution_id: None,
            recently_demoted_brokers,
            recently_removed_brokers,
            tasks_summary: None,
        }
    }

    pub fn starting_execution(
        recently_demoted_brokers: BTreeSet<BrokerId>,
        recently_removed_brokers: BTreeSet<BrokerId>,
        execution_id: ExecutionId,
        partition_movement_concurrency: u64,
        leadership_movement_concurrency: u64,
    ) -> Self {
        Self {
            state: ExecutionState::StartingExecution,
            partition_movement_concurrency,
            leadership_movement_concurrency,
            execution_id: Some(execution_id),
            ..Self::no_task_in_progress(recently_demoted_brokers, recently_removed_brokers)
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn operation_in_progress(
        state: ExecutionState,
        progress: ExecutionProgress,
        partition_movement_concurrency: u64,
        leadership_movement_concurrency: u64,
        execution_id: ExecutionId,
        recently_demoted_brokers: BTreeSet<BrokerId>,
        recently_removed_brokers: BTreeSet<BrokerId>,
        tasks_summary: ExecutionTasksSummary,
    ) -> Self {
        Self {
            state,
            finished_partition_movements: progress.finished_partition_movements,
            finished_leadership_movements: progress.finished_leadership_movements,
            finished_data_movement_mb: progress.finished_data_movement_mb,
            total_partition_movements: progress.total_partition_movements,
            total_leadership_movements: progress.total_leadership_movements,
            total_data_to_move_mb: progress.total_data_to_move_mb,
            partition_movement_concurrency,
            leadership_movement_concurrency,
            execution_id: Some(execution_id),
            recently_demoted_brokers,
            recently_removed_brokers,
            tasks_summary: Some(tasks_summary),
        }
    }
}

/// Movement totals and finished counts of the ongoing execution.
#[derive(Copy, Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecutionProgress {
    pub finished_partition_movements: u64,
    pub finished_leadership_movements: u64,
    pub finished_data_movement_mb: u64,
    pub total_partition_movements: u64,
    pub total_leadership_movements: u64,
    pub total_data_to_move_mb: u64,
}
