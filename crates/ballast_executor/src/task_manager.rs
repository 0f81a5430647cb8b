//! Ownership of the task set of one execution: per-broker in-flight
//! accounting, batch selection under the concurrency caps, and task state
//! transitions.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use ballast_cluster_types::cluster_types::{BrokerId, ClusterState};
use ballast_executor_config::config::ExecutorConfig;
use ballast_executor_types::executor_types::{
    ExecutionProposal,
    ExecutionTask,
    ExecutionTaskId,
    ExecutionTaskState,
    ExecutionTaskType,
    ExecutionTasksSummary,
};
use ballast_time::time::Clock;
use tracing::{debug, warn};

use crate::strategy::{compare_with_strategies, resolve_strategies, ReplicaMovementStrategy};

pub struct TaskManager {
    clock: Arc<dyn Clock>,
    tasks: HashMap<ExecutionTaskId, ExecutionTask>,
    /// Pending replica movements, in strategy order.
    pending_replica_movements: Vec<ExecutionTaskId>,
    /// Pending leadership movements, in proposal order.
    pending_leadership_movements: Vec<ExecutionTaskId>,
    /// In-flight replica movements per broker, counting `InProgress` and
    /// `Aborting` tasks. Brokers in the skip set are never counted.
    in_flight_per_broker: HashMap<BrokerId, u64>,
    brokers_to_skip_concurrency_check: HashSet<BrokerId>,
    strategies: Vec<Box<dyn ReplicaMovementStrategy>>,
    default_partition_movement_concurrency: u64,
    default_leadership_movement_concurrency: u64,
    requested_partition_movement_concurrency: Option<u64>,
    requested_leadership_movement_concurrency: Option<u64>,
    total_partition_movements: u64,
    total_leadership_movements: u64,
    total_data_to_move_mb: u64,
}

impl TaskManager {
    pub fn new(config: &ExecutorConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            tasks: HashMap::new(),
            pending_replica_movements: Vec::new(),
            pending_leadership_movements: Vec::new(),
            in_flight_per_broker: HashMap::new(),
            brokers_to_skip_concurrency_check: HashSet::new(),
            strategies: resolve_strategies(&config.replica_movement_strategies),
            default_partition_movement_concurrency: config
                .num_concurrent_partition_movements_per_broker,
            default_leadership_movement_concurrency: config.num_concurrent_leader_movements,
            requested_partition_movement_concurrency: None,
            requested_leadership_movement_concurrency: None,
            total_partition_movements: 0,
            total_leadership_movements: 0,
            total_data_to_move_mb: 0,
        }
    }

    /// Converts proposals into tasks: a replica action when the replica set
    /// changes, a leader action when only the leader changes and the new
    /// leader is already in sync. A leader-only proposal whose destination is
    /// out of sync could never complete, so it is dropped with a warning.
    pub fn add_execution_proposals(
        &mut self,
        proposals: Vec<ExecutionProposal>,
        brokers_to_skip_concurrency_check: HashSet<BrokerId>,
        cluster: &ClusterState,
    ) {
        self.brokers_to_skip_concurrency_check = brokers_to_skip_concurrency_check;
        for proposal in proposals {
            if proposal.has_replica_action() {
                self.add_task(proposal, ExecutionTaskType::ReplicaAction);
            } else if proposal.has_leader_action() {
                let in_sync = cluster
                    .partition(&proposal.topic_partition)
                    .is_some_and(|info| info.is_in_sync(proposal.new_leader));
                if in_sync {
                    self.add_task(proposal, ExecutionTaskType::LeaderAction);
                } else {
                    warn!(
                        "Dropping leadership movement of {} to out-of-sync broker {}.",
                        proposal.topic_partition, proposal.new_leader
                    );
                }
            }
        }
        let tasks = &self.tasks;
        let strategies = &self.strategies;
        self.pending_replica_movements
            .sort_by(|a, b| compare_with_strategies(strategies, &tasks[a], &tasks[b]));
    }

    fn add_task(&mut self, proposal: ExecutionProposal, task_type: ExecutionTaskType) {
        let task = ExecutionTask::new(proposal, task_type);
        let task_id = task.id();
        if self.tasks.contains_key(&task_id) {
            warn!("Ignoring duplicate execution task {task_id:?}.");
            return;
        }
        match task_type {
            ExecutionTaskType::ReplicaAction => {
                self.total_partition_movements += 1;
                self.total_data_to_move_mb += task.proposal.data_to_move_mb;
                self.pending_replica_movements.push(task_id.clone());
            }
            ExecutionTaskType::LeaderAction => {
                self.total_leadership_movements += 1;
                self.pending_leadership_movements.push(task_id.clone());
            }
        }
        self.tasks.insert(task_id, task);
    }

    /// The per-broker replica movement cap currently in effect.
    pub fn partition_movement_concurrency(&self) -> u64 {
        self.requested_partition_movement_concurrency
            .unwrap_or(self.default_partition_movement_concurrency)
            .max(1)
    }

    /// The global leadership movement cap currently in effect.
    pub fn leadership_movement_concurrency(&self) -> u64 {
        self.requested_leadership_movement_concurrency
            .unwrap_or(self.default_leadership_movement_concurrency)
            .max(1)
    }

    /// Takes effect at the next batch selection; `None` restores the
    /// configured default.
    pub fn set_requested_partition_movement_concurrency(&mut self, concurrency: Option<u64>) {
        self.requested_partition_movement_concurrency = concurrency;
    }

    pub fn set_requested_leadership_movement_concurrency(&mut self, concurrency: Option<u64>) {
        self.requested_leadership_movement_concurrency = concurrency;
    }

    /// The next replica movement batch: the largest prefix of the
    /// strategy-ordered pending tasks that keeps every involved broker within
    /// the per-broker cap, counting movements already in flight.
    pub fn replica_movement_tasks(&self) -> Vec<ExecutionTask> {
        let concurrency = self.partition_movement_concurrency();
        let mut in_flight = self.in_flight_per_broker.clone();
        let mut batch = Vec::new();
        for task_id in &self.pending_replica_movements {
            let task = &self.tasks[task_id];
            let involved = self.capped_brokers(&task.proposal);
            let would_exceed = involved
                .iter()
                .any(|broker| in_flight.get(broker).copied().unwrap_or(0) + 1 > concurrency);
            if would_exceed {
                break;
            }
            for broker in involved {
                *in_flight.entry(broker).or_insert(0) += 1;
            }
            batch.push(task.clone());
        }
        batch
    }

    /// The next leadership movement batch: pending leader actions up to the
    /// leadership cap, less those already in flight.
    pub fn leadership_movement_tasks(&self) -> Vec<ExecutionTask> {
        let concurrency = self.leadership_movement_concurrency();
        let in_flight =
            u64::try_from(self.in_execution_tasks(Some(ExecutionTaskType::LeaderAction)).len())
                .expect("task count overflows u64");
        let available = concurrency.saturating_sub(in_flight);
        self.pending_leadership_movements
            .iter()
            .take(usize::try_from(available).unwrap_or(usize::MAX))
            .map(|task_id| self.tasks[task_id].clone())
            .collect()
    }

    /// Moves the given tasks to `InProgress` and stamps their start time.
    /// Tasks that already left `Pending` are skipped, making re-submission
    /// idempotent.
    pub fn mark_tasks_in_progress(&mut self, tasks: &[ExecutionTask]) {
        let now_ms = self.clock.unix_now_millis();
        for task in tasks {
            let task_id = task.id();
            match self.tasks.get(&task_id).map(ExecutionTask::state) {
                Some(ExecutionTaskState::Pending) => {}
                Some(_) => continue,
                None => {
                    warn!("Cannot start unknown task {task_id:?}.");
                    continue;
                }
            }
            self.apply_transition(&task_id, |task| task.mark_in_progress(now_ms));
        }
    }

    /// Drives a task to its natural terminal state: `InProgress` completes,
    /// `Aborting` aborts, `Dead` stays dead.
    pub fn mark_task_done(&mut self, task_id: &ExecutionTaskId) {
        self.apply_transition(task_id, ExecutionTask::mark_done);
    }

    pub fn mark_task_aborting(&mut self, task_id: &ExecutionTaskId) {
        self.apply_transition(task_id, ExecutionTask::mark_aborting);
    }

    pub fn mark_task_dead(&mut self, task_id: &ExecutionTaskId) {
        self.apply_transition(task_id, ExecutionTask::mark_dead);
    }

    /// Applies a state change and keeps the pending queues and per-broker
    /// in-flight counts consistent with it.
    fn apply_transition(
        &mut self,
        task_id: &ExecutionTaskId,
        change: impl FnOnce(&mut ExecutionTask),
    ) {
        let Some(task) = self.tasks.get_mut(task_id) else {
            warn!("Ignoring state change of unknown task {task_id:?}.");
            return;
        };
        let was_pending = task.state() == ExecutionTaskState::Pending;
        let was_in_execution = task.is_in_execution();
        change(task);
        let state = task.state();
        let proposal = task.proposal.clone();
        let task_type = task.task_type;

        if was_pending && state != ExecutionTaskState::Pending {
            match task_type {
                ExecutionTaskType::ReplicaAction => {
                    self.pending_replica_movements.retain(|pending| pending != task_id);
                }
                ExecutionTaskType::LeaderAction => {
                    self.pending_leadership_movements.retain(|pending| pending != task_id);
                }
            }
            if state == ExecutionTaskState::InProgress
                && task_type == ExecutionTaskType::ReplicaAction
            {
                for broker in self.capped_brokers(&proposal) {
                    *self.in_flight_per_broker.entry(broker).or_insert(0) += 1;
                }
            }
        }
        if was_in_execution && state.is_terminal() && task_type == ExecutionTaskType::ReplicaAction
        {
            for broker in self.capped_brokers(&proposal) {
                match self.in_flight_per_broker.get_mut(&broker) {
                    Some(count) if *count > 0 => *count -= 1,
                    _ => warn!("In-flight count underflow for broker {broker}."),
                }
            }
        }
        debug!("Task {task_id:?} is now {state}.");
    }

    fn capped_brokers(&self, proposal: &ExecutionProposal) -> Vec<BrokerId> {
        proposal
            .brokers_involved()
            .into_iter()
            .filter(|broker| !self.brokers_to_skip_concurrency_check.contains(broker))
            .collect()
    }

    /// Dispatched tasks that have not reached a terminal state.
    pub fn in_execution_tasks(&self, task_type: Option<ExecutionTaskType>) -> Vec<ExecutionTask> {
        self.tasks_in(task_type, ExecutionTask::is_in_execution)
    }

    pub fn in_progress_tasks(&self, task_type: Option<ExecutionTaskType>) -> Vec<ExecutionTask> {
        self.tasks_in(task_type, |task| task.state() == ExecutionTaskState::InProgress)
    }

    fn tasks_in(
        &self,
        task_type: Option<ExecutionTaskType>,
        predicate: impl Fn(&ExecutionTask) -> bool,
    ) -> Vec<ExecutionTask> {
        let mut tasks: Vec<ExecutionTask> = self
            .tasks
            .values()
            .filter(|task| task_type.is_none_or(|wanted| task.task_type == wanted))
            .filter(|task| predicate(task))
            .cloned()
            .collect();
        tasks.sort_by(|a, b| a.id().cmp(&b.id()));
        tasks
    }

    pub fn remaining_replica_movements(&self) -> Vec<ExecutionProposal> {
        self.pending_replica_movements
            .iter()
            .map(|task_id| self.tasks[task_id].proposal.clone())
            .collect()
    }

    pub fn remaining_leadership_movements(&self) -> Vec<ExecutionProposal> {
        self.pending_leadership_movements
            .iter()
            .map(|task_id| self.tasks[task_id].proposal.clone())
            .collect()
    }

    pub fn remaining_data_to_move_mb(&self) -> u64 {
        self.pending_replica_movements
            .iter()
            .map(|task_id| self.tasks[task_id].proposal.data_to_move_mb)
            .sum()
    }

    pub fn in_execution_data_to_move_mb(&self) -> u64 {
        self.in_execution_tasks(Some(ExecutionTaskType::ReplicaAction))
            .iter()
            .map(|task| task.proposal.data_to_move_mb)
            .sum()
    }

    pub fn total_partition_movements(&self) -> u64 {
        self.total_partition_movements
    }

    pub fn total_leadership_movements(&self) -> u64 {
        self.total_leadership_movements
    }

    pub fn total_data_to_move_mb(&self) -> u64 {
        self.total_data_to_move_mb
    }

    pub fn execution_tasks_summary(&self) -> ExecutionTasksSummary {
        let mut task_count_by_state = std::collections::BTreeMap::new();
        for task in self.tasks.values() {
            *task_count_by_state.entry(task.state()).or_insert(0) += 1;
        }
        ExecutionTasksSummary {
            task_count_by_state,
            remaining_replica_movements: self.remaining_replica_movements(),
            remaining_leadership_movements: self.remaining_leadership_movements(),
            in_execution_tasks: self.in_execution_tasks(None),
            in_progress_tasks: self.in_progress_tasks(None),
            aborting_tasks: self
                .tasks
                .values()
                .filter(|task| task.state() == ExecutionTaskState::Aborting)
                .count(),
            aborted_tasks: self.tasks_in(None, |task| {
                task.state() == ExecutionTaskState::Aborted
            }),
            dead_tasks: self.tasks_in(None, |task| task.state() == ExecutionTaskState::Dead),
            remaining_data_to_move_mb: self.remaining_data_to_move_mb(),
            in_execution_data_to_move_mb: self.in_execution_data_to_move_mb(),
        }
    }

    /// Drops all tasks and resets the totals. The requested concurrency
    /// overrides survive; they are dynamic settings, not execution state.
    pub fn clear(&mut self) {
        self.tasks.clear();
        self.pending_replica_movements.clear();
        self.pending_leadership_movements.clear();
        self.in_flight_per_broker.clear();
        self.brokers_to_skip_concurrency_check.clear();
        self.total_partition_movements = 0;
        self.total_leadership_movements = 0;
        self.total_data_to_move_mb = 0;
    }
}
