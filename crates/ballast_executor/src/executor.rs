//! The rebalance executor: accepts a batch of execution proposals, drives the
//! cluster through them in two sequential phases (replica movements, then
//! leadership movements), observes progress through cluster metadata, and
//! tolerates user-requested or failure-induced stops.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use ballast_cluster_types::cluster_types::{
    BrokerId,
    ClusterState,
    PartitionInfo,
    ReplicaReassignment,
};
use ballast_cluster_types::communication::{SharedClusterViewClient, SharedControlPlaneClient};
use ballast_executor_config::config::ExecutorConfig;
use ballast_executor_types::errors::{ExecutorError, ExecutorResult};
use ballast_executor_types::executor_types::{
    ExecutionId,
    ExecutionProgress,
    ExecutionProposal,
    ExecutionState,
    ExecutionTask,
    ExecutionTaskState,
    ExecutionTaskType,
    ExecutorState,
};
use ballast_load_monitor_types::{LoadMonitorError, SharedLoadMonitorClient};
use ballast_time::time::Clock;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

use crate::history::{spawn_history_retainer, ExecutionHistory};
use crate::metrics::{
    register_metrics,
    EXECUTION_STARTED_ASSIGNER,
    EXECUTION_STARTED_REBALANCE,
    EXECUTION_STOPPED,
    EXECUTION_STOPPED_BY_USER,
};
use crate::task_manager::TaskManager;

/// A leadership movement still incomplete after this long is considered dead.
pub const LEADER_ACTION_TIMEOUT_MS: u64 = 180_000;

/// Backoff before the next progress check after a failed metadata refresh.
pub const METADATA_REFRESH_BACKOFF: Duration = Duration::from_millis(100);

const CONTROL_PLANE_CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

const PAUSE_SAMPLING_REASON: &str = "paused-before-proposal-execution";
const RESUME_SAMPLING_REASON: &str = "resumed-after-proposal-execution";

const LOCK_POISONED: &str = "executor lock poisoned";

/// Drives at most one execution at a time. Public operations that change the
/// executor's lifecycle are serialized; readers observe consistent
/// [`ExecutorState`] snapshots at any time.
pub struct RebalanceExecutor {
    config: ExecutorConfig,
    control_plane: SharedControlPlaneClient,
    cluster_view: SharedClusterViewClient,
    clock: Arc<dyn Clock>,
    task_manager: Arc<Mutex<TaskManager>>,
    executor_state: Arc<RwLock<ExecutorState>>,
    has_ongoing_execution: Arc<AtomicBool>,
    stop_requested: Arc<AtomicBool>,
    assigner_mode: AtomicBool,
    history: Arc<ExecutionHistory>,
    history_retainer: Mutex<Option<JoinHandle<()>>>,
    execution_worker: Mutex<Option<JoinHandle<()>>>,
    shutdown_initiated: AtomicBool,
    /// Serializes the lifecycle operations: execute, stop, mode changes and
    /// shutdown.
    lifecycle_lock: tokio::sync::Mutex<()>,
}

impl RebalanceExecutor {
    pub fn new(
        config: ExecutorConfig,
        control_plane: SharedControlPlaneClient,
        cluster_view: SharedClusterViewClient,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let history = Arc::new(ExecutionHistory::new(&config));
        let task_manager = Arc::new(Mutex::new(TaskManager::new(&config, clock.clone())));
        let executor_state = Arc::new(RwLock::new(ExecutorState::no_task_in_progress(
            history.recently_demoted_brokers(),
            history.recently_removed_brokers(),
        )));
        Self {
            config,
            control_plane,
            cluster_view,
            clock,
            task_manager,
            executor_state,
            has_ongoing_execution: Arc::new(AtomicBool::new(false)),
            stop_requested: Arc::new(AtomicBool::new(false)),
            assigner_mode: AtomicBool::new(false),
            history,
            history_retainer: Mutex::new(None),
            execution_worker: Mutex::new(None),
            shutdown_initiated: AtomicBool::new(false),
            lifecycle_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Registers the executor metrics and starts the history retention job.
    pub fn start(&self) {
        register_metrics();
        let retainer = spawn_history_retainer(self.history.clone(), self.clock.clone());
        *self.history_retainer.lock().expect(LOCK_POISONED) = Some(retainer);
    }

    /// Accepts a batch of proposals and starts executing them. Brokers in
    /// `unthrottled_brokers` are not counted against the per-broker movement
    /// cap; brokers in `removed_brokers` are recorded in the removal history.
    #[instrument(
        skip(self, proposals, load_monitor),
        fields(num_proposals = proposals.len()),
        err
    )]
    #[allow(clippy::too_many_arguments)]
    pub async fn execute_proposals(
        &self,
        proposals: Vec<ExecutionProposal>,
        unthrottled_brokers: HashSet<BrokerId>,
        removed_brokers: HashSet<BrokerId>,
        load_monitor: SharedLoadMonitorClient,
        partition_movement_concurrency: Option<u64>,
        leadership_movement_concurrency: Option<u64>,
        execution_id: Option<ExecutionId>,
    ) -> ExecutorResult<()> {
        let _guard = self.lifecycle_lock.lock().await;
        self.accept_execution(AcceptArgs {
            proposals,
            brokers_to_skip_concurrency_check: unthrottled_brokers,
            demoted_brokers: HashSet::new(),
            removed_brokers,
            load_monitor,
            partition_movement_concurrency,
            leadership_movement_concurrency,
            execution_id,
        })
        .await
    }

    /// Accepts demotion proposals. The demoted brokers are recorded in the
    /// demotion history and are also exempt from the per-broker movement cap,
    /// since they are being drained anyway.
    #[instrument(
        skip(self, proposals, load_monitor),
        fields(num_proposals = proposals.len()),
        err
    )]
    pub async fn execute_demote_proposals(
        &self,
        proposals: Vec<ExecutionProposal>,
        demoted_brokers: HashSet<BrokerId>,
        load_monitor: SharedLoadMonitorClient,
        concurrent_swaps: Option<u64>,
        leadership_movement_concurrency: Option<u64>,
        execution_id: Option<ExecutionId>,
    ) -> ExecutorResult<()> {
        let _guard = self.lifecycle_lock.lock().await;
        self.accept_execution(AcceptArgs {
            proposals,
            brokers_to_skip_concurrency_check: demoted_brokers.clone(),
            demoted_brokers,
            removed_brokers: HashSet::new(),
            load_monitor,
            partition_movement_concurrency: concurrent_swaps,
            leadership_movement_concurrency,
            execution_id,
        })
        .await
    }

    async fn accept_execution(&self, args: AcceptArgs) -> ExecutorResult<()> {
        if self.shutdown_initiated.load(Ordering::SeqCst) {
            return Err(ExecutorError::ShuttingDown);
        }
        if self.has_ongoing_execution.load(Ordering::SeqCst) {
            let execution_id = self.state().execution_id;
            return Err(ExecutorError::ExecutionInProgress { execution_id });
        }
        validate_proposals(&args.proposals)?;

        let cluster = self
            .cluster_view
            .refresh()
            .await
            .map_err(|err| ExecutorError::MetadataRefreshFailed(err.to_string()))?;

        {
            let mut task_manager = self.task_manager.lock().expect(LOCK_POISONED);
            task_manager.add_execution_proposals(
                args.proposals,
                args.brokers_to_skip_concurrency_check,
                &cluster,
            );
        }
        let now_ms = self.clock.unix_now_millis();
        self.history.record_demoted_brokers(args.demoted_brokers, now_ms);
        self.history.record_removed_brokers(args.removed_brokers, now_ms);

        // No replica movement may start while the cluster is already moving
        // partitions on someone else's behalf.
        match self.control_plane.partitions_being_reassigned().await {
            Ok(reassigning) if !reassigning.is_empty() => {
                self.task_manager.lock().expect(LOCK_POISONED).clear();
                let mut partitions: Vec<_> = reassigning.into_iter().collect();
                partitions.sort();
                return Err(ExecutorError::ConcurrentReassignment { partitions });
            }
            Ok(_) => {}
            Err(err) => {
                self.task_manager.lock().expect(LOCK_POISONED).clear();
                return Err(ExecutorError::ControlPlaneRequestFailed(err.to_string()));
            }
        }

        let execution_id = args.execution_id.unwrap_or_else(ExecutionId::random);
        let (partition_concurrency, leadership_concurrency) = {
            let mut task_manager = self.task_manager.lock().expect(LOCK_POISONED);
            task_manager
                .set_requested_partition_movement_concurrency(args.partition_movement_concurrency);
            task_manager.set_requested_leadership_movement_concurrency(
                args.leadership_movement_concurrency,
            );
            (
                task_manager.partition_movement_concurrency(),
                task_manager.leadership_movement_concurrency(),
            )
        };

        self.stop_requested.store(false, Ordering::SeqCst);
        self.has_ongoing_execution.store(true, Ordering::SeqCst);
        if self.assigner_mode.load(Ordering::SeqCst) {
            EXECUTION_STARTED_ASSIGNER.increment(1);
        } else {
            EXECUTION_STARTED_REBALANCE.increment(1);
        }
        *self.executor_state.write().expect(LOCK_POISONED) = ExecutorState::starting_execution(
            self.history.recently_demoted_brokers(),
            self.history.recently_removed_brokers(),
            execution_id.clone(),
            partition_concurrency,
            leadership_concurrency,
        );
        info!("Starting execution {execution_id}.");

        let runner = ExecutionRunner {
            progress_check_interval: self.config.execution_progress_check_interval_millis,
            control_plane: self.control_plane.clone(),
            cluster_view: self.cluster_view.clone(),
            clock: self.clock.clone(),
            task_manager: self.task_manager.clone(),
            executor_state: self.executor_state.clone(),
            has_ongoing_execution: self.has_ongoing_execution.clone(),
            stop_requested: self.stop_requested.clone(),
            history: self.history.clone(),
            load_monitor: args.load_monitor,
            execution_id,
            current_phase: ExecutionState::StartingExecution,
            progress: ExecutionProgress::default(),
        };
        *self.execution_worker.lock().expect(LOCK_POISONED) = Some(tokio::spawn(runner.run()));
        Ok(())
    }

    /// Takes effect at the next replica batch selection; `None` restores the
    /// configured default.
    pub fn set_requested_partition_movement_concurrency(&self, concurrency: Option<u64>) {
        info!("Requested partition movement concurrency: {concurrency:?}.");
        self.task_manager
            .lock()
            .expect(LOCK_POISONED)
            .set_requested_partition_movement_concurrency(concurrency);
    }

    /// Takes effect at the next leadership batch selection; `None` restores
    /// the configured default.
    pub fn set_requested_leadership_movement_concurrency(&self, concurrency: Option<u64>) {
        info!("Requested leadership movement concurrency: {concurrency:?}.");
        self.task_manager
            .lock()
            .expect(LOCK_POISONED)
            .set_requested_leadership_movement_concurrency(concurrency);
    }

    /// Records whether the next executions are started on behalf of the
    /// assigner tool; only affects which started-execution counter is bumped.
    pub async fn set_execution_mode(&self, assigner_mode: bool) {
        let _guard = self.lifecycle_lock.lock().await;
        self.assigner_mode.store(assigner_mode, Ordering::SeqCst);
    }

    /// The current executor snapshot.
    pub fn state(&self) -> ExecutorState {
        self.executor_state.read().expect(LOCK_POISONED).clone()
    }

    /// Requests that the ongoing execution stop. Already-submitted movements
    /// still run to completion; no new batches are dispatched.
    pub async fn user_triggered_stop_execution(&self) {
        let _guard = self.lifecycle_lock.lock().await;
        if !self.has_ongoing_execution.load(Ordering::SeqCst) {
            debug!("Stop requested while no execution is in progress.");
            return;
        }
        if request_stop(&self.stop_requested) {
            info!("Execution stop requested by user.");
            EXECUTION_STOPPED_BY_USER.increment(1);
            self.executor_state.write().expect(LOCK_POISONED).state =
                ExecutionState::StoppingExecution;
        }
    }

    /// Waits for the ongoing execution to finish, then closes the control
    /// plane client. Further execute calls fail with `ShuttingDown`.
    pub async fn shutdown(&self) {
        let _guard = self.lifecycle_lock.lock().await;
        if self.shutdown_initiated.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Shutting down the rebalance executor.");
        let worker = self.execution_worker.lock().expect(LOCK_POISONED).take();
        if let Some(worker) = worker {
            if let Err(err) = worker.await {
                error!("Execution worker ended abnormally: {err}");
            }
        }
        if let Some(retainer) = self.history_retainer.lock().expect(LOCK_POISONED).take() {
            retainer.abort();
        }
        if let Err(err) = self.control_plane.close(CONTROL_PLANE_CLOSE_TIMEOUT).await {
            warn!("Failed to close the control plane client: {err}");
        }
        info!("Rebalance executor shutdown complete.");
    }
}

struct AcceptArgs {
    proposals: Vec<ExecutionProposal>,
    brokers_to_skip_concurrency_check: HashSet<BrokerId>,
    demoted_brokers: HashSet<BrokerId>,
    removed_brokers: HashSet<BrokerId>,
    load_monitor: SharedLoadMonitorClient,
    partition_movement_concurrency: Option<u64>,
    leadership_movement_concurrency: Option<u64>,
    execution_id: Option<ExecutionId>,
}

fn validate_proposals(proposals: &[ExecutionProposal]) -> ExecutorResult<()> {
    if proposals.is_empty() {
        return Err(ExecutorError::InvalidProposal("Proposal batch is empty.".to_owned()));
    }
    let mut seen = HashSet::new();
    for proposal in proposals {
        if !seen.insert(&proposal.topic_partition) {
            return Err(ExecutorError::InvalidProposal(format!(
                "More than one proposal for {}.",
                proposal.topic_partition
            )));
        }
    }
    Ok(())
}

/// Flips the stop flag; returns whether this call made the false-to-true
/// transition. Every stop, user or internal, goes through here exactly once.
fn request_stop(stop_requested: &AtomicBool) -> bool {
    let transitioned = stop_requested
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_ok();
    if transitioned {
        EXECUTION_STOPPED.increment(1);
    }
    transitioned
}

/// One execution's worth of state, moved into the worker task. The worker is
/// the only writer of the task manager until its final `clear()`.
struct ExecutionRunner {
    progress_check_interval: Duration,
    control_plane: SharedControlPlaneClient,
    cluster_view: SharedClusterViewClient,
    clock: Arc<dyn Clock>,
    task_manager: Arc<Mutex<TaskManager>>,
    executor_state: Arc<RwLock<ExecutorState>>,
    has_ongoing_execution: Arc<AtomicBool>,
    stop_requested: Arc<AtomicBool>,
    history: Arc<ExecutionHistory>,
    load_monitor: SharedLoadMonitorClient,
    execution_id: ExecutionId,
    current_phase: ExecutionState,
    progress: ExecutionProgress,
}

impl ExecutionRunner {
    async fn run(mut self) {
        {
            let task_manager = self.task_manager.lock().expect(LOCK_POISONED);
            self.progress.total_partition_movements = task_manager.total_partition_movements();
            self.progress.total_leadership_movements = task_manager.total_leadership_movements();
            self.progress.total_data_to_move_mb = task_manager.total_data_to_move_mb();
        }
        if let Err(err) = self.execute().await {
            error!("Execution {} ended with an error: {err}", self.execution_id);
        }
        self.cleanup().await;
    }

    async fn execute(&mut self) -> Result<(), LoadMonitorError> {
        self.pause_metric_sampling().await?;
        self.replica_movement_phase().await;
        if self.stop_requested() {
            info!("Skipping leadership movements: execution {} was stopped.", self.execution_id);
        } else {
            self.leadership_movement_phase().await;
        }
        Ok(())
    }

    /// Pauses metric sampling on the load monitor. The monitor may be
    /// transiently not ready; retried without bound, one progress-check
    /// interval apart.
    async fn pause_metric_sampling(&self) -> Result<(), LoadMonitorError> {
        loop {
            match self
                .load_monitor
                .pause_metric_sampling(PAUSE_SAMPLING_REASON.to_owned())
                .await
            {
                Ok(()) => return Ok(()),
                Err(LoadMonitorError::NotReady) => {
                    info!(
                        "Load monitor is not ready to pause metric sampling, retrying in {:?}.",
                        self.progress_check_interval
                    );
                    sleep(self.progress_check_interval).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn replica_movement_phase(&mut self) {
        self.current_phase = ExecutionState::ReplicaMovementTaskInProgress;
        self.publish_state();
        info!(
            "Starting {} partition movements ({} MB).",
            self.progress.total_partition_movements, self.progress.total_data_to_move_mb
        );
        loop {
            if !self.stop_requested() {
                let batch =
                    { self.task_manager.lock().expect(LOCK_POISONED).replica_movement_tasks() };
                if !batch.is_empty() {
                    debug!("Dispatching a batch of {} replica movements.", batch.len());
                    {
                        self.task_manager
                            .lock()
                            .expect(LOCK_POISONED)
                            .mark_tasks_in_progress(&batch);
                    }
                    let reassignments = batch
                        .iter()
                        .map(|task| ReplicaReassignment {
                            topic_partition: task.topic_partition().clone(),
                            new_replicas: task.proposal.new_replicas.clone(),
                        })
                        .collect();
                    if let Err(err) =
                        self.control_plane.submit_replica_reassignments(reassignments).await
                    {
                        warn!(
                            "Failed to submit replica reassignments, re-submission happens with \
                             the next progress check: {err}"
                        );
                    }
                }
            }
            self.wait_for_tasks_to_finish().await;
            self.recompute_replica_progress();
            let (remaining, in_execution) = {
                let task_manager = self.task_manager.lock().expect(LOCK_POISONED);
                (
                    task_manager.remaining_replica_movements().len(),
                    task_manager
                        .in_execution_tasks(Some(ExecutionTaskType::ReplicaAction))
                        .len(),
                )
            };
            // Polling continues past the last batch until the in-execution
            // set drains, so the control plane has no reassignment state left
            // when the phase ends.
            if in_execution == 0 && (remaining == 0 || self.stop_requested()) {
                break;
            }
        }
        info!(
            "Partition movements finished: {}/{} partitions, {}/{} MB.",
            self.progress.finished_partition_movements,
            self.progress.total_partition_movements,
            self.progress.finished_data_movement_mb,
            self.progress.total_data_to_move_mb
        );
    }

    async fn leadership_movement_phase(&mut self) {
        self.current_phase = ExecutionState::LeaderMovementTaskInProgress;
        self.publish_state();
        info!("Starting {} leadership movements.", self.progress.total_leadership_movements);
        loop {
            if self.stop_requested() {
                break;
            }
            let batch =
                { self.task_manager.lock().expect(LOCK_POISONED).leadership_movement_tasks() };
            if batch.is_empty() {
                break;
            }
            debug!("Dispatching a batch of {} leadership movements.", batch.len());
            {
                self.task_manager.lock().expect(LOCK_POISONED).mark_tasks_in_progress(&batch);
            }
            let partitions = batch.iter().map(|task| task.topic_partition().clone()).collect();
            if let Err(err) =
                self.control_plane.submit_preferred_leader_election(partitions).await
            {
                warn!(
                    "Failed to submit a preferred leader election, re-submission happens with \
                     the next progress check: {err}"
                );
            }
            loop {
                let drained = self
                    .task_manager
                    .lock()
                    .expect(LOCK_POISONED)
                    .in_execution_tasks(Some(ExecutionTaskType::LeaderAction))
                    .is_empty();
                if drained {
                    break;
                }
                self.wait_for_tasks_to_finish().await;
            }
            self.progress.finished_leadership_movements +=
                u64::try_from(batch.len()).expect("batch size overflows u64");
            self.publish_state();
        }
        info!(
            "Leadership movements finished: {}/{}.",
            self.progress.finished_leadership_movements,
            self.progress.total_leadership_movements
        );
    }

    /// One progress observation round: re-submit dropped work, sleep one
    /// check interval, refresh the cluster view, and transition every
    /// in-execution task the new metadata has something to say about.
    /// Returns once at least one task finished or nothing is in execution.
    async fn wait_for_tasks_to_finish(&mut self) {
        loop {
            self.maybe_reexecute_tasks().await;
            sleep(self.progress_check_interval).await;
            let cluster = match self.cluster_view.refresh().await {
                Ok(cluster) => cluster,
                Err(err) => {
                    warn!("Failed to refresh cluster metadata, will retry: {err}");
                    sleep(METADATA_REFRESH_BACKOFF).await;
                    if self.no_tasks_in_execution() {
                        return;
                    }
                    continue;
                }
            };

            let mut finished_any = false;
            let mut killed_any = false;
            let in_execution =
                { self.task_manager.lock().expect(LOCK_POISONED).in_execution_tasks(None) };
            for task in &in_execution {
                let task_id = task.id();
                match cluster.partition(task.topic_partition()) {
                    None => {
                        // The topic was deleted out from under the movement.
                        info!(
                            "Aborting task {}/{}: topic was deleted.",
                            task.topic_partition(),
                            task.task_type
                        );
                        let mut task_manager = self.task_manager.lock().expect(LOCK_POISONED);
                        if task.state() == ExecutionTaskState::InProgress {
                            task_manager.mark_task_aborting(&task_id);
                        }
                        task_manager.mark_task_done(&task_id);
                        finished_any = true;
                    }
                    Some(partition) => {
                        if is_task_done(partition, task) {
                            self.task_manager
                                .lock()
                                .expect(LOCK_POISONED)
                                .mark_task_done(&task_id);
                            finished_any = true;
                        } else if self.maybe_mark_task_dead(&cluster, task) {
                            finished_any = true;
                            killed_any = true;
                        }
                    }
                }
            }

            // A dead task means the execution as a whole cannot make safe
            // forward progress anymore.
            if killed_any && request_stop(&self.stop_requested) {
                error!(
                    "Stopping execution {}: some tasks can no longer make progress.",
                    self.execution_id
                );
            }
            self.publish_state();
            if finished_any || self.no_tasks_in_execution() {
                return;
            }
        }
    }

    /// The cluster controller may silently drop submitted work (a known race
    /// with controller failover). Detect the mismatch and re-submit; task
    /// state is untouched, so re-submission is idempotent.
    async fn maybe_reexecute_tasks(&self) {
        let being_reassigned = match self.control_plane.partitions_being_reassigned().await {
            Ok(partitions) => partitions,
            Err(err) => {
                warn!("Failed to list in-flight reassignments: {err}");
                return;
            }
        };

        let in_progress_replica = {
            self.task_manager
                .lock()
                .expect(LOCK_POISONED)
                .in_progress_tasks(Some(ExecutionTaskType::ReplicaAction))
        };
        if in_progress_replica.len() > being_reassigned.len() {
            debug!("Re-submitting {} replica movements.", in_progress_replica.len());
            let reassignments = in_progress_replica
                .iter()
                .map(|task| ReplicaReassignment {
                    topic_partition: task.topic_partition().clone(),
                    new_replicas: task.proposal.new_replicas.clone(),
                })
                .collect();
            if let Err(err) = self.control_plane.submit_replica_reassignments(reassignments).await
            {
                warn!("Failed to re-submit replica reassignments: {err}");
            }
        }

        let in_progress_leadership = {
            self.task_manager
                .lock()
                .expect(LOCK_POISONED)
                .in_progress_tasks(Some(ExecutionTaskType::LeaderAction))
        };
        if !in_progress_leadership.is_empty() && being_reassigned.is_empty() {
            match self.control_plane.ongoing_leader_election().await {
                Ok(elections) if elections.is_empty() => {
                    debug!("Re-submitting {} leadership movements.", in_progress_leadership.len());
                    let partitions = in_progress_leadership
                        .iter()
                        .map(|task| task.topic_partition().clone())
                        .collect();
                    if let Err(err) =
                        self.control_plane.submit_preferred_leader_election(partitions).await
                    {
                        warn!("Failed to re-submit the preferred leader election: {err}");
                    }
                }
                Ok(_) => {}
                Err(err) => warn!("Failed to list ongoing leader elections: {err}"),
            }
        }
    }

    /// Kills tasks that can never complete: movements towards brokers that
    /// left the cluster, and leadership movements that outlived the election
    /// timeout. Returns whether the task was killed.
    fn maybe_mark_task_dead(&self, cluster: &ClusterState, task: &ExecutionTask) -> bool {
        let task_id = task.id();
        match task.task_type {
            ExecutionTaskType::LeaderAction => {
                if !cluster.contains_broker(task.proposal.new_leader) {
                    error!(
                        "Killing task {}/{}: target leader {} is not in the cluster.",
                        task.topic_partition(),
                        task.task_type,
                        task.proposal.new_leader
                    );
                    self.task_manager.lock().expect(LOCK_POISONED).mark_task_dead(&task_id);
                    return true;
                }
                let started_at_ms =
                    task.start_time_ms().unwrap_or_else(|| self.clock.unix_now_millis());
                if ballast_time::time::elapsed_millis(self.clock.as_ref(), started_at_ms)
                    > LEADER_ACTION_TIMEOUT_MS
                {
                    error!(
                        "Killing task {}/{}: leader not elected within {LEADER_ACTION_TIMEOUT_MS} \
                         ms.",
                        task.topic_partition(),
                        task.task_type
                    );
                    self.task_manager.lock().expect(LOCK_POISONED).mark_task_dead(&task_id);
                    return true;
                }
                false
            }
            ExecutionTaskType::ReplicaAction => {
                let missing = task
                    .proposal
                    .new_replicas
                    .iter()
                    .find(|broker| !cluster.contains_broker(**broker));
                if let Some(broker) = missing {
                    error!(
                        "Killing task {}/{}: destination broker {broker} is not in the cluster.",
                        task.topic_partition(),
                        task.task_type
                    );
                    self.task_manager.lock().expect(LOCK_POISONED).mark_task_dead(&task_id);
                    return true;
                }
                false
            }
        }
    }

    fn recompute_replica_progress(&mut self) {
        let (remaining, in_execution, remaining_mb, in_execution_mb) = {
            let task_manager = self.task_manager.lock().expect(LOCK_POISONED);
            (
                u64::try_from(task_manager.remaining_replica_movements().len())
                    .expect("movement count overflows u64"),
                u64::try_from(
                    task_manager.in_execution_tasks(Some(ExecutionTaskType::ReplicaAction)).len(),
                )
                .expect("movement count overflows u64"),
                task_manager.remaining_data_to_move_mb(),
                task_manager.in_execution_data_to_move_mb(),
            )
        };
        self.progress.finished_partition_movements =
            self.progress.total_partition_movements - (remaining + in_execution);
        self.progress.finished_data_movement_mb =
            self.progress.total_data_to_move_mb - (remaining_mb + in_execution_mb);
    }

    fn publish_state(&self) {
        let (summary, partition_concurrency, leadership_concurrency) = {
            let task_manager = self.task_manager.lock().expect(LOCK_POISONED);
            (
                task_manager.execution_tasks_summary(),
                task_manager.partition_movement_concurrency(),
                task_manager.leadership_movement_concurrency(),
            )
        };
        let state = if self.stop_requested() {
            ExecutionState::StoppingExecution
        } else {
            self.current_phase
        };
        *self.executor_state.write().expect(LOCK_POISONED) = ExecutorState::operation_in_progress(
            state,
            self.progress,
            partition_concurrency,
            leadership_concurrency,
            self.execution_id.clone(),
            self.history.recently_demoted_brokers(),
            self.history.recently_removed_brokers(),
            summary,
        );
    }

    /// Runs regardless of how the execution ended: resumes sampling, clears
    /// the task manager, resets the published state and the stop flag.
    async fn cleanup(&mut self) {
        if let Err(err) = self
            .load_monitor
            .resume_metric_sampling(RESUME_SAMPLING_REASON.to_owned())
            .await
        {
            error!("Failed to resume metric sampling: {err}");
        }
        self.task_manager.lock().expect(LOCK_POISONED).clear();
        self.progress = ExecutionProgress::default();
        *self.executor_state.write().expect(LOCK_POISONED) = ExecutorState::no_task_in_progress(
            self.history.recently_demoted_brokers(),
            self.history.recently_removed_brokers(),
        );
        self.stop_requested.store(false, Ordering::SeqCst);
        self.has_ongoing_execution.store(false, Ordering::SeqCst);
        info!("Execution {} finished.", self.execution_id);
    }

    fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    fn no_tasks_in_execution(&self) -> bool {
        self.task_manager.lock().expect(LOCK_POISONED).in_execution_tasks(None).is_empty()
    }
}

/// Whether the observed partition state says this task is finished.
fn is_task_done(partition: &PartitionInfo, task: &ExecutionTask) -> bool {
    match task.task_type {
        ExecutionTaskType::ReplicaAction => match task.state() {
            ExecutionTaskState::InProgress => {
                task.proposal.completed_successfully(&partition.replicas)
            }
            // A successful abort restored the old placement; losing the race
            // and completing forward is just as final.
            ExecutionTaskState::Aborting => {
                task.proposal.aborted(&partition.replicas)
                    || task.proposal.completed_successfully(&partition.replicas)
            }
            ExecutionTaskState::Dead => true,
            state => panic!("Replica action checked for completion in state {state}."),
        },
        ExecutionTaskType::LeaderAction => match task.state() {
            // Done when the election succeeded, the partition is currently
            // leaderless, or the target fell out of the ISR and the election
            // can never succeed.
            ExecutionTaskState::InProgress => {
                partition.leader == Some(task.proposal.new_leader)
                    || partition.leader.is_none()
                    || !partition.is_in_sync(task.proposal.new_leader)
            }
            ExecutionTaskState::Aborting | ExecutionTaskState::Dead => true,
            state => panic!("Leader action checked for completion in state {state}."),
        },
    }
}
