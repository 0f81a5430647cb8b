use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use ballast_cluster_types::cluster_types::{BrokerId, ClusterState, TopicPartition};
use ballast_cluster_types::communication::{MockClusterViewClient, MockControlPlaneClient};
use ballast_executor_config::config::ExecutorConfig;
use ballast_executor_types::errors::ExecutorError;
use ballast_executor_types::executor_types::{ExecutionId, ExecutionProposal, ExecutionState};
use ballast_load_monitor_types::MockLoadMonitorClient;
use ballast_time::test_utils::FakeClock;
use metrics_exporter_prometheus::PrometheusBuilder;
use pretty_assertions::assert_eq;
use tokio::time::sleep;

use crate::executor::{RebalanceExecutor, LEADER_ACTION_TIMEOUT_MS};
use crate::metrics::{
    EXECUTION_STARTED_ASSIGNER,
    EXECUTION_STARTED_REBALANCE,
    EXECUTION_STOPPED,
    EXECUTION_STOPPED_BY_USER,
};
use crate::test_utils::{
    broker_set,
    cluster_state,
    leader_move,
    replica_move,
    tp,
    FakeClusterView,
    FakeControlPlane,
    FakeLoadMonitor,
    Submission,
};

fn test_config() -> ExecutorConfig {
    ExecutorConfig {
        execution_progress_check_interval_millis: Duration::from_millis(1),
        ..Default::default()
    }
}

struct TestEnv {
    executor: RebalanceExecutor,
    control_plane: Arc<FakeControlPlane>,
    cluster_view: Arc<FakeClusterView>,
    load_monitor: Arc<FakeLoadMonitor>,
    clock: Arc<FakeClock>,
}

fn test_env(initial_cluster: ClusterState) -> TestEnv {
    test_env_with_monitor(initial_cluster, FakeLoadMonitor::new())
}

fn test_env_with_monitor(
    initial_cluster: ClusterState,
    load_monitor: Arc<FakeLoadMonitor>,
) -> TestEnv {
    let control_plane = FakeControlPlane::new();
    let cluster_view = FakeClusterView::new(initial_cluster);
    let clock = Arc::new(FakeClock::new(1_000));
    let executor = RebalanceExecutor::new(
        test_config(),
        control_plane.clone(),
        cluster_view.clone(),
        clock.clone(),
    );
    executor.start();
    TestEnv { executor, control_plane, cluster_view, load_monitor, clock }
}

impl TestEnv {
    async fn execute(&self, proposals: Vec<ExecutionProposal>) -> Result<(), ExecutorError> {
        self.execute_with(proposals, HashSet::new(), HashSet::new(), None).await
    }

    async fn execute_with(
        &self,
        proposals: Vec<ExecutionProposal>,
        unthrottled_brokers: HashSet<BrokerId>,
        removed_brokers: HashSet<BrokerId>,
        partition_movement_concurrency: Option<u64>,
    ) -> Result<(), ExecutorError> {
        self.executor
            .execute_proposals(
                proposals,
                unthrottled_brokers,
                removed_brokers,
                self.load_monitor.clone(),
                partition_movement_concurrency,
                None,
                Some(ExecutionId("test-execution".to_owned())),
            )
            .await
    }
}

async fn wait_until(description: &str, mut condition: impl FnMut() -> bool) {
    let result = tokio::time::timeout(Duration::from_secs(10), async {
        while !condition() {
            sleep(Duration::from_millis(2)).await;
        }
    })
    .await;
    assert!(result.is_ok(), "Timed out waiting for {description}");
}

async fn wait_for_completion(executor: &RebalanceExecutor) {
    wait_until("the execution to finish", || {
        executor.state().state == ExecutionState::NoTaskInProgress
    })
    .await;
}

#[tokio::test]
async fn replica_movement_happy_path() {
    let tp0 = tp("T", 0);
    let initial = cluster_state(
        &[1, 2, 3, 4],
        vec![(tp0.clone(), vec![1, 2, 3], vec![1, 2, 3], Some(1))],
    );
    let moved = cluster_state(
        &[1, 2, 3, 4],
        vec![(tp0.clone(), vec![1, 2, 4], vec![1, 2, 4], Some(1))],
    );
    let env = test_env(initial.clone());
    // The first progress check still sees the old placement; the second sees
    // the movement applied.
    env.cluster_view.push(initial);
    env.cluster_view.push(moved);

    env.execute(vec![replica_move("T", 0, &[1, 2, 3], &[1, 2, 4], 100)]).await.unwrap();
    assert_eq!(
        env.executor.state().execution_id,
        Some(ExecutionId("test-execution".to_owned()))
    );

    wait_for_completion(&env.executor).await;
    assert_eq!(env.control_plane.reassigned_partitions(), HashSet::from([tp0]));
    assert_eq!(env.control_plane.elected_partitions(), HashSet::new());
    assert_eq!(env.load_monitor.pause_count(), 1);
    assert_eq!(env.load_monitor.resume_count(), 1);
    assert_eq!(env.executor.state().execution_id, None);
}

#[tokio::test]
async fn progress_counters_and_phase_ordering() {
    let tp_replica = tp("R", 0);
    let tp_leader = tp("L", 0);
    let initial = cluster_state(
        &[1, 2, 3, 4],
        vec![
            (tp_replica.clone(), vec![1, 2, 3], vec![1, 2, 3], Some(1)),
            (tp_leader.clone(), vec![2, 1], vec![1, 2], Some(1)),
        ],
    );
    let replica_moved = cluster_state(
        &[1, 2, 3, 4],
        vec![
            (tp_replica.clone(), vec![1, 2, 4], vec![1, 2, 4], Some(1)),
            (tp_leader.clone(), vec![2, 1], vec![1, 2], Some(1)),
        ],
    );
    let leader_elected = cluster_state(
        &[1, 2, 3, 4],
        vec![
            (tp_replica.clone(), vec![1, 2, 4], vec![1, 2, 4], Some(1)),
            (tp_leader.clone(), vec![2, 1], vec![1, 2], Some(2)),
        ],
    );
    let env = test_env(initial.clone());
    env.cluster_view.push(initial);
    env.cluster_view.push(replica_moved);

    env.execute(vec![
        replica_move("R", 0, &[1, 2, 3], &[1, 2, 4], 100),
        leader_move("L", 0, &[2, 1], 1),
    ])
    .await
    .unwrap();

    // The replica phase finishes while the election is still pending, which
    // pins the executor in the leadership phase with final replica counters.
    wait_until("the leadership phase to publish replica progress", || {
        let state = env.executor.state();
        state.state == ExecutionState::LeaderMovementTaskInProgress
            && state.finished_partition_movements == 1
            && state.finished_data_movement_mb == 100
            && state.total_partition_movements == 1
            && state.total_data_to_move_mb == 100
    })
    .await;

    env.cluster_view.push(leader_elected);
    wait_for_completion(&env.executor).await;

    // No election may be requested while replica movements are in execution.
    let submissions = env.control_plane.submissions();
    let first_election = submissions
        .iter()
        .position(|submission| matches!(submission, Submission::Election(_)))
        .unwrap();
    let last_reassignment = submissions
        .iter()
        .rposition(|submission| matches!(submission, Submission::Reassignment(_)))
        .unwrap();
    assert!(last_reassignment < first_election);
    assert_eq!(env.control_plane.elected_partitions(), HashSet::from([tp_leader]));
    assert_eq!(env.control_plane.reassigned_partitions(), HashSet::from([tp_replica]));
}

#[tokio::test]
async fn per_broker_concurrency_cap_serializes_movements() {
    let tp_a = tp("T", 0);
    let tp_b = tp("T", 1);
    let initial = cluster_state(
        &[1, 2, 3, 4, 5],
        vec![
            (tp_a.clone(), vec![1, 2], vec![1, 2], Some(1)),
            (tp_b.clone(), vec![3, 4], vec![3, 4], Some(3)),
        ],
    );
    let first_moved = cluster_state(
        &[1, 2, 3, 4, 5],
        vec![
            (tp_a.clone(), vec![1, 5], vec![1, 5], Some(1)),
            (tp_b.clone(), vec![3, 4], vec![3, 4], Some(3)),
        ],
    );
    let both_moved = cluster_state(
        &[1, 2, 3, 4, 5],
        vec![
            (tp_a.clone(), vec![1, 5], vec![1, 5], Some(1)),
            (tp_b.clone(), vec![3, 5], vec![3, 5], Some(3)),
        ],
    );
    let env = test_env(initial.clone());
    env.cluster_view.push(initial);
    env.cluster_view.push(first_moved);
    env.cluster_view.push(both_moved);

    // Both movements add a replica to broker 5; a cap of one serializes them.
    env.execute_with(
        vec![
            replica_move("T", 0, &[1, 2], &[1, 5], 10),
            replica_move("T", 1, &[3, 4], &[3, 5], 10),
        ],
        HashSet::new(),
        HashSet::new(),
        Some(1),
    )
    .await
    .unwrap();
    wait_for_completion(&env.executor).await;

    let reassignment_batches: Vec<HashSet<TopicPartition>> = env
        .control_plane
        .submissions()
        .into_iter()
        .filter_map(|submission| match submission {
            Submission::Reassignment(reassignments) => Some(
                reassignments
                    .into_iter()
                    .map(|reassignment| reassignment.topic_partition)
                    .collect(),
            ),
            Submission::Election(_) => None,
        })
        .collect();
    assert_eq!(reassignment_batches[0], HashSet::from([tp_a.clone()]));
    // Broker 5 never takes part in two movements at once.
    assert!(reassignment_batches
        .iter()
        .all(|batch| !(batch.contains(&tp_a) && batch.contains(&tp_b))));
    assert_eq!(env.control_plane.reassigned_partitions(), HashSet::from([tp_a, tp_b]));
}

#[tokio::test]
async fn user_stop_prevents_new_batches_but_drains_in_flight_work() {
    let recorder = PrometheusBuilder::new().build_recorder();
    let _recorder_guard = metrics::set_default_local_recorder(&recorder);

    let partitions: Vec<_> = (0..10)
        .map(|i| (tp("T", i), vec![1, 2], vec![1, 2], Some(1)))
        .collect();
    let initial = cluster_state(&[1, 2, 9], partitions.clone());
    let env = test_env(initial);

    let proposals = (0..10).map(|i| replica_move("T", i, &[1, 2], &[1, 9], 10)).collect();
    // Every movement lands on broker 9; a cap of two makes the first batch
    // exactly two movements, and nothing completes until the test says so.
    env.execute_with(proposals, HashSet::new(), HashSet::new(), Some(2)).await.unwrap();
    wait_until("the first batch to be submitted", || {
        !env.control_plane.reassigned_partitions().is_empty()
    })
    .await;

    env.executor.user_triggered_stop_execution().await;
    assert_eq!(env.executor.state().state, ExecutionState::StoppingExecution);

    // Let the two in-flight movements finish.
    let drained = cluster_state(
        &[1, 2, 9],
        (0..10)
            .map(|i| {
                if i < 2 {
                    (tp("T", i), vec![1, 9], vec![1, 9], Some(1))
                } else {
                    (tp("T", i), vec![1, 2], vec![1, 2], Some(1))
                }
            })
            .collect(),
    );
    env.cluster_view.push(drained);
    wait_for_completion(&env.executor).await;

    assert_eq!(
        env.control_plane.reassigned_partitions(),
        HashSet::from([tp("T", 0), tp("T", 1)])
    );
    assert_eq!(env.control_plane.elected_partitions(), HashSet::new());
    let metrics = recorder.handle().render();
    assert_eq!(EXECUTION_STOPPED_BY_USER.parse_numeric_metric::<u64>(&metrics), Some(1));
    assert_eq!(EXECUTION_STOPPED.parse_numeric_metric::<u64>(&metrics), Some(1));
    assert_eq!(env.load_monitor.resume_count(), 1);
}

#[tokio::test]
async fn leadership_movement_times_out_to_dead_and_stops_the_execution() {
    let recorder = PrometheusBuilder::new().build_recorder();
    let _recorder_guard = metrics::set_default_local_recorder(&recorder);

    let tp0 = tp("T", 0);
    // The new leader (broker 1) stays in the ISR but is never elected.
    let initial =
        cluster_state(&[1, 2], vec![(tp0.clone(), vec![1, 2], vec![1, 2], Some(2))]);
    let env = test_env(initial);

    env.execute(vec![leader_move("T", 0, &[1, 2], 2)]).await.unwrap();
    wait_until("the election to be submitted", || {
        !env.control_plane.elected_partitions().is_empty()
    })
    .await;

    env.clock.advance(Duration::from_millis(LEADER_ACTION_TIMEOUT_MS + 1));
    wait_for_completion(&env.executor).await;

    let metrics = recorder.handle().render();
    assert_eq!(EXECUTION_STOPPED.parse_numeric_metric::<u64>(&metrics), Some(1));
    assert_eq!(EXECUTION_STOPPED_BY_USER.parse_numeric_metric::<u64>(&metrics), Some(0));
    assert_eq!(env.control_plane.reassigned_partitions(), HashSet::new());
}

#[tokio::test]
async fn topic_deletion_aborts_the_task_without_stopping_the_execution() {
    let recorder = PrometheusBuilder::new().build_recorder();
    let _recorder_guard = metrics::set_default_local_recorder(&recorder);

    let tp_deleted = tp("DEL", 0);
    let tp_kept = tp("KEEP", 0);
    let initial = cluster_state(
        &[1, 2, 3, 4],
        vec![
            (tp_deleted.clone(), vec![1, 2], vec![1, 2], Some(1)),
            (tp_kept.clone(), vec![1, 2], vec![1, 2], Some(1)),
        ],
    );
    // The deleted topic vanishes from the metadata; the other movement
    // completes normally.
    let after = cluster_state(
        &[1, 2, 3, 4],
        vec![(tp_kept.clone(), vec![1, 4], vec![1, 4], Some(1))],
    );
    let env = test_env(initial.clone());
    env.cluster_view.push(initial);
    env.cluster_view.push(after);

    env.execute(vec![
        replica_move("DEL", 0, &[1, 2], &[1, 3], 10),
        replica_move("KEEP", 0, &[1, 2], &[1, 4], 10),
    ])
    .await
    .unwrap();
    wait_for_completion(&env.executor).await;

    let metrics = recorder.handle().render();
    assert_eq!(EXECUTION_STOPPED.parse_numeric_metric::<u64>(&metrics), Some(0));
    assert_eq!(
        env.control_plane.reassigned_partitions(),
        HashSet::from([tp_deleted, tp_kept])
    );
}

#[tokio::test]
async fn concurrent_external_reassignment_fails_fast() {
    let mut control_plane = MockControlPlaneClient::new();
    control_plane
        .expect_partitions_being_reassigned()
        .returning(|| Ok(HashSet::from([TopicPartition::new("X", 1)])));
    let mut cluster_view = MockClusterViewClient::new();
    cluster_view.expect_refresh().returning(|| Ok(cluster_state(&[1, 2, 3], vec![])));
    // No expectations: any sampling call would fail the test.
    let load_monitor = MockLoadMonitorClient::new();

    let executor = RebalanceExecutor::new(
        test_config(),
        Arc::new(control_plane),
        Arc::new(cluster_view),
        Arc::new(FakeClock::new(1_000)),
    );
    executor.start();

    let result = executor
        .execute_proposals(
            vec![replica_move("T", 0, &[1, 2], &[1, 3], 10)],
            HashSet::new(),
            HashSet::new(),
            Arc::new(load_monitor),
            None,
            None,
            None,
        )
        .await;
    assert_matches!(result, Err(ExecutorError::ConcurrentReassignment { partitions }) => {
        assert_eq!(partitions, vec![TopicPartition::new("X", 1)]);
    });
    assert_eq!(executor.state().state, ExecutionState::NoTaskInProgress);

    // The rejected execution left nothing behind: a retry reports the same
    // error rather than Busy.
    let load_monitor = MockLoadMonitorClient::new();
    let result = executor
        .execute_proposals(
            vec![replica_move("T", 0, &[1, 2], &[1, 3], 10)],
            HashSet::new(),
            HashSet::new(),
            Arc::new(load_monitor),
            None,
            None,
            None,
        )
        .await;
    assert_matches!(result, Err(ExecutorError::ConcurrentReassignment { .. }));
}

#[tokio::test]
async fn second_execution_is_rejected_while_one_is_in_flight() {
    let tp0 = tp("T", 0);
    let initial =
        cluster_state(&[1, 2, 3], vec![(tp0.clone(), vec![1, 2], vec![1, 2], Some(1))]);
    let env = test_env(initial);

    env.execute(vec![replica_move("T", 0, &[1, 2], &[1, 3], 10)]).await.unwrap();
    let result = env.execute(vec![replica_move("T", 0, &[1, 2], &[1, 3], 10)]).await;
    assert_matches!(result, Err(ExecutorError::ExecutionInProgress { execution_id }) => {
        assert_eq!(execution_id, Some(ExecutionId("test-execution".to_owned())));
    });

    env.executor.user_triggered_stop_execution().await;
    let moved =
        cluster_state(&[1, 2, 3], vec![(tp0, vec![1, 3], vec![1, 3], Some(1))]);
    env.cluster_view.push(moved);
    wait_for_completion(&env.executor).await;
}

#[tokio::test]
async fn invalid_proposal_batches_are_rejected_without_side_effects() {
    let initial = cluster_state(&[1, 2, 3], vec![]);
    let env = test_env(initial);

    let result = env.execute(vec![]).await;
    assert_matches!(result, Err(ExecutorError::InvalidProposal(_)));

    let result = env
        .execute(vec![
            replica_move("T", 0, &[1, 2], &[1, 3], 10),
            replica_move("T", 0, &[1, 2], &[2, 1], 10),
        ])
        .await;
    assert_matches!(result, Err(ExecutorError::InvalidProposal(_)));

    assert_eq!(env.load_monitor.pause_count(), 0);
    assert_eq!(env.control_plane.submissions(), vec![]);
    assert_eq!(env.executor.state().state, ExecutionState::NoTaskInProgress);
}

#[tokio::test]
async fn not_ready_load_monitor_is_retried_until_it_pauses() {
    let tp0 = tp("T", 0);
    let initial =
        cluster_state(&[1, 2, 3], vec![(tp0.clone(), vec![1, 2], vec![1, 2], Some(1))]);
    let moved = cluster_state(&[1, 2, 3], vec![(tp0, vec![1, 3], vec![1, 3], Some(1))]);
    let env = test_env_with_monitor(initial.clone(), FakeLoadMonitor::not_ready_for(2));
    env.cluster_view.push(initial);
    env.cluster_view.push(moved);

    env.execute(vec![replica_move("T", 0, &[1, 2], &[1, 3], 10)]).await.unwrap();
    wait_for_completion(&env.executor).await;

    assert_eq!(env.load_monitor.pause_count(), 1);
    assert_eq!(env.load_monitor.resume_count(), 1);
}

#[tokio::test]
async fn execution_mode_selects_the_started_counter() {
    let recorder = PrometheusBuilder::new().build_recorder();
    let _recorder_guard = metrics::set_default_local_recorder(&recorder);

    let tp0 = tp("T", 0);
    let initial =
        cluster_state(&[1, 2, 3], vec![(tp0.clone(), vec![1, 2], vec![1, 2], Some(1))]);
    let moved =
        cluster_state(&[1, 2, 3], vec![(tp0.clone(), vec![1, 3], vec![1, 3], Some(1))]);
    let env = test_env(initial.clone());
    env.cluster_view.push(moved.clone());

    env.executor.set_execution_mode(true).await;
    env.execute(vec![replica_move("T", 0, &[1, 2], &[1, 3], 10)]).await.unwrap();
    wait_for_completion(&env.executor).await;

    let rendered = recorder.handle().render();
    assert_eq!(EXECUTION_STARTED_ASSIGNER.parse_numeric_metric::<u64>(&rendered), Some(1));
    assert_eq!(EXECUTION_STARTED_REBALANCE.parse_numeric_metric::<u64>(&rendered), Some(0));

    // Back to rebalance mode for the reverse movement.
    env.cluster_view.push(initial);
    env.executor.set_execution_mode(false).await;
    env.execute(vec![replica_move("T", 0, &[1, 3], &[1, 2], 10)]).await.unwrap();
    wait_for_completion(&env.executor).await;

    let rendered = recorder.handle().render();
    assert_eq!(EXECUTION_STARTED_ASSIGNER.parse_numeric_metric::<u64>(&rendered), Some(1));
    assert_eq!(EXECUTION_STARTED_REBALANCE.parse_numeric_metric::<u64>(&rendered), Some(1));
}

#[tokio::test]
async fn removed_and_demoted_brokers_are_recorded_in_history() {
    let tp0 = tp("T", 0);
    let initial =
        cluster_state(&[1, 2, 3], vec![(tp0.clone(), vec![1, 2], vec![1, 2], Some(1))]);
    let moved =
        cluster_state(&[1, 2, 3], vec![(tp0.clone(), vec![1, 3], vec![1, 3], Some(1))]);
    let env = test_env(initial.clone());
    env.cluster_view.push(moved);

    env.execute_with(
        vec![replica_move("T", 0, &[1, 2], &[1, 3], 10)],
        HashSet::new(),
        broker_set(&[2]),
        None,
    )
    .await
    .unwrap();
    wait_for_completion(&env.executor).await;
    assert_eq!(env.executor.state().recently_removed_brokers, BTreeSet::from([BrokerId(2)]));

    // A demotion execution records the demoted brokers instead.
    let demote_initial = cluster_state(
        &[1, 2, 3],
        vec![(tp("L", 0), vec![3, 1], vec![1, 3], Some(1))],
    );
    let demote_done = cluster_state(
        &[1, 2, 3],
        vec![(tp("L", 0), vec![3, 1], vec![1, 3], Some(3))],
    );
    let env = test_env(demote_initial);
    env.cluster_view.push(demote_done);
    env.executor
        .execute_demote_proposals(
            vec![leader_move("L", 0, &[3, 1], 1)],
            broker_set(&[1]),
            env.load_monitor.clone(),
            None,
            None,
            None,
        )
        .await
        .unwrap();
    wait_for_completion(&env.executor).await;
    assert_eq!(env.executor.state().recently_demoted_brokers, BTreeSet::from([BrokerId(1)]));
}

#[tokio::test]
async fn shutdown_waits_for_the_worker_and_closes_the_control_plane() {
    let tp0 = tp("T", 0);
    let initial =
        cluster_state(&[1, 2, 3], vec![(tp0.clone(), vec![1, 2], vec![1, 2], Some(1))]);
    let moved = cluster_state(&[1, 2, 3], vec![(tp0, vec![1, 3], vec![1, 3], Some(1))]);
    let env = test_env(initial.clone());
    env.cluster_view.push(initial);
    env.cluster_view.push(moved);

    env.execute(vec![replica_move("T", 0, &[1, 2], &[1, 3], 10)]).await.unwrap();
    env.executor.shutdown().await;

    // Shutdown returned only after the worker finished.
    assert_eq!(env.executor.state().state, ExecutionState::NoTaskInProgress);
    assert_eq!(env.load_monitor.resume_count(), 1);
    assert!(env.control_plane.is_closed());

    let result = env.execute(vec![replica_move("T", 0, &[1, 2], &[1, 3], 10)]).await;
    assert_matches!(result, Err(ExecutorError::ShuttingDown));
}
