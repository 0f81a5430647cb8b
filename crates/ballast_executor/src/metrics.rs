use ballast_metrics::define_metrics;

define_metrics!(
    Executor => {
        MetricCounter { EXECUTION_STOPPED, "executor_execution_stopped", "Counter of executions stopped before running to completion", init = 0 },
        MetricCounter { EXECUTION_STOPPED_BY_USER, "executor_execution_stopped_by_user", "Counter of executions stopped on user request", init = 0 },
        MetricCounter { EXECUTION_STARTED_ASSIGNER, "executor_execution_started_assigner", "Counter of executions started in assigner mode", init = 0 },
        MetricCounter { EXECUTION_STARTED_REBALANCE, "executor_execution_started_rebalance", "Counter of executions started in rebalance mode", init = 0 },
    },
);

pub(crate) fn register_metrics() {
    EXECUTION_STOPPED.register();
    EXECUTION_STOPPED_BY_USER.register();
    EXECUTION_STARTED_ASSIGNER.register();
    EXECUTION_STARTED_REBALANCE.register();
}
