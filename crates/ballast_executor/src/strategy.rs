//! Ordering strategies for pending replica movements.
//!
//! Strategies decide which replica movements are attempted first; the
//! per-broker concurrency cap is then applied to the resulting order. Natural
//! topic-partition order is always the final tie-break so that batch
//! selection is deterministic.

use std::cmp::Ordering;

use ballast_executor_types::executor_types::ExecutionTask;
use tracing::warn;

pub trait ReplicaMovementStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Relative priority of two pending replica movements; `Less` moves
    /// earlier.
    fn compare(&self, a: &ExecutionTask, b: &ExecutionTask) -> Ordering;
}

/// Natural proposal order.
pub struct BaseStrategy;

impl ReplicaMovementStrategy for BaseStrategy {
    fn name(&self) -> &'static str {
        "base"
    }

    fn compare(&self, a: &ExecutionTask, b: &ExecutionTask) -> Ordering {
        a.topic_partition().cmp(b.topic_partition())
    }
}

/// Moves the largest movements first, so the long tail of an execution is
/// made of cheap moves.
pub struct PrioritizeLargeMovements;

impl ReplicaMovementStrategy for PrioritizeLargeMovements {
    fn name(&self) -> &'static str {
        "prioritize-large"
    }

    fn compare(&self, a: &ExecutionTask, b: &ExecutionTask) -> Ordering {
        b.proposal.data_to_move_mb.cmp(&a.proposal.data_to_move_mb)
    }
}

/// Moves the smallest movements first, maximizing early progress counts.
pub struct PrioritizeSmallMovements;

impl ReplicaMovementStrategy for PrioritizeSmallMovements {
    fn name(&self) -> &'static str {
        "prioritize-small"
    }

    fn compare(&self, a: &ExecutionTask, b: &ExecutionTask) -> Ordering {
        a.proposal.data_to_move_mb.cmp(&b.proposal.data_to_move_mb)
    }
}

/// Resolves configured strategy identifiers. Unknown identifiers are dropped
/// with a warning; configuration validation should have rejected them
/// already.
pub fn resolve_strategies(identifiers: &[String]) -> Vec<Box<dyn ReplicaMovementStrategy>> {
    let mut strategies: Vec<Box<dyn ReplicaMovementStrategy>> = Vec::new();
    for identifier in identifiers {
        match identifier.as_str() {
            "base" => strategies.push(Box::new(BaseStrategy)),
            "prioritize-large" => strategies.push(Box::new(PrioritizeLargeMovements)),
            "prioritize-small" => strategies.push(Box::new(PrioritizeSmallMovements)),
            unknown => warn!("Ignoring unknown replica movement strategy {unknown}."),
        }
    }
    strategies
}

/// Compares two tasks under a strategy chain, falling back to natural
/// topic-partition order.
pub fn compare_with_strategies(
    strategies: &[Box<dyn ReplicaMovementStrategy>],
    a: &ExecutionTask,
    b: &ExecutionTask,
) -> Ordering {
    for strategy in strategies {
        match strategy.compare(a, b) {
            Ordering::Equal => continue,
            decided => return decided,
        }
    }
    a.topic_partition().cmp(b.topic_partition())
}
