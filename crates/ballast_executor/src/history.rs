//! Demotion and removal history: which brokers were recently drained, and
//! when. Entries expire after a configured retention.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ballast_cluster_types::cluster_types::BrokerId;
use ballast_executor_config::config::ExecutorConfig;
use ballast_time::time::Clock;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::warn;

/// Period of the history retention sweep.
pub const HISTORY_SCANNER_PERIOD: Duration = Duration::from_secs(5);

/// Broker-id to wall-clock-millis maps recording the latest demotion and
/// removal start times. The executor worker writes; external observers read
/// the key sets concurrently.
#[derive(Debug)]
pub struct ExecutionHistory {
    latest_demote_start_time_ms_by_broker: Mutex<HashMap<BrokerId, u64>>,
    latest_remove_start_time_ms_by_broker: Mutex<HashMap<BrokerId, u64>>,
    demotion_retention_ms: u64,
    removal_retention_ms: u64,
}

impl ExecutionHistory {
    pub fn new(config: &ExecutorConfig) -> Self {
        Self {
            latest_demote_start_time_ms_by_broker: Mutex::new(HashMap::new()),
            latest_remove_start_time_ms_by_broker: Mutex::new(HashMap::new()),
            demotion_retention_ms: ballast_time::time::millis(
                config.demotion_history_retention_millis,
            ),
            removal_retention_ms: ballast_time::time::millis(
                config.removal_history_retention_millis,
            ),
        }
    }

    pub fn record_demoted_brokers(
        &self,
        brokers: impl IntoIterator<Item = BrokerId>,
        now_ms: u64,
    ) {
        match self.latest_demote_start_time_ms_by_broker.lock() {
            Ok(mut demoted) => demoted.extend(brokers.into_iter().map(|broker| (broker, now_ms))),
            Err(err) => warn!("Failed to record demoted brokers: {err}"),
        }
    }

    pub fn record_removed_brokers(
        &self,
        brokers: impl IntoIterator<Item = BrokerId>,
        now_ms: u64,
    ) {
        match self.latest_remove_start_time_ms_by_broker.lock() {
            Ok(mut removed) => removed.extend(brokers.into_iter().map(|broker| (broker, now_ms))),
            Err(err) => warn!("Failed to record removed brokers: {err}"),
        }
    }

    pub fn recently_demoted_brokers(&self) -> BTreeSet<BrokerId> {
        match self.latest_demote_start_time_ms_by_broker.lock() {
            Ok(demoted) => demoted.keys().copied().collect(),
            Err(err) => {
                warn!("Failed to read demotion history: {err}");
                BTreeSet::new()
            }
        }
    }

    pub fn recently_removed_brokers(&self) -> BTreeSet<BrokerId> {
        match self.latest_remove_start_time_ms_by_broker.lock() {
            Ok(removed) => removed.keys().copied().collect(),
            Err(err) => {
                warn!("Failed to read removal history: {err}");
                BTreeSet::new()
            }
        }
    }

    /// Drops every entry whose recorded time plus retention has passed.
    pub fn expire_stale_entries(&self, now_ms: u64) {
        for (map, retention_ms) in [
            (&self.latest_demote_start_time_ms_by_broker, self.demotion_retention_ms),
            (&self.latest_remove_start_time_ms_by_broker, self.removal_retention_ms),
        ] {
            match map.lock() {
                Ok(mut entries) => {
                    entries.retain(|_, recorded_at_ms| *recorded_at_ms + retention_ms >= now_ms);
                }
                Err(err) => warn!("History retention sweep failed: {err}"),
            }
        }
    }
}

/// Spawns the periodic retention sweep. The first sweep runs immediately;
/// failures are logged and the job keeps running.
pub fn spawn_history_retainer(
    history: Arc<ExecutionHistory>,
    clock: Arc<dyn Clock>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = interval(HISTORY_SCANNER_PERIOD);
        loop {
            tick.tick().await;
            history.expire_stale_entries(clock.unix_now_millis());
        }
    })
}
