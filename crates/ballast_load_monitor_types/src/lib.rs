use std::sync::Arc;

use async_trait::async_trait;
#[cfg(any(feature = "testing", test))]
use mockall::automock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type LoadMonitorResult<T> = Result<T, LoadMonitorError>;
pub type SharedLoadMonitorClient = Arc<dyn LoadMonitorClient>;

/// Control over the load monitor's metric sampling. Sampling is paused for
/// the duration of an execution so that in-flight movements do not pollute
/// the load model.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait LoadMonitorClient: Send + Sync {
    /// Pauses metric sampling. Fails with [`LoadMonitorError::NotReady`]
    /// while the monitor is still bootstrapping; callers are expected to
    /// retry.
    async fn pause_metric_sampling(&self, reason: String) -> LoadMonitorResult<()>;

    /// Resumes metric sampling.
    async fn resume_metric_sampling(&self, reason: String) -> LoadMonitorResult<()>;
}

#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadMonitorError {
    #[error("Load monitor is not ready to change sampling state.")]
    NotReady,
    #[error("Load monitor request failed: {0}")]
    Internal(String),
}
