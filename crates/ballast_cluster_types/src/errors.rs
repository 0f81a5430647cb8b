use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlPlaneError {
    #[error("Control plane request failed: {0}")]
    RequestFailed(String),
    #[error("Control plane client is closed.")]
    ClientClosed,
}

#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClusterViewError {
    #[error("Cluster metadata refresh failed: {0}")]
    RefreshFailed(String),
}
