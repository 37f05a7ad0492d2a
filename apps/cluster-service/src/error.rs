use std::io;

use cluster_transport::TransportError;
use thiserror::Error;

use crate::debug::DebugError;
use crate::host::HostError;
use crate::proxy::ClusterError;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Cluster(#[from] ClusterError),
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("host error: {0}")]
    Host(#[from] HostError),
    #[error("{0}")]
    Debug(#[from] DebugError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("failed to render dump: {0}")]
    Dump(#[from] serde_json::Error),
    #[error("logging initialization failed: {0}")]
    Logging(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
