//! Error taxonomy of the endpoint manager.

use crate::server::ServerError;
use crate::store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("Endpoint {0} not found")]
    NotFound(String),
    #[error("Port {0} is already in use")]
    PortInUse(u16),
    #[error("Invalid port: {0}")]
    InvalidPort(u16),
    #[error("Unsupported protocol: {0}")]
    UnsupportedProtocol(String),
    #[error("Failed to start endpoint on port {port}: {source}")]
    StartFailed { port: u16, source: ServerError },
    #[error("Failed to stop endpoint {id}: {source}")]
    StopFailed { id: String, source: ServerError },
    #[error("Failed to restart endpoint {id}: {source}")]
    RestartFailed { id: String, source: ServerError },
    #[error("Failed to persist endpoints: {0}")]
    PersistenceFailed(#[from] StoreError),
    #[error("Endpoint {0} has no file root")]
    NoFileRoot(String),
}

impl EndpointError {
    /// Stable machine readable kind, used as the `error` field of API responses.
    pub fn kind(&self) -> &'static str {
        match self {
            EndpointError::NotFound(_) => "not_found",
            EndpointError::PortInUse(_) => "port_in_use",
            EndpointError::InvalidPort(_) => "invalid_port",
            EndpointError::UnsupportedProtocol(_) => "unsupported_protocol",
            EndpointError::StartFailed { .. } => "start_failed",
            EndpointError::StopFailed { .. } => "stop_failed",
            EndpointError::RestartFailed { .. } => "restart_failed",
            EndpointError::PersistenceFailed(_) => "persistence_failed",
            EndpointError::NoFileRoot(_) => "no_file_root",
        }
    }
}
