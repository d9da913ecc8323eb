// ABOUTME: Application-wide error types for clusteradm.
// ABOUTME: Uses thiserror for ergonomic error handling.

use crate::errno::CodedError;
use crate::runner::RunError;
use crate::storage::StorageError;
use crate::transport::TransportError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("file already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("configuration file not found in {0}")]
    ConfigNotFound(PathBuf),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("unknown host: {0}")]
    UnknownHost(String),

    #[error("cluster not found: {0}")]
    ClusterNotFound(String),

    #[error("engine detection failed: {0}")]
    EngineDetection(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("state store: {0}")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Run(#[from] RunError),

    #[error(transparent)]
    Coded(#[from] CodedError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Numeric code recorded in the audit log.
    pub fn code(&self) -> u32 {
        match self {
            Error::Run(e) => e.code(),
            Error::Coded(e) => e.code(),
            Error::Storage(e) => e.to_coded().code(),
            Error::Transport(e) => e.to_coded(crate::errno::COMMAND_FAILED).code(),
            _ => crate::errno::UNKNOWN.code,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
