// ABOUTME: SSH-specific error types.
// ABOUTME: Separates unreachable hosts (worth a retry) from credential and channel failures.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot reach {addr}: {reason}")]
    Unreachable { addr: String, reason: String },

    #[error("connecting to {addr} timed out after {timeout:?}")]
    ConnectTimeout { addr: String, timeout: Duration },

    #[error("host key for {addr} is not trusted")]
    HostKeyRejected { addr: String },

    #[error("{user}@{addr} rejected every offered key")]
    Rejected { user: String, addr: String },

    #[error("no usable credentials: {0}")]
    NoCredentials(String),

    #[error("cannot load key {path}: {reason}")]
    Key { path: PathBuf, reason: String },

    #[error("channel error: {0}")]
    Channel(String),

    #[error("command timed out after {0:?}")]
    Timeout(Duration),

    #[error("channel closed before the command reported an exit status")]
    NoExitStatus,

    #[error("transfer of {path} failed: {reason}")]
    Transfer { path: String, reason: String },

    #[error("SSH protocol error: {0}")]
    Protocol(#[from] russh::Error),
}

impl Error {
    /// Whether another connect attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Unreachable { .. } | Error::ConnectTimeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_network_failures_are_retried() {
        let unreachable = Error::Unreachable {
            addr: "10.0.0.1:22".into(),
            reason: "no route to host".into(),
        };
        assert!(unreachable.is_retryable());
        assert!(!Error::Rejected { user: "root".into(), addr: "10.0.0.1:22".into() }.is_retryable());
        assert!(!Error::HostKeyRejected { addr: "10.0.0.1:22".into() }.is_retryable());
    }
}
