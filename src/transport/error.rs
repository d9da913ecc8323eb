// ABOUTME: Transport error type shared by all transports.
// ABOUTME: Keeps timeouts distinct from commands that ran and exited non-zero.

use crate::errno::{self, CodedError, ErrorCode};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection to {addr} failed: {reason}")]
    Connect { addr: String, reason: String },

    #[error("authentication to {0} failed")]
    Authentication(String),

    #[error("command exited with status {exit_code}")]
    NonZeroExit { exit_code: i32, output: String },

    #[error("command timed out after {0:?}")]
    Timeout(Duration),

    #[error("upload to {path} failed: {reason}")]
    Upload { path: String, reason: String },

    #[error("download of {path} failed: {reason}")]
    Download { path: String, reason: String },

    #[error("connection closed: {0}")]
    Closed(String),

    #[error("no transport for a remote command: {0}")]
    NoTransport(String),

    #[error("transport error: {0}")]
    Other(String),
}

impl TransportError {
    /// Output of a command that ran but failed.
    pub fn output(&self) -> Option<&str> {
        match self {
            TransportError::NonZeroExit { output, .. } => Some(output),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout(_))
    }

    /// Map to the taxonomy. `on_failure` is used when the command itself failed.
    pub fn to_coded(&self, on_failure: ErrorCode) -> CodedError {
        match self {
            TransportError::NonZeroExit { output, .. } => on_failure.clue(output.clone()),
            TransportError::Timeout(_) => errno::COMMAND_TIMEOUT.clue(self.to_string()),
            TransportError::Connect { .. } => errno::CONNECT_FAILED.clue(self.to_string()),
            TransportError::Authentication(_) => errno::AUTHENTICATION_FAILED.clue(self.to_string()),
            TransportError::Upload { .. } => errno::UPLOAD_FAILED.clue(self.to_string()),
            TransportError::Download { .. } => errno::DOWNLOAD_FAILED.clue(self.to_string()),
            TransportError::Closed(_) => errno::TRANSPORT_CLOSED.clue(self.to_string()),
            TransportError::NoTransport(_) | TransportError::Other(_) => {
                errno::UNKNOWN.clue(self.to_string())
            }
        }
    }
}

impl From<crate::ssh::Error> for TransportError {
    fn from(err: crate::ssh::Error) -> Self {
        use crate::ssh::Error as SshError;
        let message = err.to_string();
        match err {
            SshError::Unreachable { addr, reason } => TransportError::Connect { addr, reason },
            SshError::ConnectTimeout { addr, .. } | SshError::HostKeyRejected { addr } => {
                TransportError::Connect {
                    addr,
                    reason: message,
                }
            }
            SshError::Rejected { addr, .. } => TransportError::Authentication(addr),
            SshError::NoCredentials(_) | SshError::Key { .. } => TransportError::Authentication(message),
            SshError::Timeout(duration) => TransportError::Timeout(duration),
            SshError::NoExitStatus => TransportError::Closed(message),
            SshError::Transfer { path, reason } => TransportError::Upload { path, reason },
            SshError::Channel(_) | SshError::Protocol(_) => TransportError::Other(message),
        }
    }
}
