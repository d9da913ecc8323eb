// ABOUTME: Transport abstraction: one capability interface, three implementations.
// ABOUTME: SSH, local subprocess and HTTP agent share the same run/upload/download contract.

mod error;
mod http;
mod local;
mod options;
mod ssh;

pub use error::TransportError;
pub use http::{HttpAgentConfig, HttpTransport};
pub use local::LocalTransport;
pub use options::{ExecOptions, privileged};
pub use ssh::SshTransport;

use crate::ssh::SessionConfig;
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

/// Which mechanism a transport uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Ssh,
    Local,
    Http,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Ssh => write!(f, "ssh"),
            Protocol::Local => write!(f, "local"),
            Protocol::Http => write!(f, "http"),
        }
    }
}

/// Runs commands and moves files on one target.
///
/// `run` returns stdout and stderr combined. A non-zero exit is an error, but
/// the output travels inside [`TransportError::NonZeroExit`] so callers can
/// still inspect it.
#[async_trait]
pub trait Transport: Send + Sync {
    fn protocol(&self) -> Protocol;

    /// Turn a rendered command into the exact line this transport executes.
    fn wrap_command(&self, command: &str, options: &ExecOptions) -> String {
        privileged(command, options)
    }

    async fn run(&self, command: &str, timeout: Option<Duration>) -> Result<String, TransportError>;

    async fn upload(&self, content: &[u8], remote_path: &str) -> Result<(), TransportError>;

    async fn download(&self, remote_path: &str) -> Result<Vec<u8>, TransportError>;

    fn remote_addr(&self) -> String;

    async fn close(&self) -> Result<(), TransportError>;
}

/// Opens a transport for one Task.
#[async_trait]
pub trait Connector: Send + Sync + fmt::Debug {
    async fn connect(&self) -> Result<Box<dyn Transport>, TransportError>;

    /// Human-readable target, for reports.
    fn describe(&self) -> String;
}

/// The built-in transport targets.
#[derive(Debug, Clone)]
pub enum Target {
    Ssh(SessionConfig),
    Local,
    Http(HttpAgentConfig),
}

#[async_trait]
impl Connector for Target {
    async fn connect(&self) -> Result<Box<dyn Transport>, TransportError> {
        match self {
            Target::Ssh(config) => Ok(Box::new(SshTransport::connect(config.clone()).await?)),
            Target::Local => Ok(Box::new(LocalTransport::new())),
            Target::Http(config) => Ok(Box::new(HttpTransport::new(config.clone()))),
        }
    }

    fn describe(&self) -> String {
        match self {
            Target::Ssh(config) => format!("{}@{}:{}", config.user, config.host, config.port),
            Target::Local => "localhost".to_string(),
            Target::Http(config) => format!("http://{}:{}", config.host, config.port),
        }
    }
}
