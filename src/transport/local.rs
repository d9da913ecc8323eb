// ABOUTME: Local subprocess transport for operations on the operator's machine.
// ABOUTME: Runs the same command strings as remote transports through a local shell.

use super::{ExecOptions, Protocol, Transport, TransportError, privileged};
use crate::command::shell_quote;
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct LocalTransport {
    default_timeout: Duration,
}

impl Default for LocalTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalTransport {
    pub fn new() -> Self {
        Self {
            default_timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }
}

#[async_trait]
impl Transport for LocalTransport {
    fn protocol(&self) -> Protocol {
        Protocol::Local
    }

    /// The privileged line runs under `bash -c` so redirections and pipes
    /// behave the same as in a remote login shell.
    fn wrap_command(&self, command: &str, options: &ExecOptions) -> String {
        format!("bash -c {}", shell_quote(&privileged(command, options)))
    }

    async fn run(&self, command: &str, timeout: Option<Duration>) -> Result<String, TransportError> {
        let timeout = timeout.unwrap_or(self.default_timeout);
        let child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TransportError::Other(format!("failed to spawn shell: {e}")))?;

        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| TransportError::Other(e.to_string()))?,
            Err(_) => return Err(TransportError::Timeout(timeout)),
        };

        let mut combined = String::from_utf8_lossy(&output.stdout).to_string();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        if output.status.success() {
            Ok(combined)
        } else {
            Err(TransportError::NonZeroExit {
                // Killed by signal has no code.
                exit_code: output.status.code().unwrap_or(-1),
                output: combined,
            })
        }
    }

    async fn upload(&self, content: &[u8], remote_path: &str) -> Result<(), TransportError> {
        tokio::fs::write(remote_path, content)
            .await
            .map_err(|e| TransportError::Upload {
                path: remote_path.to_string(),
                reason: e.to_string(),
            })
    }

    async fn download(&self, remote_path: &str) -> Result<Vec<u8>, TransportError> {
        tokio::fs::read(remote_path)
            .await
            .map_err(|e| TransportError::Download {
                path: remote_path.to_string(),
                reason: e.to_string(),
            })
    }

    fn remote_addr(&self) -> String {
        format!("local:{}", gethostname::gethostname().to_string_lossy())
    }

    async fn close(&self) -> Result<(), TransportError> {
        Ok(())
    }
}
