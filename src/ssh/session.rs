// ABOUTME: One authenticated SSH connection to a cluster host.
// ABOUTME: Retries unreachable hosts, runs commands on fresh channels and moves files through cat.

use super::auth::Credentials;
use super::error::{Error, Result};
use super::host_key::{HostKeyCheck, HostKeyPolicy};
use crate::command::shell_quote;
use russh::client::{self, Handle};
use russh::{ChannelMsg, Disconnect};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Where and how to open a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    /// Private key; when unset the agent and then `~/.ssh/id_*` are tried.
    pub key_path: Option<PathBuf>,
    pub use_agent: bool,
    pub host_keys: HostKeyPolicy,
    /// Defaults to `~/.ssh/known_hosts`.
    pub known_hosts: Option<PathBuf>,
    pub connect_timeout: Duration,
    /// Extra attempts after the first when the host cannot be reached.
    pub connect_retries: u32,
    /// Used when a command has no timeout of its own.
    pub command_timeout: Duration,
}

impl SessionConfig {
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 22,
            user: user.into(),
            key_path: None,
            use_agent: true,
            host_keys: HostKeyPolicy::Strict,
            known_hosts: None,
            connect_timeout: Duration::from_secs(10),
            connect_retries: 2,
            command_timeout: Duration::from_secs(300),
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn key_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.key_path = Some(path.into());
        self
    }

    pub fn use_agent(mut self, use_agent: bool) -> Self {
        self.use_agent = use_agent;
        self
    }

    pub fn host_keys(mut self, policy: HostKeyPolicy) -> Self {
        self.host_keys = policy;
        self
    }

    pub fn known_hosts(mut self, path: impl Into<PathBuf>) -> Self {
        self.known_hosts = Some(path.into());
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn connect_retries(mut self, retries: u32) -> Self {
        self.connect_retries = retries;
        self
    }

    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// `host:port`
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// What a remote command produced.
#[derive(Debug, Clone, Default)]
pub struct ExecOutput {
    pub exit_status: u32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_status == 0
    }

    /// Stdout then stderr, decoded lossily.
    pub fn text(&self) -> String {
        let mut text = String::from_utf8_lossy(&self.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&self.stderr));
        text
    }

    fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_string()
    }
}

/// Pause before connect attempt `attempt` (1-based retries).
fn backoff(attempt: u32) -> Duration {
    let millis = 500u64.saturating_mul(1 << attempt.min(4));
    Duration::from_millis(millis.min(5_000))
}

pub struct Session {
    config: SessionConfig,
    handle: Handle<HostKeyCheck>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("addr", &self.config.addr())
            .field("user", &self.config.user)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Connect and authenticate, retrying only while the host is unreachable.
    pub async fn connect(config: SessionConfig) -> Result<Self> {
        let mut attempt = 0;
        loop {
            match Self::connect_once(&config).await {
                Ok(handle) => return Ok(Self { config, handle }),
                Err(e) if e.is_retryable() && attempt < config.connect_retries => {
                    attempt += 1;
                    let pause = backoff(attempt);
                    warn!(addr = %config.addr(), error = %e, attempt, "ssh connect failed, retrying in {pause:?}");
                    tokio::time::sleep(pause).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn connect_once(config: &SessionConfig) -> Result<Handle<HostKeyCheck>> {
        let addr = config.addr();
        let credentials = Credentials::resolve(config.key_path.as_deref(), config.use_agent).await?;
        let check = HostKeyCheck::new(&config.host, config.port, config.host_keys, config.known_hosts.clone());
        let client_config = Arc::new(client::Config {
            inactivity_timeout: Some(Duration::from_secs(30)),
            ..Default::default()
        });

        let connecting = client::connect(client_config, (config.host.as_str(), config.port), check);
        let mut handle = match tokio::time::timeout(config.connect_timeout, connecting).await {
            Err(_) => {
                return Err(Error::ConnectTimeout {
                    addr,
                    timeout: config.connect_timeout,
                });
            }
            Ok(Err(russh::Error::UnknownKey)) => return Err(Error::HostKeyRejected { addr }),
            Ok(Err(russh::Error::IO(e))) => {
                return Err(Error::Unreachable {
                    addr,
                    reason: e.to_string(),
                });
            }
            Ok(Err(e)) => return Err(e.into()),
            Ok(Ok(handle)) => handle,
        };

        if !credentials.authenticate(&mut handle, &config.user).await? {
            return Err(Error::Rejected {
                user: config.user.clone(),
                addr,
            });
        }
        debug!(addr = %config.addr(), user = %config.user, "ssh authenticated");
        Ok(handle)
    }

    /// Run `command`; `None` uses the session's default timeout.
    pub async fn exec(&self, command: &str, timeout: Option<Duration>) -> Result<ExecOutput> {
        let timeout = timeout.unwrap_or(self.config.command_timeout);
        tokio::time::timeout(timeout, self.run_channel(command, None))
            .await
            .map_err(|_| Error::Timeout(timeout))?
    }

    /// Replace `remote_path` with `content`.
    pub async fn upload(&self, content: &[u8], remote_path: &str) -> Result<()> {
        let command = format!("cat > {}", shell_quote(remote_path));
        self.transfer(&command, Some(content), remote_path).await?;
        Ok(())
    }

    pub async fn download(&self, remote_path: &str) -> Result<Vec<u8>> {
        let command = format!("cat {}", shell_quote(remote_path));
        Ok(self.transfer(&command, None, remote_path).await?.stdout)
    }

    async fn transfer(&self, command: &str, stdin: Option<&[u8]>, path: &str) -> Result<ExecOutput> {
        let timeout = self.config.command_timeout;
        let output = tokio::time::timeout(timeout, self.run_channel(command, stdin))
            .await
            .map_err(|_| Error::Timeout(timeout))??;
        if !output.success() {
            return Err(Error::Transfer {
                path: path.to_string(),
                reason: output.stderr_text(),
            });
        }
        Ok(output)
    }

    async fn run_channel(&self, command: &str, stdin: Option<&[u8]>) -> Result<ExecOutput> {
        let mut channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| Error::Channel(format!("open: {e}")))?;
        channel
            .exec(true, command)
            .await
            .map_err(|e| Error::Channel(format!("exec: {e}")))?;
        if let Some(input) = stdin {
            channel
                .data(input)
                .await
                .map_err(|e| Error::Channel(format!("write stdin: {e}")))?;
            channel
                .eof()
                .await
                .map_err(|e| Error::Channel(format!("close stdin: {e}")))?;
        }

        let mut output = ExecOutput::default();
        let mut exit_status = None;
        let mut eof = false;
        // Exit status and EOF may arrive in either order.
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { data } => output.stdout.extend_from_slice(&data),
                ChannelMsg::ExtendedData { data, ext: 1 } => output.stderr.extend_from_slice(&data),
                ChannelMsg::ExitStatus { exit_status: status } => exit_status = Some(status),
                ChannelMsg::Eof => eof = true,
                ChannelMsg::Close => break,
                _ => {}
            }
            if eof && exit_status.is_some() {
                break;
            }
        }

        output.exit_status = exit_status.ok_or(Error::NoExitStatus)?;
        Ok(output)
    }

    pub fn addr(&self) -> String {
        self.config.addr()
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await?;
        Ok(())
    }
}
