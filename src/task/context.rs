// ABOUTME: Execution context owning one Task's transport connection.
// ABOUTME: Renders command builders, routes them to the right transport and holds the blackboard.

use super::Blackboard;
use crate::command::{CommandBuilder, TemplateError};
use crate::errno::{self, CodedError, ErrorCode};
use crate::transport::{Connector, ExecOptions, LocalTransport, Transport, TransportError};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl ExecError {
    /// Output of a command that ran and exited non-zero.
    pub fn output(&self) -> Option<&str> {
        match self {
            ExecError::Transport(e) => e.output(),
            ExecError::Template(_) => None,
        }
    }

    pub fn to_coded(&self, on_failure: ErrorCode) -> CodedError {
        match self {
            ExecError::Template(e) => errno::TEMPLATE_RENDER_FAILED.clue(e.to_string()),
            ExecError::Transport(e) => e.to_coded(on_failure),
        }
    }
}

/// Everything a Step can touch while it runs.
pub struct Context {
    transport: Option<Box<dyn Transport>>,
    local: LocalTransport,
    options: ExecOptions,
    blackboard: Blackboard,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("remote", &self.remote_addr())
            .field("options", &self.options)
            .field("blackboard", &self.blackboard)
            .finish()
    }
}

impl Context {
    pub fn new(transport: Option<Box<dyn Transport>>, options: ExecOptions) -> Self {
        let mut local = LocalTransport::new();
        if let Some(timeout) = options.timeout {
            local = local.with_default_timeout(timeout);
        }
        Self {
            transport,
            local,
            options,
            blackboard: Blackboard::new(),
        }
    }

    /// Connect to `target` (if any) and build a context around the connection.
    pub async fn open(
        target: Option<&dyn Connector>,
        options: ExecOptions,
    ) -> Result<Self, TransportError> {
        let transport = match target {
            Some(connector) => Some(connector.connect().await?),
            None => None,
        };
        Ok(Self::new(transport, options))
    }

    /// The Task's execution options.
    pub fn options(&self) -> &ExecOptions {
        &self.options
    }

    pub fn blackboard(&self) -> &Blackboard {
        &self.blackboard
    }

    pub fn blackboard_mut(&mut self) -> &mut Blackboard {
        &mut self.blackboard
    }

    pub(crate) fn into_parts(self) -> (Blackboard, Option<Box<dyn Transport>>) {
        (self.blackboard, self.transport)
    }

    pub fn remote_addr(&self) -> String {
        match &self.transport {
            Some(t) => t.remote_addr(),
            None => self.local.remote_addr(),
        }
    }

    /// Local commands, and every command of a Task without a target, use the
    /// local subprocess transport.
    fn transport_for(&self, options: &ExecOptions) -> &dyn Transport {
        match (&self.transport, options.local) {
            (Some(remote), false) => remote.as_ref(),
            _ => &self.local,
        }
    }

    /// Render `command` into the exact line the chosen transport would run.
    pub fn render(
        &self,
        command: impl CommandBuilder,
        options: &ExecOptions,
    ) -> Result<String, TemplateError> {
        let line = command.build(options)?;
        Ok(self.transport_for(options).wrap_command(&line, options))
    }

    /// Run a command with explicit options.
    pub async fn execute_with(
        &self,
        command: impl CommandBuilder,
        options: &ExecOptions,
    ) -> Result<String, ExecError> {
        let line = self.render(command, options)?;
        let transport = self.transport_for(options);
        debug!(target_addr = %transport.remote_addr(), command = %line, "executing");
        Ok(transport.run(&line, options.timeout).await?)
    }

    /// Run a command with the Task's options.
    pub async fn execute(&self, command: impl CommandBuilder) -> Result<String, ExecError> {
        let options = self.options.clone();
        self.execute_with(command, &options).await
    }

    pub async fn upload(&self, content: &[u8], path: &str) -> Result<(), TransportError> {
        self.transport_for(&self.options).upload(content, path).await
    }

    pub async fn download(&self, path: &str) -> Result<Vec<u8>, TransportError> {
        self.transport_for(&self.options).download(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::ShellCommand;

    #[tokio::test]
    async fn without_target_commands_run_locally() {
        let ctx = Context::new(None, ExecOptions::default());
        let out = ctx.execute(ShellCommand::command("echo hi")).await.unwrap();
        assert_eq!(out.trim(), "hi");
    }

    #[test]
    fn render_under_local_uses_shell_wrapper() {
        let ctx = Context::new(None, ExecOptions::default());
        let opts = ExecOptions::default().with_local(true).with_sudo(true);
        let line = ctx.render(ShellCommand::mkdir(["/data"]).add_option("-p"), &opts).unwrap();
        assert_eq!(line, "bash -c 'sudo mkdir -p /data'");
    }

    #[test]
    fn template_failure_maps_to_render_code() {
        let err = ExecError::Template(TemplateError::MissingKey("image".into()));
        assert_eq!(err.to_coded(errno::COMMAND_FAILED).code, errno::TEMPLATE_RENDER_FAILED);
    }
}
