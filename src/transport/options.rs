// ABOUTME: Per-command execution options threaded through every step.
// ABOUTME: Privilege escalation, locality, engine binary and timeout.

use crate::engine::Engine;
use std::time::Duration;

/// How a command should be executed. Copied per Task, never mutated in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOptions {
    /// Prefix the command with `sudo_alias`.
    pub sudo: bool,
    /// Run through the local subprocess transport instead of the Task's target.
    pub local: bool,
    /// Privilege-escalation invocation (`sudo`, `sudo -E`, `doas`, ...).
    pub sudo_alias: String,
    /// Container engine binary for container commands.
    pub engine: Engine,
    /// Maximum duration of one command; `None` uses the transport default.
    pub timeout: Option<Duration>,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            sudo: false,
            local: false,
            sudo_alias: "sudo".to_string(),
            engine: Engine::Docker,
            timeout: None,
        }
    }
}

impl ExecOptions {
    pub fn with_sudo(mut self, sudo: bool) -> Self {
        self.sudo = sudo;
        self
    }

    pub fn with_local(mut self, local: bool) -> Self {
        self.local = local;
        self
    }

    pub fn with_sudo_alias(mut self, alias: impl Into<String>) -> Self {
        self.sudo_alias = alias.into();
        self
    }

    pub fn with_engine(mut self, engine: Engine) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Apply the privilege-escalation prefix, if requested.
pub fn privileged(command: &str, options: &ExecOptions) -> String {
    if options.sudo && !options.sudo_alias.is_empty() {
        format!("{} {}", options.sudo_alias, command)
    } else {
        command.to_string()
    }
}
