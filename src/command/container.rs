// ABOUTME: Container-engine command builder (docker/podman CLI verbs).
// ABOUTME: The engine binary is chosen from ExecOptions at render time.

use super::template::{TemplateError, render};
use super::{CommandBuilder, shell_quote};
use crate::transport::ExecOptions;
use std::collections::BTreeMap;

/// Container-engine verbs understood by [`ContainerCommand`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerVerb {
    Pull,
    Create,
    Start,
    Stop,
    Restart,
    Remove,
    List,
    Exec,
    Info,
}

impl ContainerVerb {
    fn template(&self) -> &'static str {
        match self {
            ContainerVerb::Pull => "{engine} pull {options}{image}",
            ContainerVerb::Create => "{engine} create {options}{image}{args}",
            ContainerVerb::Start => "{engine} start {options}{containers}",
            ContainerVerb::Stop => "{engine} stop {options}{containers}",
            ContainerVerb::Restart => "{engine} restart {options}{containers}",
            ContainerVerb::Remove => "{engine} rm {options}{containers}",
            ContainerVerb::List => "{engine} ps {options}",
            ContainerVerb::Exec => "{engine} exec {options}{containers}{args}",
            ContainerVerb::Info => "{engine} info {options}",
        }
    }
}

/// Builder for one container-engine command.
#[derive(Debug, Clone)]
#[must_use = "a command builder does nothing until built"]
pub struct ContainerCommand {
    verb: ContainerVerb,
    options: Vec<String>,
    args: Vec<String>,
    data: BTreeMap<&'static str, String>,
}

impl ContainerCommand {
    fn new(verb: ContainerVerb) -> Self {
        Self {
            verb,
            options: Vec::new(),
            args: Vec::new(),
            data: BTreeMap::new(),
        }
    }

    fn with(mut self, key: &'static str, value: String) -> Self {
        self.data.insert(key, value);
        self
    }

    fn on(self, container: &str) -> Self {
        self.with("containers", shell_quote(container))
    }

    pub fn pull(image: &str) -> Self {
        Self::new(ContainerVerb::Pull).with("image", shell_quote(image))
    }

    pub fn create(image: &str) -> Self {
        Self::new(ContainerVerb::Create).with("image", shell_quote(image))
    }

    pub fn start(container: &str) -> Self {
        Self::new(ContainerVerb::Start).on(container)
    }

    pub fn stop(container: &str) -> Self {
        Self::new(ContainerVerb::Stop).on(container)
    }

    pub fn restart(container: &str) -> Self {
        Self::new(ContainerVerb::Restart).on(container)
    }

    pub fn remove(container: &str) -> Self {
        Self::new(ContainerVerb::Remove).on(container)
    }

    pub fn list() -> Self {
        Self::new(ContainerVerb::List)
    }

    pub fn exec(container: &str) -> Self {
        Self::new(ContainerVerb::Exec).on(container)
    }

    pub fn info() -> Self {
        Self::new(ContainerVerb::Info)
    }

    pub fn verb(&self) -> ContainerVerb {
        self.verb
    }

    pub fn add_option(mut self, option: impl Into<String>) -> Self {
        self.options.push(option.into());
        self
    }

    fn add_option_value(mut self, option: &str, value: &str) -> Self {
        self.options.push(format!("{}={}", option, shell_quote(value)));
        self
    }

    /// Trailing positional argument (container command, exec argv).
    pub fn add_arg(mut self, arg: &str) -> Self {
        self.args.push(shell_quote(arg));
        self
    }

    pub fn name(self, name: &str) -> Self {
        self.add_option_value("--name", name)
    }

    pub fn hostname(self, hostname: &str) -> Self {
        self.add_option_value("--hostname", hostname)
    }

    pub fn network(self, network: &str) -> Self {
        self.add_option_value("--network", network)
    }

    pub fn restart_policy(self, policy: &str) -> Self {
        self.add_option_value("--restart", policy)
    }

    pub fn volume(self, host_path: &str, container_path: &str) -> Self {
        self.add_option_value("--volume", &format!("{host_path}:{container_path}"))
    }

    pub fn env(self, key: &str, value: &str) -> Self {
        self.add_option_value("--env", &format!("{key}={value}"))
    }

    pub fn label(self, key: &str, value: &str) -> Self {
        self.add_option_value("--label", &format!("{key}={value}"))
    }

    pub fn entrypoint(self, entrypoint: &str) -> Self {
        self.add_option_value("--entrypoint", entrypoint)
    }

    pub fn privileged(self) -> Self {
        self.add_option("--privileged")
    }

    pub fn filter(self, filter: &str) -> Self {
        self.add_option_value("--filter", filter)
    }

    pub fn format(self, format: &str) -> Self {
        self.add_option_value("--format", format)
    }

    pub fn all(self) -> Self {
        self.add_option("--all")
    }

    pub fn force(self) -> Self {
        self.add_option("--force")
    }
}

impl CommandBuilder for ContainerCommand {
    fn build(mut self, options: &ExecOptions) -> Result<String, TemplateError> {
        let rendered_options = self
            .options
            .iter()
            .map(|o| format!("{o} "))
            .collect::<String>();
        let rendered_args = self
            .args
            .iter()
            .map(|a| format!(" {a}"))
            .collect::<String>();
        self.data.insert("engine", options.engine.binary().to_string());
        self.data.insert("options", rendered_options);
        self.data.insert("args", rendered_args);

        let rendered = render(self.verb.template(), &self.data)?;
        Ok(rendered.trim_end().to_string())
    }
}
