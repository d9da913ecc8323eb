// ABOUTME: Container-engine steps: pull, create, start, restart, stop, remove, exec.
// ABOUTME: Stop and remove treat a missing container as the goal state already met.

use super::is_no_such_container;
use crate::command::ContainerCommand;
use crate::errno::{self, ErrorCode};
use crate::task::{Context, Input, Slot, Step, StepOutcome, StepResult};
use crate::types::ContainerId;
use async_trait::async_trait;

#[derive(Debug, Clone)]
pub struct PullImage {
    image: String,
}

impl PullImage {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
        }
    }
}

#[async_trait]
impl Step for PullImage {
    fn name(&self) -> &str {
        "pull image"
    }

    async fn execute(&self, ctx: &mut Context) -> StepResult {
        ctx.execute(ContainerCommand::pull(&self.image))
            .await
            .map_err(|e| e.to_coded(errno::PULL_IMAGE_FAILED))?;
        Ok(StepOutcome::Continue)
    }
}

/// Everything `create` needs to know about a container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerSpec {
    pub image: String,
    pub name: Option<String>,
    pub hostname: Option<String>,
    pub network: Option<String>,
    pub restart_policy: Option<String>,
    pub volumes: Vec<(String, String)>,
    pub envs: Vec<(String, String)>,
    pub labels: Vec<(String, String)>,
    pub entrypoint: Option<String>,
    pub args: Vec<String>,
    pub privileged: bool,
}

impl ContainerSpec {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            ..Self::default()
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    pub fn network(mut self, network: impl Into<String>) -> Self {
        self.network = Some(network.into());
        self
    }

    pub fn restart_policy(mut self, policy: impl Into<String>) -> Self {
        self.restart_policy = Some(policy.into());
        self
    }

    pub fn volume(mut self, host: impl Into<String>, container: impl Into<String>) -> Self {
        self.volumes.push((host.into(), container.into()));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.push((key.into(), value.into()));
        self
    }

    pub fn entrypoint(mut self, entrypoint: impl Into<String>) -> Self {
        self.entrypoint = Some(entrypoint.into());
        self
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn privileged(mut self) -> Self {
        self.privileged = true;
        self
    }

    /// The `create` command for this container.
    pub fn create_command(&self) -> ContainerCommand {
        let mut cmd = ContainerCommand::create(&self.image);
        if let Some(name) = &self.name {
            cmd = cmd.name(name);
        }
        if let Some(hostname) = &self.hostname {
            cmd = cmd.hostname(hostname);
        }
        if let Some(network) = &self.network {
            cmd = cmd.network(network);
        }
        if let Some(policy) = &self.restart_policy {
            cmd = cmd.restart_policy(policy);
        }
        for (host, container) in &self.volumes {
            cmd = cmd.volume(host, container);
        }
        for (key, value) in &self.envs {
            cmd = cmd.env(key, value);
        }
        for (key, value) in &self.labels {
            cmd = cmd.label(key, value);
        }
        if let Some(entrypoint) = &self.entrypoint {
            cmd = cmd.entrypoint(entrypoint);
        }
        if self.privileged {
            cmd = cmd.privileged();
        }
        for arg in &self.args {
            cmd = cmd.add_arg(arg);
        }
        cmd
    }
}

/// Create a container and record its id.
#[derive(Debug, Clone)]
pub struct CreateContainer {
    spec: ContainerSpec,
    out: Slot<ContainerId>,
}

impl CreateContainer {
    pub fn new(spec: ContainerSpec, out: Slot<ContainerId>) -> Self {
        Self { spec, out }
    }
}

#[async_trait]
impl Step for CreateContainer {
    fn name(&self) -> &str {
        "create container"
    }

    async fn execute(&self, ctx: &mut Context) -> StepResult {
        let output = ctx
            .execute(self.spec.create_command())
            .await
            .map_err(|e| e.to_coded(errno::CREATE_CONTAINER_FAILED))?;
        // Pull progress may precede the id; the id is the last line.
        let id = output
            .lines()
            .map(str::trim)
            .rfind(|l| !l.is_empty())
            .ok_or_else(|| errno::CREATE_CONTAINER_FAILED.clue("engine printed no container id"))?;
        ctx.blackboard_mut().insert(self.out, ContainerId::new(id));
        Ok(StepOutcome::Continue)
    }
}

macro_rules! container_verb_step {
    ($(#[$meta:meta])* $ty:ident, $label:literal, $builder:path, $code:expr, tolerate_missing = $tolerate:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        pub struct $ty {
            container: Input<ContainerId>,
        }

        impl $ty {
            pub fn new(container: impl Into<Input<ContainerId>>) -> Self {
                Self {
                    container: container.into(),
                }
            }
        }

        #[async_trait]
        impl Step for $ty {
            fn name(&self) -> &str {
                $label
            }

            async fn execute(&self, ctx: &mut Context) -> StepResult {
                let id = self.container.resolve(ctx.blackboard())?;
                match ctx.execute($builder(id.as_str())).await {
                    Ok(_) => Ok(StepOutcome::Continue),
                    Err(e) if $tolerate && e.output().is_some_and(is_no_such_container) => {
                        tracing::debug!(container = %id.short(), "container already gone");
                        Ok(StepOutcome::Continue)
                    }
                    Err(e) => Err(e.to_coded($code)),
                }
            }
        }
    };
}

container_verb_step!(
    StartContainer,
    "start container",
    ContainerCommand::start,
    errno::START_CONTAINER_FAILED,
    tolerate_missing = false
);
container_verb_step!(
    RestartContainer,
    "restart container",
    ContainerCommand::restart,
    errno::START_CONTAINER_FAILED,
    tolerate_missing = false
);
container_verb_step!(
    /// Stop a container. A container that no longer exists is already stopped.
    StopContainer,
    "stop container",
    ContainerCommand::stop,
    errno::STOP_CONTAINER_FAILED,
    tolerate_missing = true
);

/// Remove a container. A container that no longer exists is already removed.
#[derive(Debug, Clone)]
pub struct RemoveContainer {
    container: Input<ContainerId>,
    force: bool,
}

impl RemoveContainer {
    pub fn new(container: impl Into<Input<ContainerId>>) -> Self {
        Self {
            container: container.into(),
            force: false,
        }
    }

    pub fn force(mut self) -> Self {
        self.force = true;
        self
    }
}

#[async_trait]
impl Step for RemoveContainer {
    fn name(&self) -> &str {
        "remove container"
    }

    async fn execute(&self, ctx: &mut Context) -> StepResult {
        let id = self.container.resolve(ctx.blackboard())?;
        let mut cmd = ContainerCommand::remove(id.as_str());
        if self.force {
            cmd = cmd.force();
        }
        match ctx.execute(cmd).await {
            Ok(_) => Ok(StepOutcome::Continue),
            Err(e) if e.output().is_some_and(is_no_such_container) => Ok(StepOutcome::Continue),
            Err(e) => Err(e.to_coded(errno::REMOVE_CONTAINER_FAILED)),
        }
    }
}

/// Run a command inside a container.
#[derive(Debug, Clone)]
pub struct ContainerExec {
    name: String,
    container: Input<ContainerId>,
    args: Vec<String>,
    out: Option<Slot<String>>,
    on_failure: ErrorCode,
}

impl ContainerExec {
    pub fn new<I, S>(name: impl Into<String>, container: impl Into<Input<ContainerId>>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            container: container.into(),
            args: args.into_iter().map(Into::into).collect(),
            out: None,
            on_failure: errno::COMMAND_FAILED,
        }
    }

    pub fn capture(mut self, out: Slot<String>) -> Self {
        self.out = Some(out);
        self
    }

    pub fn on_failure(mut self, code: ErrorCode) -> Self {
        self.on_failure = code;
        self
    }
}

#[async_trait]
impl Step for ContainerExec {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &mut Context) -> StepResult {
        let id = self.container.resolve(ctx.blackboard())?;
        let cmd = self
            .args
            .iter()
            .fold(ContainerCommand::exec(id.as_str()), |cmd, arg| cmd.add_arg(arg));
        let output = ctx.execute(cmd).await.map_err(|e| e.to_coded(self.on_failure))?;
        if let Some(out) = self.out {
            ctx.blackboard_mut().insert(out, output);
        }
        Ok(StepOutcome::Continue)
    }
}

impl From<ContainerId> for Input<ContainerId> {
    fn from(id: ContainerId) -> Self {
        Input::Value(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandBuilder;
    use crate::transport::ExecOptions;

    #[test]
    fn spec_renders_create_command() {
        let spec = ContainerSpec::new("opencurve/curvebs:v1.2")
            .name("c1_mds_host1_0")
            .hostname("mds-host1")
            .network("host")
            .restart_policy("always")
            .volume("/data/mds/conf", "/curvebs/mds/conf")
            .env("TZ", "UTC")
            .arg("--role")
            .arg("mds");
        let line = spec.create_command().build(&ExecOptions::default()).unwrap();
        assert_eq!(
            line,
            "docker create --name=c1_mds_host1_0 --hostname=mds-host1 --network=host \
             --restart=always --volume=/data/mds/conf:/curvebs/mds/conf --env=TZ=UTC \
             opencurve/curvebs:v1.2 --role mds"
        );
    }
}
