// ABOUTME: Preflight checks as a generic probe/judge step pair.
// ABOUTME: The probe records command output without failing; the judge turns it into a coded error.

mod checks;

pub use checks::{
    clock_skew, directory_writable, disk_mounted, engine_present, is_mounted, kernel_module,
    kernel_version, listening_ports, parse_kernel_version, port_available, ssh_reachable,
};

use crate::command::CommandBuilder;
use crate::errno::{self, CodedError};
use crate::task::{Context, ExecError, Slot, Step, StepOutcome, StepResult, Task};
use crate::transport::TransportError;
use async_trait::async_trait;

/// What a probe saw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutput {
    pub output: String,
    pub success: bool,
}

/// Runs a read-only command and stores its output, whatever the exit status.
pub struct Probe<C> {
    name: String,
    command: C,
    out: Slot<ProbeOutput>,
}

#[async_trait]
impl<C> Step for Probe<C>
where
    C: CommandBuilder + Clone + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn mutates(&self) -> bool {
        false
    }

    async fn execute(&self, ctx: &mut Context) -> StepResult {
        let probe = match ctx.execute(self.command.clone()).await {
            Ok(output) => ProbeOutput {
                output,
                success: true,
            },
            Err(ExecError::Transport(TransportError::NonZeroExit { output, .. })) => ProbeOutput {
                output,
                success: false,
            },
            Err(e) => return Err(e.to_coded(errno::COMMAND_FAILED)),
        };
        ctx.blackboard_mut().insert(self.out, probe);
        Ok(StepOutcome::Continue)
    }
}

/// Converts a probe's output into success or a coded error.
pub struct Judge<F> {
    name: String,
    input: Slot<ProbeOutput>,
    judge: F,
}

#[async_trait]
impl<F> Step for Judge<F>
where
    F: Fn(&ProbeOutput) -> Result<(), CodedError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn mutates(&self) -> bool {
        false
    }

    async fn execute(&self, ctx: &mut Context) -> StepResult {
        let probe = ctx.blackboard().require(self.input)?;
        (self.judge)(probe)?;
        Ok(StepOutcome::Continue)
    }
}

/// A probe step and the judge that reads it.
pub struct Check {
    name: String,
    probe: Box<dyn Step>,
    judge: Box<dyn Step>,
}

impl std::fmt::Debug for Check {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Check")
            .field("name", &self.name)
            .field("probe", &self.probe.name())
            .field("judge", &self.judge.name())
            .finish()
    }
}

impl Check {
    pub fn new<C, F>(name: &str, slot: Slot<ProbeOutput>, command: C, judge: F) -> Self
    where
        C: CommandBuilder + Clone + Sync + 'static,
        F: Fn(&ProbeOutput) -> Result<(), CodedError> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            probe: Box::new(Probe {
                name: format!("probe {name}"),
                command,
                out: slot,
            }),
            judge: Box::new(Judge {
                name: format!("judge {name}"),
                input: slot,
                judge,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_to(self, task: &mut Task) {
        task.push_step(self.probe);
        task.push_step(self.judge);
    }

    pub fn into_steps(self) -> [Box<dyn Step>; 2] {
        [self.probe, self.judge]
    }
}
