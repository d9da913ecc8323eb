// ABOUTME: Task definition and its single-shot execution loop.
// ABOUTME: Runs Steps in order over one Context, then post-steps, then closes the transport once.

use super::{Blackboard, Context, Step, StepOutcome};
use crate::diagnostics::{Diagnostics, Warning};
use crate::errno::{self, CodedError};
use crate::transport::{Connector, ExecOptions};
use crate::types::ServiceId;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

const CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Terminal state of one Task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed,
    /// A Step reported the rest of the Task unnecessary.
    Skipped,
    /// A Step reported the work already fully done.
    Broken,
    Failed(CodedError),
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, TaskOutcome::Failed(_))
    }

    pub fn error(&self) -> Option<&CodedError> {
        match self {
            TaskOutcome::Failed(e) => Some(e),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TaskOutcome::Completed => "completed",
            TaskOutcome::Skipped => "skipped",
            TaskOutcome::Broken => "already done",
            TaskOutcome::Failed(_) => "failed",
        }
    }
}

impl fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskOutcome::Failed(e) => write!(f, "failed: {e}"),
            other => f.write_str(other.label()),
        }
    }
}

/// A Step that ran, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRecord {
    pub name: String,
    pub mutates: bool,
}

/// What happened when a Task ran.
#[derive(Debug)]
pub struct TaskReport {
    pub name: String,
    pub subname: String,
    pub target: String,
    pub identity: Option<ServiceId>,
    pub outcome: TaskOutcome,
    /// Main Steps that were executed, including the one that stopped the Task.
    pub steps: Vec<StepRecord>,
    pub post_steps_run: usize,
    pub diagnostics: Diagnostics,
    /// Values the Steps left behind, for the caller to read after the run.
    pub blackboard: Blackboard,
    pub duration: Duration,
}

impl TaskReport {
    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }

    pub fn steps_run(&self) -> usize {
        self.steps.len()
    }

    /// Executed Steps that change the target.
    pub fn side_effecting_steps(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter(|s| s.mutates)
            .map(|s| s.name.as_str())
            .collect()
    }

    /// Report for a Task that never started, e.g. cancelled before its turn.
    pub fn not_run(task: &Task, reason: CodedError) -> Self {
        Self {
            name: task.name.clone(),
            subname: task.subname.clone(),
            target: task.target_description(),
            identity: task.identity.clone(),
            outcome: TaskOutcome::Failed(reason),
            steps: Vec::new(),
            post_steps_run: 0,
            diagnostics: Diagnostics::default(),
            blackboard: Blackboard::new(),
            duration: Duration::ZERO,
        }
    }
}

/// An ordered list of Steps bound to one transport target.
///
/// A Task is built fresh for each invocation and consumed by
/// [`execute`](Self::execute).
pub struct Task {
    name: String,
    subname: String,
    steps: Vec<Box<dyn Step>>,
    post_steps: Vec<Box<dyn Step>>,
    target: Option<Arc<dyn Connector>>,
    options: ExecOptions,
    identity: Option<ServiceId>,
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("subname", &self.subname)
            .field("steps", &self.steps.iter().map(|s| s.name()).collect::<Vec<_>>())
            .field(
                "post_steps",
                &self.post_steps.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .field("target", &self.target_description())
            .field("identity", &self.identity)
            .finish()
    }
}

impl Task {
    pub fn new(name: impl Into<String>, subname: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            subname: subname.into(),
            steps: Vec::new(),
            post_steps: Vec::new(),
            target: None,
            options: ExecOptions::default(),
            identity: None,
        }
    }

    pub fn with_target(mut self, target: Arc<dyn Connector>) -> Self {
        self.target = Some(target);
        self
    }

    pub fn with_options(mut self, options: ExecOptions) -> Self {
        self.options = options;
        self
    }

    /// The service this Task acts on. The runner never runs two Tasks with
    /// the same identity at the same time.
    pub fn with_identity(mut self, identity: ServiceId) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn add_step(&mut self, step: impl Step + 'static) {
        self.steps.push(Box::new(step));
    }

    pub fn push_step(&mut self, step: Box<dyn Step>) {
        self.steps.push(step);
    }

    pub fn add_post_step(&mut self, step: impl Step + 'static) {
        self.post_steps.push(Box::new(step));
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn subname(&self) -> &str {
        &self.subname
    }

    pub fn identity(&self) -> Option<&ServiceId> {
        self.identity.as_ref()
    }

    pub fn options(&self) -> &ExecOptions {
        &self.options
    }

    pub fn target_description(&self) -> String {
        match &self.target {
            Some(t) => t.describe(),
            None => "localhost".to_string(),
        }
    }

    pub async fn execute(self) -> TaskReport {
        self.execute_until(std::future::pending::<()>()).await
    }

    /// Run the Task, abandoning the current Step if `shutdown` resolves first.
    ///
    /// On cancellation the outcome is `Failed(CANCELLED)`, post-steps do not
    /// run, and the transport is still closed.
    pub async fn execute_until<F>(self, shutdown: F) -> TaskReport
    where
        F: Future<Output = ()> + Send,
    {
        let started = Instant::now();
        let target = self.target_description();
        let mut diagnostics = Diagnostics::default();
        tokio::pin!(shutdown);

        info!(task = %self.name, subname = %self.subname, target = %target, "task started");

        let opened = tokio::select! {
            biased;
            _ = &mut shutdown => None,
            result = Context::open(self.target.as_deref(), self.options.clone()) => Some(result),
        };
        let mut ctx = match opened {
            Some(Ok(ctx)) => ctx,
            Some(Err(e)) => {
                let err = e.to_coded(errno::CONNECT_FAILED);
                info!(task = %self.name, error = %err, "task failed before any step");
                let outcome = TaskOutcome::Failed(err);
                return self.finish(target, outcome, Vec::new(), 0, diagnostics, Blackboard::new(), started);
            }
            None => {
                let outcome = TaskOutcome::Failed(errno::CANCELLED.bare());
                return self.finish(target, outcome, Vec::new(), 0, diagnostics, Blackboard::new(), started);
            }
        };

        let mut outcome = TaskOutcome::Completed;
        let mut records = Vec::with_capacity(self.steps.len());
        let mut cancelled = false;

        for step in &self.steps {
            let result = tokio::select! {
                biased;
                _ = &mut shutdown => {
                    cancelled = true;
                    None
                }
                r = step.execute(&mut ctx) => Some(r),
            };
            let Some(result) = result else { break };

            records.push(StepRecord {
                name: step.name().to_string(),
                mutates: step.mutates(),
            });
            match result {
                Ok(StepOutcome::Continue) => {}
                Ok(StepOutcome::SkipRemaining) => {
                    debug!(task = %self.name, step = step.name(), "remaining steps skipped");
                    outcome = TaskOutcome::Skipped;
                    break;
                }
                Ok(StepOutcome::BreakAsDone) => {
                    debug!(task = %self.name, step = step.name(), "already done");
                    outcome = TaskOutcome::Broken;
                    break;
                }
                Err(e) => {
                    outcome = TaskOutcome::Failed(e);
                    break;
                }
            }
        }

        let mut post_steps_run = 0;
        if cancelled {
            outcome = TaskOutcome::Failed(errno::CANCELLED.bare());
        } else {
            for step in &self.post_steps {
                post_steps_run += 1;
                if let Err(e) = step.execute(&mut ctx).await {
                    diagnostics.warn(Warning::post_step_failed(step.name(), e));
                }
            }
        }

        let (blackboard, transport) = ctx.into_parts();
        if let Some(transport) = transport {
            match tokio::time::timeout(CLOSE_TIMEOUT, transport.close()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => diagnostics.warn(Warning::transport_close(&target, e)),
                Err(_) => diagnostics.warn(Warning::transport_close(
                    &target,
                    format!("timed out after {CLOSE_TIMEOUT:?}"),
                )),
            }
        }

        info!(task = %self.name, subname = %self.subname, outcome = %outcome, "task finished");
        self.finish(target, outcome, records, post_steps_run, diagnostics, blackboard, started)
    }

    #[allow(clippy::too_many_arguments)]
    fn finish(
        self,
        target: String,
        outcome: TaskOutcome,
        steps: Vec<StepRecord>,
        post_steps_run: usize,
        diagnostics: Diagnostics,
        blackboard: Blackboard,
        started: Instant,
    ) -> TaskReport {
        TaskReport {
            name: self.name,
            subname: self.subname,
            target,
            identity: self.identity,
            outcome,
            steps,
            post_steps_run,
            diagnostics,
            blackboard,
            duration: started.elapsed(),
        }
    }
}
