// ABOUTME: Bounded-parallel runner for batches of Tasks grouped into ordered phases.
// ABOUTME: A failed phase cancels the phases after it; siblings within a phase always finish.

use crate::errno::{self, CodedError};
use crate::task::{Task, TaskReport};
use crate::types::ServiceId;
use snafu::Snafu;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Default number of Tasks in flight at once.
pub const DEFAULT_PARALLELISM: usize = 16;

/// Tasks that may run concurrently.
#[derive(Debug)]
pub struct Phase {
    name: String,
    tasks: Vec<Task>,
}

impl Phase {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tasks: Vec::new(),
        }
    }

    pub fn from_tasks(name: impl Into<String>, tasks: Vec<Task>) -> Self {
        Self {
            name: name.into(),
            tasks,
        }
    }

    pub fn with_task(mut self, task: Task) -> Self {
        self.tasks.push(task);
        self
    }

    pub fn push(&mut self, task: Task) {
        self.tasks.push(task);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Split a phase into waves with distinct identities, keeping submission order.
///
/// Two Tasks on the same service never run together.
fn waves(tasks: Vec<Task>) -> Vec<Vec<Task>> {
    let mut waves: Vec<(HashSet<ServiceId>, Vec<Task>)> = Vec::new();
    for task in tasks {
        let Some(id) = task.identity().cloned() else {
            match waves.first_mut() {
                Some((_, first)) => first.push(task),
                None => waves.push((HashSet::new(), vec![task])),
            }
            continue;
        };
        // Must land after the last wave already holding this identity.
        let last_holder = waves.iter().rposition(|(ids, _)| ids.contains(&id));
        let start = last_holder.map_or(0, |i| i + 1);
        match waves.get_mut(start) {
            Some((ids, wave)) => {
                ids.insert(id);
                wave.push(task);
            }
            None => waves.push((HashSet::from([id]), vec![task])),
        }
    }
    waves.into_iter().map(|(_, wave)| wave).collect()
}

/// Outcome of one phase.
#[derive(Debug)]
pub struct PhaseReport {
    pub name: String,
    pub reports: Vec<TaskReport>,
    /// The phase never started because an earlier phase failed or the run was cancelled.
    pub not_run: bool,
}

impl PhaseReport {
    pub fn is_success(&self) -> bool {
        self.reports.iter().all(TaskReport::is_success)
    }
}

/// Outcome of a whole run.
#[derive(Debug)]
pub struct RunReport {
    pub phases: Vec<PhaseReport>,
    pub duration: Duration,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.phases.iter().all(PhaseReport::is_success)
    }

    pub fn reports(&self) -> impl Iterator<Item = &TaskReport> {
        self.phases.iter().flat_map(|p| p.reports.iter())
    }

    pub fn failures(&self) -> impl Iterator<Item = &TaskReport> {
        self.reports().filter(|r| !r.is_success())
    }

    pub fn was_cancelled(&self) -> bool {
        self.failures()
            .any(|r| r.outcome.error().map(|e| e.code) == Some(errno::CANCELLED))
    }

    /// First error that is not a consequence of an earlier one.
    pub fn first_error(&self) -> Option<&CodedError> {
        self.failures()
            .filter_map(|r| r.outcome.error())
            .find(|e| e.code != errno::CANCELLED)
            .or_else(|| self.failures().find_map(|r| r.outcome.error()))
    }

    /// `Err` when any Task failed.
    pub fn into_result(self) -> Result<RunReport, RunError> {
        if self.is_success() {
            return Ok(self);
        }
        let failed = self.failures().count();
        let first = self.first_error().cloned().unwrap_or_else(|| errno::UNKNOWN.bare());
        if self.was_cancelled() && first.code == errno::CANCELLED {
            return Err(RunError::Cancelled { report: self });
        }
        Err(RunError::TasksFailed {
            failed,
            first,
            report: self,
        })
    }
}

/// Aggregated failure of a run.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum RunError {
    #[snafu(display("{failed} task(s) failed, first error: {first}"))]
    TasksFailed {
        failed: usize,
        first: CodedError,
        report: RunReport,
    },

    #[snafu(display("run cancelled by operator"))]
    Cancelled { report: RunReport },
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunErrorKind {
    TasksFailed,
    Cancelled,
}

impl RunError {
    pub fn kind(&self) -> RunErrorKind {
        match self {
            RunError::TasksFailed { .. } => RunErrorKind::TasksFailed,
            RunError::Cancelled { .. } => RunErrorKind::Cancelled,
        }
    }

    pub fn report(&self) -> &RunReport {
        match self {
            RunError::TasksFailed { report, .. } | RunError::Cancelled { report } => report,
        }
    }

    /// Code of the first meaningful failure.
    pub fn code(&self) -> u32 {
        match self {
            RunError::TasksFailed { first, .. } => first.code(),
            RunError::Cancelled { .. } => errno::CANCELLED.code,
        }
    }
}

/// Cancels a running batch.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Runs phases of Tasks with bounded parallelism.
#[derive(Debug)]
pub struct Runner {
    parallelism: usize,
    cancel_tx: Arc<watch::Sender<bool>>,
    cancel_rx: watch::Receiver<bool>,
}

impl Default for Runner {
    fn default() -> Self {
        Self::new(DEFAULT_PARALLELISM)
    }
}

impl Runner {
    pub fn new(parallelism: usize) -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            parallelism: parallelism.max(1),
            cancel_tx: Arc::new(tx),
            cancel_rx: rx,
        }
    }

    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            tx: Arc::clone(&self.cancel_tx),
        }
    }

    /// Single-phase convenience.
    pub async fn run_tasks(&self, name: &str, tasks: Vec<Task>) -> RunReport {
        self.run(vec![Phase::from_tasks(name, tasks)]).await
    }

    pub async fn run(&self, phases: Vec<Phase>) -> RunReport {
        let started = Instant::now();
        let mut reports = Vec::with_capacity(phases.len());
        let mut halted: Option<CodedError> = None;

        for phase in phases {
            if halted.is_none() && *self.cancel_rx.borrow() {
                halted = Some(errno::CANCELLED.bare());
            }
            if let Some(reason) = &halted {
                debug!(phase = %phase.name, "phase not run");
                reports.push(PhaseReport {
                    reports: phase
                        .tasks
                        .iter()
                        .map(|t| TaskReport::not_run(t, reason.clone()))
                        .collect(),
                    name: phase.name,
                    not_run: true,
                });
                continue;
            }

            info!(phase = %phase.name, tasks = phase.tasks.len(), "phase started");
            let report = self.run_phase(phase).await;
            if !report.is_success() {
                warn!(phase = %report.name, "phase failed, later phases cancelled");
                let cause = if *self.cancel_rx.borrow() {
                    errno::CANCELLED.bare()
                } else {
                    errno::CANCELLED.clue(format!("phase '{}' failed", report.name))
                };
                halted = Some(cause);
            }
            reports.push(report);
        }

        RunReport {
            phases: reports,
            duration: started.elapsed(),
        }
    }

    async fn run_phase(&self, phase: Phase) -> PhaseReport {
        let mut slots: Vec<Option<TaskReport>> = Vec::new();
        let mut offset = 0;

        for wave in waves(phase.tasks) {
            let semaphore = Arc::new(Semaphore::new(self.parallelism));
            let mut set = JoinSet::new();
            let mut placeholders = Vec::with_capacity(wave.len());

            for (i, task) in wave.into_iter().enumerate() {
                placeholders.push(TaskReport::not_run(
                    &task,
                    errno::UNKNOWN.clue("task aborted unexpectedly"),
                ));
                slots.push(None);
                let semaphore = Arc::clone(&semaphore);
                let mut cancel = self.cancel_rx.clone();
                set.spawn(async move {
                    let Ok(_permit) = semaphore.acquire_owned().await else {
                        return (i, TaskReport::not_run(&task, errno::CANCELLED.bare()));
                    };
                    let shutdown = async move {
                        if cancel.wait_for(|cancelled| *cancelled).await.is_err() {
                            std::future::pending::<()>().await;
                        }
                    };
                    (i, task.execute_until(shutdown).await)
                });
            }

            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok((i, report)) => slots[offset + i] = Some(report),
                    Err(e) => warn!(phase = %phase.name, error = %e, "task did not complete"),
                }
            }
            for (i, placeholder) in placeholders.into_iter().enumerate() {
                let slot = &mut slots[offset + i];
                if slot.is_none() {
                    *slot = Some(placeholder);
                }
            }
            offset = slots.len();
        }

        PhaseReport {
            name: phase.name,
            reports: slots.into_iter().flatten().collect(),
            not_run: false,
        }
    }
}
