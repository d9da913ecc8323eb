// ABOUTME: The Step capability and the closed set of step outcomes.
// ABOUTME: Control flow is an explicit enum, failures are coded errors.

use super::Context;
use crate::errno::CodedError;
use async_trait::async_trait;

/// What the engine should do after a Step succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Run the next Step.
    Continue,
    /// The rest of this Task is unnecessary. Counts as success.
    SkipRemaining,
    /// This work was already fully done. Counts as success.
    BreakAsDone,
}

pub type StepResult = Result<StepOutcome, CodedError>;

/// One idempotent unit of work against a [`Context`].
#[async_trait]
pub trait Step: Send + Sync {
    /// Short label for logs and reports.
    fn name(&self) -> &str;

    /// Whether the Step changes the target (used when reporting what a Task did).
    fn mutates(&self) -> bool {
        true
    }

    async fn execute(&self, ctx: &mut Context) -> StepResult;
}
