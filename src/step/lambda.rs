// ABOUTME: Step backed by a closure over the Context.
// ABOUTME: Used for judges and small glue that reads the blackboard.

use crate::task::{Context, Step, StepResult};
use async_trait::async_trait;

pub struct Lambda<F> {
    name: String,
    func: F,
}

impl<F> std::fmt::Debug for Lambda<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lambda").field("name", &self.name).finish()
    }
}

impl<F> Lambda<F>
where
    F: Fn(&mut Context) -> StepResult + Send + Sync,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

#[async_trait]
impl<F> Step for Lambda<F>
where
    F: Fn(&mut Context) -> StepResult + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn mutates(&self) -> bool {
        false
    }

    async fn execute(&self, ctx: &mut Context) -> StepResult {
        (self.func)(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errno;
    use crate::task::{Slot, StepOutcome};
    use crate::transport::ExecOptions;

    #[tokio::test]
    async fn lambda_reads_blackboard() {
        const FLAG: Slot<bool> = Slot::new("flag");
        let mut ctx = Context::new(None, ExecOptions::default());
        ctx.blackboard_mut().insert(FLAG, true);

        let step = Lambda::new("judge", |ctx: &mut Context| {
            if *ctx.blackboard().require(FLAG)? {
                Ok(StepOutcome::SkipRemaining)
            } else {
                Err(errno::UNKNOWN.bare())
            }
        });
        assert_eq!(step.execute(&mut ctx).await.unwrap(), StepOutcome::SkipRemaining);
    }
}
