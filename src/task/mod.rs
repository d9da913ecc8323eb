// ABOUTME: Task/Step execution engine.
// ABOUTME: Steps run strictly in order over one Context and signal control flow by value.

mod blackboard;
mod context;
mod execute;
mod step;

pub use blackboard::{Blackboard, Input, Slot};
pub use context::{Context, ExecError};
pub use execute::{StepRecord, Task, TaskOutcome, TaskReport};
pub use step::{Step, StepOutcome, StepResult};
