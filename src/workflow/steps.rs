// ABOUTME: Steps that read and write the state store on behalf of the workflows.
// ABOUTME: They gate side effects on the persisted container state of one identity.

use crate::command::ContainerCommand;
use crate::errno;
use crate::storage::{ContainerState, RecordWrite, Storage};
use crate::task::{Context, Slot, Step, StepOutcome, StepResult};
use crate::types::{ContainerId, ServiceId};
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Persisted state of the Task's service.
pub const CONTAINER_STATE: Slot<ContainerState> = Slot::new("container.state");
/// Container bound to the Task's service, once known.
pub const CONTAINER_ID: Slot<ContainerId> = Slot::new("container.id");
/// How the container write landed in the store.
pub const RECORD_WRITE: Slot<RecordWrite> = Slot::new("container.record_write");
/// Classified status of the Task's service.
pub const SERVICE_STATUS: Slot<ServiceStatus> = Slot::new("service.status");

/// Break the Task when the service is already bound to a container.
#[derive(Debug, Clone)]
pub struct CheckContainerRecord {
    storage: Arc<Storage>,
    id: ServiceId,
}

impl CheckContainerRecord {
    pub fn new(storage: Arc<Storage>, id: ServiceId) -> Self {
        Self { storage, id }
    }
}

#[async_trait]
impl Step for CheckContainerRecord {
    fn name(&self) -> &str {
        "check container record"
    }

    fn mutates(&self) -> bool {
        false
    }

    async fn execute(&self, ctx: &mut Context) -> StepResult {
        let state = self.storage.container_state(&self.id).await?;
        if let ContainerState::Bound(container) = &state {
            debug!(service = %self.id, container = %container.short(), "already provisioned");
            ctx.blackboard_mut().insert(CONTAINER_ID, container.clone());
            ctx.blackboard_mut().insert(CONTAINER_STATE, state);
            return Ok(StepOutcome::BreakAsDone);
        }
        ctx.blackboard_mut().insert(CONTAINER_STATE, state);
        Ok(StepOutcome::Continue)
    }
}

/// Write the created container back to the store.
#[derive(Debug, Clone)]
pub struct PersistContainer {
    storage: Arc<Storage>,
    id: ServiceId,
    cluster_id: i64,
}

impl PersistContainer {
    pub fn new(storage: Arc<Storage>, id: ServiceId, cluster_id: i64) -> Self {
        Self {
            storage,
            id,
            cluster_id,
        }
    }
}

#[async_trait]
impl Step for PersistContainer {
    fn name(&self) -> &str {
        "persist container"
    }

    fn mutates(&self) -> bool {
        false
    }

    async fn execute(&self, ctx: &mut Context) -> StepResult {
        let container = ctx.blackboard().require(CONTAINER_ID)?.clone();
        let write = self
            .storage
            .record_container(&self.id, self.cluster_id, &container)
            .await?;
        let board = ctx.blackboard_mut();
        board.insert(RECORD_WRITE, write);
        board.insert(CONTAINER_STATE, ContainerState::Bound(container));
        Ok(StepOutcome::Continue)
    }
}

/// When to stop a Task after loading the persisted state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    /// Always continue.
    Never,
    /// Skip the rest when no container was ever created.
    SkipIfNeverCreated,
    /// Skip the rest unless a container is bound.
    SkipUnlessBound,
}

impl Gate {
    fn skips(self, state: &ContainerState) -> bool {
        match self {
            Gate::Never => false,
            Gate::SkipIfNeverCreated => matches!(state, ContainerState::NeverCreated),
            Gate::SkipUnlessBound => !state.is_bound(),
        }
    }
}

/// Load persisted state into the blackboard, optionally skipping the rest.
#[derive(Debug, Clone)]
pub struct LoadContainer {
    storage: Arc<Storage>,
    id: ServiceId,
    gate: Gate,
}

impl LoadContainer {
    pub fn new(storage: Arc<Storage>, id: ServiceId, gate: Gate) -> Self {
        Self { storage, id, gate }
    }
}

#[async_trait]
impl Step for LoadContainer {
    fn name(&self) -> &str {
        "load container record"
    }

    fn mutates(&self) -> bool {
        false
    }

    async fn execute(&self, ctx: &mut Context) -> StepResult {
        let state = self.storage.container_state(&self.id).await?;
        let skip = self.gate.skips(&state);
        if let Some(container) = state.container_id() {
            ctx.blackboard_mut().insert(CONTAINER_ID, container.clone());
        }
        ctx.blackboard_mut().insert(CONTAINER_STATE, state);
        if skip {
            debug!(service = %self.id, "nothing to do for this container state");
            return Ok(StepOutcome::SkipRemaining);
        }
        Ok(StepOutcome::Continue)
    }
}

/// Same gate as [`LoadContainer`] but over the state already on the blackboard.
#[derive(Debug, Clone)]
pub struct GuardState {
    gate: Gate,
}

impl GuardState {
    pub fn new(gate: Gate) -> Self {
        Self { gate }
    }
}

#[async_trait]
impl Step for GuardState {
    fn name(&self) -> &str {
        "guard container state"
    }

    fn mutates(&self) -> bool {
        false
    }

    async fn execute(&self, ctx: &mut Context) -> StepResult {
        let state = ctx.blackboard().require(CONTAINER_STATE)?;
        if self.gate.skips(state) {
            return Ok(StepOutcome::SkipRemaining);
        }
        Ok(StepOutcome::Continue)
    }
}

/// Write the cleaned sentinel, keeping the row.
#[derive(Debug, Clone)]
pub struct MarkCleaned {
    storage: Arc<Storage>,
    id: ServiceId,
}

impl MarkCleaned {
    pub fn new(storage: Arc<Storage>, id: ServiceId) -> Self {
        Self { storage, id }
    }
}

#[async_trait]
impl Step for MarkCleaned {
    fn name(&self) -> &str {
        "mark cleaned"
    }

    fn mutates(&self) -> bool {
        false
    }

    async fn execute(&self, ctx: &mut Context) -> StepResult {
        self.storage.mark_cleaned(&self.id).await?;
        ctx.blackboard_mut().insert(CONTAINER_STATE, ContainerState::Cleaned);
        Ok(StepOutcome::Continue)
    }
}

/// Operator-facing status of one service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "lowercase")]
pub enum ServiceStatus {
    /// No container was ever created.
    Uninstalled,
    /// The container was cleaned on purpose.
    Cleaned,
    /// The store names a container the host no longer has.
    Losed,
    /// Status string reported by the engine (e.g. `Up 3 minutes`).
    Observed(String),
}

impl ServiceStatus {
    /// Classify persisted state against the engine's `ps` output for it.
    pub fn classify(state: &ContainerState, live: Option<&str>) -> Self {
        match state {
            ContainerState::NeverCreated => ServiceStatus::Uninstalled,
            ContainerState::Cleaned => ServiceStatus::Cleaned,
            ContainerState::Bound(_) => match live.map(str::trim) {
                Some(s) if !s.is_empty() => ServiceStatus::Observed(s.to_string()),
                _ => ServiceStatus::Losed,
            },
        }
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceStatus::Uninstalled => f.write_str("Uninstalled"),
            ServiceStatus::Cleaned => f.write_str("Cleaned"),
            ServiceStatus::Losed => f.write_str("Losed"),
            ServiceStatus::Observed(s) => f.write_str(s),
        }
    }
}

/// Ask the engine for the live status of the bound container and classify it.
#[derive(Debug, Clone)]
pub struct ObserveStatus {
    id: ServiceId,
}

impl ObserveStatus {
    pub fn new(id: ServiceId) -> Self {
        Self { id }
    }
}

#[async_trait]
impl Step for ObserveStatus {
    fn name(&self) -> &str {
        "observe status"
    }

    fn mutates(&self) -> bool {
        false
    }

    async fn execute(&self, ctx: &mut Context) -> StepResult {
        let state = ctx.blackboard().require(CONTAINER_STATE)?.clone();
        let live = match state.container_id() {
            Some(container) => Some(
                ctx.execute(
                    ContainerCommand::list()
                        .all()
                        .filter(&format!("id={}", container.as_str()))
                        .format("{{.Status}}"),
                )
                .await
                .map_err(|e| e.to_coded(errno::COMMAND_FAILED))?,
            ),
            None => None,
        };
        let status = ServiceStatus::classify(&state, live.as_deref());
        if status == ServiceStatus::Losed {
            warn!(service = %self.id, "container recorded in store is missing on host");
        }
        ctx.blackboard_mut().insert(SERVICE_STATUS, status);
        Ok(StepOutcome::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_is_three_way() {
        let bound = ContainerState::Bound(ContainerId::new("abc"));
        assert_eq!(ServiceStatus::classify(&ContainerState::NeverCreated, None), ServiceStatus::Uninstalled);
        assert_eq!(ServiceStatus::classify(&ContainerState::Cleaned, None), ServiceStatus::Cleaned);
        assert_eq!(ServiceStatus::classify(&bound, Some("\n")), ServiceStatus::Losed);
        assert_eq!(ServiceStatus::classify(&bound, None), ServiceStatus::Losed);
        assert_eq!(
            ServiceStatus::classify(&bound, Some("Up 2 minutes\n")),
            ServiceStatus::Observed("Up 2 minutes".to_string())
        );
        assert_eq!(ServiceStatus::Losed.to_string(), "Losed");
    }

    #[test]
    fn gates() {
        let bound = ContainerState::Bound(ContainerId::new("abc"));
        assert!(Gate::SkipIfNeverCreated.skips(&ContainerState::NeverCreated));
        assert!(!Gate::SkipIfNeverCreated.skips(&ContainerState::Cleaned));
        assert!(Gate::SkipUnlessBound.skips(&ContainerState::Cleaned));
        assert!(!Gate::SkipUnlessBound.skips(&bound));
        assert!(!Gate::Never.skips(&ContainerState::NeverCreated));
    }
}
