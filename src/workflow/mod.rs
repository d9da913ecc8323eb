// ABOUTME: Per-service workflows assembled from steps: deploy, lifecycle, clean, status, amend, migrate.
// ABOUTME: Each builder returns a fresh Task bound to one service identity and host.

mod amend;
mod clean;
mod deploy;
mod lifecycle;
mod migrate;
mod scripts;
mod service;
mod status;
mod steps;

pub use amend::{AMENDED_KEYS, AmendConfig};
pub use clean::CleanItems;
pub use lifecycle::Lifecycle;
pub use migrate::{AmendOrder, MemberMove, MemberProtocol, MigrationPlan};
pub use service::{Layout, ServiceSpec, endpoint_list};
pub use steps::{
    CONTAINER_ID, CONTAINER_STATE, CheckContainerRecord, Gate, GuardState, LoadContainer,
    MarkCleaned, ObserveStatus, PersistContainer, RECORD_WRITE, SERVICE_STATUS, ServiceStatus,
};

use crate::storage::Storage;
use crate::task::Task;
use crate::transport::ExecOptions;
use std::sync::Arc;

/// Builds Tasks for services against one state store.
#[derive(Debug, Clone)]
pub struct Workflows {
    storage: Arc<Storage>,
    options: ExecOptions,
}

impl Workflows {
    pub fn new(storage: Arc<Storage>, options: ExecOptions) -> Self {
        Self { storage, options }
    }

    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    pub fn options(&self) -> &ExecOptions {
        &self.options
    }

    /// Empty Task wired to the service's host and identity.
    fn task_for(&self, name: &str, service: &ServiceSpec) -> Task {
        Task::new(name, service.id.as_str())
            .with_target(Arc::clone(&service.target))
            .with_options(self.options.clone())
            .with_identity(service.id.clone())
    }
}
