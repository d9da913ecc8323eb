// ABOUTME: Status workflow: compare the stored container with what the engine reports.
// ABOUTME: Never mutates the host; the classification lands in SERVICE_STATUS.

use super::steps::{Gate, LoadContainer, ObserveStatus};
use super::{ServiceSpec, Workflows};
use crate::task::Task;

impl Workflows {
    pub fn status(&self, service: &ServiceSpec) -> Task {
        let mut task = self.task_for("status", service);
        task.add_step(LoadContainer::new(
            self.storage.clone(),
            service.id.clone(),
            Gate::Never,
        ));
        task.add_step(ObserveStatus::new(service.id.clone()));
        task
    }
}
