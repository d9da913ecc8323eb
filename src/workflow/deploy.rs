// ABOUTME: Deploy workflow: provision one service container exactly once.
// ABOUTME: A service already bound to a container ends the Task as done.

use super::steps::{CONTAINER_ID, CheckContainerRecord, PersistContainer};
use super::{ServiceSpec, Workflows};
use crate::step::{CreateContainer, CreateDirectories, InstallFile, PullImage, StartContainer};
use crate::task::Task;

impl Workflows {
    /// check record → [pull] → mkdir → [config] → create → persist → start.
    ///
    /// The container id is persisted before start so a failed start still
    /// leaves the container owned by this identity.
    pub fn deploy(&self, service: &ServiceSpec) -> Task {
        let mut task = self.task_for("deploy", service);
        task.add_step(CheckContainerRecord::new(
            self.storage.clone(),
            service.id.clone(),
        ));
        if service.pull_image {
            task.add_step(PullImage::new(&service.image));
        }
        task.add_step(CreateDirectories::new(service.layout.all()));
        if let Some(config) = service.config_text() {
            task.add_step(
                InstallFile::new(config, service.config_path())
                    .mode("644")
                    .scratch_tag(service.id.to_string()),
            );
        }
        task.add_step(CreateContainer::new(service.container_spec(), CONTAINER_ID));
        task.add_step(PersistContainer::new(
            self.storage.clone(),
            service.id.clone(),
            service.cluster_id,
        ));
        task.add_step(StartContainer::new(CONTAINER_ID));
        task
    }
}
