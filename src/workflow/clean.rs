// ABOUTME: Clean workflow: remove a service's directories and container.
// ABOUTME: The store row survives with the cleaned sentinel so the identity can be recreated.

use super::steps::{CONTAINER_ID, Gate, GuardState, LoadContainer, MarkCleaned};
use super::{ServiceSpec, Workflows};
use crate::step::{RemoveContainer, RemoveFiles, StopContainer};
use crate::task::Task;

/// What `clean` removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanItems {
    pub log: bool,
    pub data: bool,
    pub container: bool,
}

impl Default for CleanItems {
    fn default() -> Self {
        Self {
            log: true,
            data: true,
            container: true,
        }
    }
}

impl CleanItems {
    /// Parse a comma list such as `log,container`.
    pub fn parse(list: &str) -> Result<Self, String> {
        let mut items = CleanItems {
            log: false,
            data: false,
            container: false,
        };
        for item in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            match item {
                "log" => items.log = true,
                "data" => items.data = true,
                "container" => items.container = true,
                other => return Err(format!("unknown clean item: {other}")),
            }
        }
        Ok(items)
    }
}

impl Workflows {
    pub fn clean(&self, service: &ServiceSpec, items: CleanItems) -> Task {
        let mut task = self.task_for("clean", service);
        task.add_step(LoadContainer::new(
            self.storage.clone(),
            service.id.clone(),
            Gate::SkipIfNeverCreated,
        ));

        let mut dirs = Vec::new();
        if items.log {
            dirs.push(service.layout.log_dir.clone());
        }
        if items.data {
            dirs.push(service.layout.data_dir.clone());
        }
        if !dirs.is_empty() {
            task.add_step(RemoveFiles::new(dirs));
        }

        if items.container {
            task.add_step(GuardState::new(Gate::SkipUnlessBound));
            task.add_step(StopContainer::new(CONTAINER_ID));
            task.add_step(RemoveContainer::new(CONTAINER_ID).force());
            task.add_step(MarkCleaned::new(self.storage.clone(), service.id.clone()));
        }
        task
    }
}
