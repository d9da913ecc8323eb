// ABOUTME: Amend workflow: rewrite keys of a deployed service's config file in place.
// ABOUTME: Download, mutate, upload, then optionally restart the container.

use super::steps::{CONTAINER_ID, Gate, LoadContainer};
use super::{ServiceSpec, Workflows};
use crate::step::{InstallFile, MutateConfig, Mutation, ReadFile, RestartContainer};
use crate::task::{Slot, Task};

const ORIGINAL: Slot<String> = Slot::new("amend.original");
const AMENDED: Slot<String> = Slot::new("amend.amended");
/// Keys the amend changed.
pub const AMENDED_KEYS: Slot<Vec<String>> = Slot::new("amend.changed_keys");

/// How to amend a config file.
pub struct AmendConfig<M> {
    pub mutation: M,
    pub delimiter: String,
    pub restart: bool,
}

impl<M: Mutation + 'static> AmendConfig<M> {
    pub fn new(mutation: M) -> Self {
        Self {
            mutation,
            delimiter: "=".to_string(),
            restart: false,
        }
    }

    pub fn delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    pub fn restart(mut self) -> Self {
        self.restart = true;
        self
    }
}

impl Workflows {
    pub fn amend<M: Mutation + 'static>(&self, service: &ServiceSpec, amend: AmendConfig<M>) -> Task {
        let path = service.config_path();
        let mut task = self.task_for("amend", service);
        task.add_step(LoadContainer::new(
            self.storage.clone(),
            service.id.clone(),
            Gate::SkipUnlessBound,
        ));
        task.add_step(ReadFile::new(&path, ORIGINAL));
        task.add_step(
            MutateConfig::new(ORIGINAL, amend.delimiter, amend.mutation, AMENDED)
                .record_changes(AMENDED_KEYS),
        );
        task.add_step(
            InstallFile::new(AMENDED, &path)
                .mode("644")
                .scratch_tag(service.id.to_string()),
        );
        if amend.restart {
            task.add_step(RestartContainer::new(CONTAINER_ID));
        }
        task
    }
}
