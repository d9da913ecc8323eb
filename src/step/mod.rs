// ABOUTME: Library of reusable Steps built on the command builders.
// ABOUTME: Shell, file, container-engine and closure steps.

mod container;
mod file;
mod lambda;
mod shell;

pub use container::{
    ContainerExec, ContainerSpec, CreateContainer, PullImage, RemoveContainer, RestartContainer,
    StartContainer, StopContainer,
};
pub use file::{
    InstallFile, MutateAction, MutateConfig, Mutation, MutationResult, ReadFile, ReplaceValues,
    apply_mutation,
};
pub use lambda::Lambda;
pub use shell::{CreateDirectories, ListDirectory, RemoveFiles, RunCommand};

/// Engine message for a container that does not exist. Both docker and podman
/// print it, with varying case.
pub(crate) fn is_no_such_container(output: &str) -> bool {
    output.to_ascii_lowercase().contains("no such container")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_such_container_matches_both_engines() {
        assert!(is_no_such_container("Error: No such container: 0123abcd"));
        assert!(is_no_such_container(
            "Error: no container with name or ID \"x\" found: no such container"
        ));
        assert!(!is_no_such_container("permission denied"));
    }
}
