// ABOUTME: Container engine selection for Docker and Podman.
// ABOUTME: Auto-detects the engine binary on a host or uses explicit config.

mod detection;

pub use detection::{DetectionError, detect_engine};

use serde::{Deserialize, Serialize};
use std::fmt;

/// The container engine whose CLI renders container commands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    #[default]
    Docker,
    Podman,
}

impl Engine {
    /// Name of the CLI binary.
    pub fn binary(&self) -> &'static str {
        match self {
            Engine::Docker => "docker",
            Engine::Podman => "podman",
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.binary())
    }
}
