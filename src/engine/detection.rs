// ABOUTME: Container engine detection on local and remote hosts.
// ABOUTME: Checks for the podman binary first, then docker.

use super::Engine;
use crate::transport::{ExecOptions, Transport, TransportError};

/// Error during engine detection.
#[derive(Debug, thiserror::Error)]
pub enum DetectionError {
    #[error("no container engine found (checked podman and docker)")]
    NoEngineFound,

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Detect the container engine available through `transport`.
///
/// Detection order (when not explicitly configured):
/// 1. `podman`
/// 2. `docker`
///
/// If `configured` is provided it takes precedence and nothing is probed.
pub async fn detect_engine(
    transport: &dyn Transport,
    options: &ExecOptions,
    configured: Option<Engine>,
) -> Result<Engine, DetectionError> {
    if let Some(engine) = configured {
        return Ok(engine);
    }

    for engine in [Engine::Podman, Engine::Docker] {
        let probe = format!("command -v {}", engine.binary());
        let command = transport.wrap_command(&probe, options);
        match transport.run(&command, options.timeout).await {
            Ok(output) if !output.trim().is_empty() => {
                tracing::debug!("found {} at {}", engine, output.trim());
                return Ok(engine);
            }
            Ok(_) | Err(TransportError::NonZeroExit { .. }) => continue,
            Err(e) => return Err(e.into()),
        }
    }

    Err(DetectionError::NoEngineFound)
}
