// ABOUTME: Deterministic identity of one logical service instance in a cluster.
// ABOUTME: Joins desired-state config with persisted runtime state.

use super::role::Role;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceIdError {
    #[error("cluster name cannot be empty")]
    EmptyCluster,

    #[error("host cannot be empty")]
    EmptyHost,

    #[error("invalid character in {field}: '{ch}'")]
    InvalidChar { field: &'static str, ch: char },
}

/// Identity of a service instance: `{cluster}_{role}_{host}_{sequence}`.
///
/// The same inputs always yield the same identity, independent of which
/// container currently backs the service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceId(String);

impl ServiceId {
    pub fn new(
        cluster: &str,
        role: Role,
        host: &str,
        sequence: u32,
    ) -> Result<Self, ServiceIdError> {
        if cluster.is_empty() {
            return Err(ServiceIdError::EmptyCluster);
        }
        if host.is_empty() {
            return Err(ServiceIdError::EmptyHost);
        }
        validate("cluster", cluster)?;
        validate("host", host)?;

        Ok(Self(format!("{cluster}_{role}_{host}_{sequence}")))
    }

    /// Wrap an identity read back from the store.
    pub fn from_stored(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn validate(field: &'static str, value: &str) -> Result<(), ServiceIdError> {
    // Underscore is the separator; whitespace would break shell templating.
    match value
        .chars()
        .find(|c| *c == '_' || c.is_whitespace() || *c == '\'' || *c == '"')
    {
        Some(ch) => Err(ServiceIdError::InvalidChar { field, ch }),
        None => Ok(()),
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
