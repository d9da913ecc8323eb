// ABOUTME: Typed rows of the state store.
// ABOUTME: ContainerState gives the three stored container-id meanings their own variants.

use crate::types::{ContainerId, ServiceId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

const CLEANED_SENTINEL: &str = "-";

/// What the store knows about a service's container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerState {
    /// No container was ever created (stored as the empty string).
    NeverCreated,
    /// A container existed and was explicitly cleaned (stored as `-`).
    Cleaned,
    /// Bound to this container, which may or may not still exist on the host.
    Bound(ContainerId),
}

impl ContainerState {
    pub fn from_stored(value: &str) -> Self {
        match value {
            "" => ContainerState::NeverCreated,
            CLEANED_SENTINEL => ContainerState::Cleaned,
            id => ContainerState::Bound(ContainerId::new(id)),
        }
    }

    pub fn as_stored(&self) -> &str {
        match self {
            ContainerState::NeverCreated => "",
            ContainerState::Cleaned => CLEANED_SENTINEL,
            ContainerState::Bound(id) => id.as_str(),
        }
    }

    pub fn container_id(&self) -> Option<&ContainerId> {
        match self {
            ContainerState::Bound(id) => Some(id),
            _ => None,
        }
    }

    pub fn is_bound(&self) -> bool {
        matches!(self, ContainerState::Bound(_))
    }
}

/// `{service identity, cluster, container}` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerRecord {
    pub service_id: ServiceId,
    pub cluster_id: i64,
    pub state: ContainerState,
}

/// Whether a container write created the row or updated an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordWrite {
    Inserted,
    Updated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cluster {
    pub id: i64,
    pub name: String,
    pub description: String,
    /// Serialized topology last applied to this cluster.
    pub topology: String,
    pub create_time: DateTime<Utc>,
    pub current: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientRecord {
    pub id: String,
    pub kind: String,
    pub host: String,
    pub container_id: String,
    pub aux_info: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Playground {
    pub id: i64,
    pub name: String,
    pub create_time: DateTime<Utc>,
    pub mount_point: String,
    pub status: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    Running,
    Success,
    Failed,
    Cancelled,
}

impl AuditStatus {
    pub fn code(self) -> i64 {
        match self {
            AuditStatus::Running => 0,
            AuditStatus::Success => 1,
            AuditStatus::Failed => 2,
            AuditStatus::Cancelled => 3,
        }
    }

    pub fn from_code(code: i64) -> Self {
        match code {
            1 => AuditStatus::Success,
            2 => AuditStatus::Failed,
            3 => AuditStatus::Cancelled,
            _ => AuditStatus::Running,
        }
    }
}

impl fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AuditStatus::Running => "running",
            AuditStatus::Success => "success",
            AuditStatus::Failed => "failed",
            AuditStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEntry {
    pub id: i64,
    pub execute_time: DateTime<Utc>,
    pub work_directory: String,
    pub command: String,
    pub status: AuditStatus,
    pub error_code: u32,
}
