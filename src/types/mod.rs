// ABOUTME: Identifiers and validated domain types.
// ABOUTME: Container ids, service roles and deterministic service identities.

mod container_id;
mod role;
mod service_id;

pub use container_id::ContainerId;
pub use role::{ParseRoleError, Role};
pub use service_id::{ServiceId, ServiceIdError};
