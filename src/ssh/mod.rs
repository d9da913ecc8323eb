// ABOUTME: SSH sessions to cluster hosts over russh.
// ABOUTME: Credential lookup, known_hosts policy, retried connects, exec and cat-based file transfer.

mod auth;
mod error;
mod host_key;
mod session;

pub use error::{Error, Result};
pub use host_key::HostKeyPolicy;
pub use session::{ExecOutput, Session, SessionConfig};
