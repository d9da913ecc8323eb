// ABOUTME: State store: driver contract, two backends and the typed record API.
// ABOUTME: The only durable state shared between concurrently running Tasks.

mod driver;
mod locks;
mod records;
mod rqlite;
mod schema;
mod sqlite;
mod store;

pub use driver::{Driver, Row, Rows, Value, WriteResult, open_driver};
pub use records::{
    AuditEntry, AuditStatus, ClientRecord, Cluster, ContainerRecord, ContainerState, Playground,
    RecordWrite,
};
pub use rqlite::RqliteDriver;
pub use sqlite::SqliteDriver;
pub use store::Storage;

use crate::errno::{self, CodedError};
use crate::http_client::HttpError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to open store {url}: {reason}")]
    Open { url: String, reason: String },

    #[error("unsupported store url: {0}")]
    UnsupportedScheme(String),

    #[error("store query failed: {0}")]
    Query(String),

    #[error("row already exists: {0}")]
    Conflict(String),

    #[error("failed to decode column '{column}': {reason}")]
    Decode { column: String, reason: String },

    #[error("{0} not found")]
    NotFound(String),

    #[error(transparent)]
    Http(#[from] HttpError),
}

impl StorageError {
    pub fn to_coded(&self) -> CodedError {
        match self {
            StorageError::Decode { .. } => errno::DECODE_FAILED.clue(self.to_string()),
            _ => errno::STORAGE_FAILED.clue(self.to_string()),
        }
    }
}

impl From<StorageError> for CodedError {
    fn from(err: StorageError) -> Self {
        err.to_coded()
    }
}
