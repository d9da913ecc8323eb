// ABOUTME: Store driver contract shared by the embedded and networked backends.
// ABOUTME: Rows are decoded into a small dynamic Value type; writes report last insert id.

use super::StorageError;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;

/// A single SQL value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// One result row; columns are looked up by name.
#[derive(Debug, Clone)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    pub fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    pub fn get(&self, column: &str) -> Result<&Value, StorageError> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|i| self.values.get(i))
            .ok_or_else(|| StorageError::Decode {
                column: column.to_string(),
                reason: "no such column".to_string(),
            })
    }

    pub fn get_i64(&self, column: &str) -> Result<i64, StorageError> {
        match self.get(column)? {
            Value::Integer(v) => Ok(*v),
            // Networked stores may hand integers back as JSON floats.
            Value::Real(v) if v.fract() == 0.0 => Ok(*v as i64),
            other => Err(decode_error(column, "integer", other)),
        }
    }

    pub fn get_str(&self, column: &str) -> Result<&str, StorageError> {
        match self.get(column)? {
            Value::Text(v) => Ok(v),
            other => Err(decode_error(column, "text", other)),
        }
    }

    pub fn get_opt_str(&self, column: &str) -> Result<Option<&str>, StorageError> {
        match self.get(column)? {
            Value::Null => Ok(None),
            Value::Text(v) => Ok(Some(v)),
            other => Err(decode_error(column, "text or null", other)),
        }
    }

    pub fn get_bool(&self, column: &str) -> Result<bool, StorageError> {
        Ok(self.get_i64(column)? != 0)
    }
}

fn decode_error(column: &str, expected: &str, got: &Value) -> StorageError {
    StorageError::Decode {
        column: column.to_string(),
        reason: format!("expected {expected}, got {got:?}"),
    }
}

/// Rows returned by a query, consumed in order.
#[derive(Debug, Default)]
pub struct Rows {
    rows: VecDeque<Row>,
}

impl Rows {
    pub fn new(rows: impl IntoIterator<Item = Row>) -> Self {
        Self {
            rows: rows.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl Iterator for Rows {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        self.rows.pop_front()
    }
}

/// Result of a write statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteResult {
    pub last_insert_id: i64,
    pub rows_affected: u64,
}

/// Backend contract for the state store.
#[async_trait]
pub trait Driver: Send + Sync {
    fn scheme(&self) -> &'static str;

    async fn query(&self, sql: &str, args: &[Value]) -> Result<Rows, StorageError>;

    async fn write(&self, sql: &str, args: &[Value]) -> Result<WriteResult, StorageError>;

    /// Run several `;`-separated statements without arguments (schema setup).
    async fn execute_batch(&self, sql: &str) -> Result<(), StorageError>;

    async fn close(&self) -> Result<(), StorageError>;
}

/// Open the driver selected by the URL scheme.
///
/// - `sqlite::memory:` in-memory database
/// - `sqlite://<path>` database file, created if missing
/// - `rqlite://<host>:<port>` networked store over HTTP
pub async fn open_driver(url: &str) -> Result<Box<dyn Driver>, StorageError> {
    if url == "sqlite::memory:" {
        return Ok(Box::new(super::sqlite::SqliteDriver::in_memory().await?));
    }
    if let Some(path) = url.strip_prefix("sqlite://") {
        return Ok(Box::new(super::sqlite::SqliteDriver::open(path).await?));
    }
    if let Some(addr) = url.strip_prefix("rqlite://") {
        return Ok(Box::new(super::rqlite::RqliteDriver::new(addr)?));
    }
    Err(StorageError::UnsupportedScheme(url.to_string()))
}

/// Split a schema script into statements.
pub(crate) fn split_statements(sql: &str) -> Vec<&str> {
    sql.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}
