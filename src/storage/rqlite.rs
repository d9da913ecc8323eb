// ABOUTME: Networked store driver speaking rqlite's HTTP API.
// ABOUTME: Parameterized statements travel as JSON arrays; reads use strong consistency.

use super::StorageError;
use super::driver::{Driver, Row, Rows, Value, WriteResult, split_statements};
use crate::http_client::{self, HttpRequest};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value as Json;
use std::sync::Arc;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct RqliteDriver {
    host: String,
    port: u16,
}

#[derive(Debug, Deserialize)]
struct Response {
    #[serde(default)]
    results: Vec<StatementResult>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StatementResult {
    #[serde(default)]
    columns: Vec<String>,
    #[serde(default)]
    values: Vec<Vec<Json>>,
    #[serde(default)]
    last_insert_id: Option<i64>,
    #[serde(default)]
    rows_affected: Option<u64>,
    #[serde(default)]
    error: Option<String>,
}

fn to_json(value: &Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Integer(v) => Json::from(*v),
        Value::Real(v) => Json::from(*v),
        Value::Text(v) => Json::from(v.as_str()),
    }
}

fn from_json(value: &Json) -> Value {
    match value {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Integer(i64::from(*b)),
        Json::Number(n) => match n.as_i64() {
            Some(i) => Value::Integer(i),
            None => Value::Real(n.as_f64().unwrap_or_default()),
        },
        Json::String(s) => Value::Text(s.clone()),
        other => Value::Text(other.to_string()),
    }
}

/// Build the `[[sql, args...]]` request body for one statement.
fn statement_body(sql: &str, args: &[Value]) -> Json {
    let mut statement = Vec::with_capacity(args.len() + 1);
    statement.push(Json::from(sql));
    statement.extend(args.iter().map(to_json));
    Json::Array(vec![Json::Array(statement)])
}

fn parse_response(body: &[u8]) -> Result<Vec<StatementResult>, StorageError> {
    let response: Response = serde_json::from_slice(body)
        .map_err(|e| StorageError::Query(format!("invalid rqlite response: {e}")))?;
    if let Some(error) = response.error {
        return Err(StorageError::Query(error));
    }
    if let Some(error) = response.results.iter().find_map(|r| r.error.clone()) {
        if error.contains("UNIQUE constraint failed") {
            return Err(StorageError::Conflict(error));
        }
        return Err(StorageError::Query(error));
    }
    Ok(response.results)
}

fn into_rows(result: StatementResult) -> Rows {
    let columns: Arc<[String]> = result.columns.into();
    Rows::new(
        result
            .values
            .iter()
            .map(|values| Row::new(Arc::clone(&columns), values.iter().map(from_json).collect())),
    )
}

impl RqliteDriver {
    /// `addr` is `host:port`.
    pub fn new(addr: &str) -> Result<Self, StorageError> {
        let (host, port) = addr
            .trim_end_matches('/')
            .rsplit_once(':')
            .ok_or_else(|| StorageError::UnsupportedScheme(format!("rqlite://{addr} (missing port)")))?;
        let port = port
            .parse()
            .map_err(|_| StorageError::UnsupportedScheme(format!("rqlite://{addr} (bad port)")))?;
        Ok(Self {
            host: host.to_string(),
            port,
        })
    }

    async fn post(&self, path: &str, body: &Json) -> Result<Vec<StatementResult>, StorageError> {
        let body = serde_json::to_vec(body).map_err(|e| StorageError::Query(e.to_string()))?;
        let response = http_client::send(
            &self.host,
            self.port,
            HttpRequest::post(path, "application/json", body),
            REQUEST_TIMEOUT,
        )
        .await?;
        if !response.status.is_success() {
            return Err(StorageError::Query(format!(
                "rqlite returned {}: {}",
                response.status,
                response.text().trim()
            )));
        }
        parse_response(&response.body)
    }
}

#[async_trait]
impl Driver for RqliteDriver {
    fn scheme(&self) -> &'static str {
        "rqlite"
    }

    async fn query(&self, sql: &str, args: &[Value]) -> Result<Rows, StorageError> {
        let mut results = self
            .post("/db/query?level=strong", &statement_body(sql, args))
            .await?;
        Ok(results.pop().map(into_rows).unwrap_or_default())
    }

    async fn write(&self, sql: &str, args: &[Value]) -> Result<WriteResult, StorageError> {
        let results = self.post("/db/execute", &statement_body(sql, args)).await?;
        let result = results.into_iter().next().unwrap_or_default();
        Ok(WriteResult {
            last_insert_id: result.last_insert_id.unwrap_or_default(),
            rows_affected: result.rows_affected.unwrap_or_default(),
        })
    }

    async fn execute_batch(&self, sql: &str) -> Result<(), StorageError> {
        let statements = split_statements(sql)
            .into_iter()
            .map(Json::from)
            .collect::<Vec<_>>();
        self.post("/db/execute?transaction", &Json::Array(statements))
            .await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statement_body_is_parameterized_array() {
        let body = statement_body(
            "INSERT INTO containers (id, cluster_id) VALUES (?, ?)",
            &["c1_etcd_h1_0".into(), Value::Integer(1)],
        );
        assert_eq!(
            body.to_string(),
            r#"[["INSERT INTO containers (id, cluster_id) VALUES (?, ?)","c1_etcd_h1_0",1]]"#
        );
    }

    #[test]
    fn query_response_decodes_rows() {
        let body = br#"{"results":[{"columns":["id","container_id"],"types":["text","text"],"values":[["c1_mds_h1_0","abc"]]}]}"#;
        let mut rows = into_rows(parse_response(body).unwrap().pop().unwrap());
        let row = rows.next().unwrap();
        assert_eq!(row.get_str("id").unwrap(), "c1_mds_h1_0");
        assert_eq!(row.get_str("container_id").unwrap(), "abc");
    }

    #[test]
    fn statement_error_is_surfaced() {
        let body = br#"{"results":[{"error":"UNIQUE constraint failed: clusters.name"}]}"#;
        assert!(matches!(parse_response(body), Err(StorageError::Conflict(_))));
        let body = br#"{"results":[{"error":"no such table: foo"}]}"#;
        assert!(matches!(parse_response(body), Err(StorageError::Query(_))));
    }

    #[test]
    fn address_requires_port() {
        assert!(RqliteDriver::new("db.local").is_err());
        let driver = RqliteDriver::new("db.local:4001").unwrap();
        assert_eq!(driver.port, 4001);
    }
}
