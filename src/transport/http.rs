// ABOUTME: HTTP execution-agent transport speaking JSON-RPC for commands.
// ABOUTME: Files move through multipart upload and query-string download endpoints.

use super::{Protocol, Transport, TransportError};
use crate::http_client::{self, HttpError, HttpRequest};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Address of an execution agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpAgentConfig {
    pub host: String,
    pub port: u16,
    pub command_timeout: Duration,
}

impl HttpAgentConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            command_timeout: Duration::from_secs(300),
        }
    }

    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'static str,
    params: ExecParams<'a>,
}

#[derive(Debug, Serialize)]
struct ExecParams<'a> {
    command: &'a str,
    timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<ExecResult>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct ExecResult {
    exit_code: i32,
    #[serde(default)]
    output: String,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug)]
pub struct HttpTransport {
    config: HttpAgentConfig,
    next_id: AtomicU64,
}

impl HttpTransport {
    pub fn new(config: HttpAgentConfig) -> Self {
        Self {
            config,
            next_id: AtomicU64::new(1),
        }
    }

    fn map_http(&self, err: HttpError) -> TransportError {
        match err {
            HttpError::Connect { addr, reason } => TransportError::Connect { addr, reason },
            HttpError::Timeout(d) => TransportError::Timeout(d),
            other => TransportError::Other(other.to_string()),
        }
    }
}

/// Interpret a JSON-RPC exec response body.
fn parse_exec_response(body: &[u8]) -> Result<String, TransportError> {
    let response: RpcResponse = serde_json::from_slice(body)
        .map_err(|e| TransportError::Other(format!("invalid agent response: {e}")))?;
    if let Some(error) = response.error {
        return Err(TransportError::Other(format!(
            "agent error {}: {}",
            error.code, error.message
        )));
    }
    let result = response
        .result
        .ok_or_else(|| TransportError::Other("agent response has neither result nor error".into()))?;
    if result.exit_code == 0 {
        Ok(result.output)
    } else {
        Err(TransportError::NonZeroExit {
            exit_code: result.exit_code,
            output: result.output,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn protocol(&self) -> Protocol {
        Protocol::Http
    }

    async fn run(&self, command: &str, timeout: Option<Duration>) -> Result<String, TransportError> {
        let timeout = timeout.unwrap_or(self.config.command_timeout);
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method: "exec",
            params: ExecParams {
                command,
                timeout_secs: timeout.as_secs().max(1),
            },
        };
        let body = serde_json::to_vec(&request)
            .map_err(|e| TransportError::Other(format!("failed to encode request: {e}")))?;

        // Allow the agent to report its own timeout before ours fires.
        let response = http_client::send(
            &self.config.host,
            self.config.port,
            HttpRequest::post("/rpc", "application/json", body),
            timeout + Duration::from_secs(5),
        )
        .await
        .map_err(|e| self.map_http(e))?;

        if !response.status.is_success() {
            return Err(TransportError::Other(format!(
                "agent returned {}: {}",
                response.status,
                response.text()
            )));
        }
        parse_exec_response(&response.body)
    }

    async fn upload(&self, content: &[u8], remote_path: &str) -> Result<(), TransportError> {
        let file_name = Path::new(remote_path)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "upload".to_string());
        let (content_type, body) = http_client::multipart_file(remote_path, &file_name, content);

        let response = http_client::send(
            &self.config.host,
            self.config.port,
            HttpRequest::post("/upload", content_type, body),
            self.config.command_timeout,
        )
        .await
        .map_err(|e| TransportError::Upload {
            path: remote_path.to_string(),
            reason: e.to_string(),
        })?;

        if !response.status.is_success() {
            return Err(TransportError::Upload {
                path: remote_path.to_string(),
                reason: format!("{}: {}", response.status, response.text().trim()),
            });
        }
        Ok(())
    }

    async fn download(&self, remote_path: &str) -> Result<Vec<u8>, TransportError> {
        let path = format!("/download?path={}", urlencoding::encode(remote_path));
        let response = http_client::send(
            &self.config.host,
            self.config.port,
            HttpRequest::get(path),
            self.config.command_timeout,
        )
        .await
        .map_err(|e| TransportError::Download {
            path: remote_path.to_string(),
            reason: e.to_string(),
        })?;

        if !response.status.is_success() {
            return Err(TransportError::Download {
                path: remote_path.to_string(),
                reason: format!("{}: {}", response.status, response.text().trim()),
            });
        }
        Ok(response.body.to_vec())
    }

    fn remote_addr(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }

    async fn close(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_returns_output() {
        let body = br#"{"jsonrpc":"2.0","id":1,"result":{"exit_code":0,"output":"Up 3 minutes"}}"#;
        assert_eq!(parse_exec_response(body).unwrap(), "Up 3 minutes");
    }

    #[test]
    fn non_zero_exit_is_error_with_output() {
        let body = br#"{"jsonrpc":"2.0","id":1,"result":{"exit_code":2,"output":"no such file"}}"#;
        let err = parse_exec_response(body).unwrap_err();
        assert_eq!(err.output(), Some("no such file"));
    }

    #[test]
    fn rpc_error_is_reported() {
        let body = br#"{"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"method not found"}}"#;
        let err = parse_exec_response(body).unwrap_err();
        assert!(err.to_string().contains("method not found"));
    }

    #[test]
    fn request_shape_matches_agent_protocol() {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: 7,
            method: "exec",
            params: ExecParams {
                command: "docker ps",
                timeout_secs: 30,
            },
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["method"], "exec");
        assert_eq!(value["params"]["command"], "docker ps");
        assert_eq!(value["id"], 7);
    }
}
