// ABOUTME: Minimal HTTP/1.1 client over a plain TCP stream.
// ABOUTME: Shared by the HTTP agent transport and the rqlite store driver.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::StatusCode;
use hyper_util::rt::TokioIo;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("failed to connect to {addr}: {reason}")]
    Connect { addr: String, reason: String },

    #[error("HTTP handshake with {addr} failed: {reason}")]
    Handshake { addr: String, reason: String },

    #[error("HTTP request failed: {0}")]
    Request(String),

    #[error("failed to read response body: {0}")]
    Body(String),

    #[error("HTTP request timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Debug)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }
}

/// One request to `http://host:port{path}` on a fresh connection.
#[derive(Debug, Clone)]
pub struct HttpRequest<'a> {
    pub method: &'a str,
    pub path: String,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl<'a> HttpRequest<'a> {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: "GET",
            path: path.into(),
            content_type: None,
            body: Bytes::new(),
        }
    }

    pub fn post(path: impl Into<String>, content_type: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            method: "POST",
            path: path.into(),
            content_type: Some(content_type.into()),
            body: body.into(),
        }
    }
}

pub async fn send(
    host: &str,
    port: u16,
    request: HttpRequest<'_>,
    timeout: Duration,
) -> Result<HttpResponse, HttpError> {
    match tokio::time::timeout(timeout, send_inner(host, port, request)).await {
        Ok(result) => result,
        Err(_) => Err(HttpError::Timeout(timeout)),
    }
}

async fn send_inner(host: &str, port: u16, request: HttpRequest<'_>) -> Result<HttpResponse, HttpError> {
    let addr = format!("{host}:{port}");
    let stream = TcpStream::connect(&addr).await.map_err(|e| HttpError::Connect {
        addr: addr.clone(),
        reason: e.to_string(),
    })?;

    let io = TokioIo::new(stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
        .await
        .map_err(|e| HttpError::Handshake {
            addr: addr.clone(),
            reason: e.to_string(),
        })?;

    tokio::spawn(async move {
        if let Err(e) = conn.await {
            tracing::debug!("http connection error: {}", e);
        }
    });

    let mut builder = hyper::Request::builder()
        .method(request.method)
        .uri(&request.path)
        .header("Host", addr.as_str());
    if let Some(content_type) = &request.content_type {
        builder = builder.header("Content-Type", content_type.as_str());
    }
    let req = builder
        .body(Full::new(request.body))
        .map_err(|e| HttpError::Request(format!("failed to build request: {e}")))?;

    let resp = sender
        .send_request(req)
        .await
        .map_err(|e| HttpError::Request(e.to_string()))?;
    let status = resp.status();
    let body = resp
        .into_body()
        .collect()
        .await
        .map_err(|e| HttpError::Body(e.to_string()))?
        .to_bytes();

    Ok(HttpResponse { status, body })
}

/// Encode one file as a `multipart/form-data` body with a `path` field.
/// Returns the content type (with boundary) and the body.
pub fn multipart_file(path: &str, file_name: &str, content: &[u8]) -> (String, Bytes) {
    let boundary = format!("clusteradm-{:016x}", chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0));
    let mut body = Vec::with_capacity(content.len() + 256);
    body.extend_from_slice(
        format!("--{boundary}\r\nContent-Disposition: form-data; name=\"path\"\r\n\r\n{path}\r\n")
            .as_bytes(),
    );
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={boundary}"), Bytes::from(body))
}
