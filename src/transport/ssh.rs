// ABOUTME: SSH transport backed by a russh session.
// ABOUTME: Maps non-zero exits to TransportError while keeping combined output.

use super::{Protocol, Transport, TransportError};
use crate::ssh::{Error as SshError, Session, SessionConfig};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

#[derive(Debug)]
pub struct SshTransport {
    session: Session,
}

impl SshTransport {
    pub async fn connect(config: SessionConfig) -> Result<Self, TransportError> {
        let session = Session::connect(config).await?;
        debug!(addr = %session.addr(), "ssh transport ready");
        Ok(Self { session })
    }
}

#[async_trait]
impl Transport for SshTransport {
    fn protocol(&self) -> Protocol {
        Protocol::Ssh
    }

    async fn run(&self, command: &str, timeout: Option<Duration>) -> Result<String, TransportError> {
        let output = self.session.exec(command, timeout).await?;
        if output.success() {
            Ok(output.text())
        } else {
            Err(TransportError::NonZeroExit {
                exit_code: output.exit_status as i32,
                output: output.text(),
            })
        }
    }

    async fn upload(&self, content: &[u8], remote_path: &str) -> Result<(), TransportError> {
        self.session
            .upload(content, remote_path)
            .await
            .map_err(Into::into)
    }

    async fn download(&self, remote_path: &str) -> Result<Vec<u8>, TransportError> {
        self.session.download(remote_path).await.map_err(|e| match e {
            SshError::Transfer { path, reason } => TransportError::Download { path, reason },
            other => other.into(),
        })
    }

    fn remote_addr(&self) -> String {
        self.session.addr()
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.session
            .disconnect()
            .await
            .map_err(|e| TransportError::Closed(e.to_string()))
    }
}
