// ABOUTME: Scripted in-memory host implementing the transport and connector traits.
// ABOUTME: Records every command and file transfer, answers commands by substring rules.

use async_trait::async_trait;
use clusteradm::transport::{Connector, Protocol, Transport, TransportError};
use clusteradm::types::{Role, ServiceId};
use clusteradm::workflow::{Layout, ServiceSpec};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
enum Reply {
    Output(String),
    Exit(i32, String),
    Hang,
}

#[derive(Debug, Default)]
struct HostState {
    log: Vec<String>,
    rules: Vec<(String, Reply)>,
    files: BTreeMap<String, Vec<u8>>,
    connects: usize,
    closes: usize,
}

/// A fake host. Clones share state, so a test keeps one handle while the
/// Tasks it builds hold others.
#[derive(Debug, Clone)]
pub struct MockHost {
    name: String,
    state: Arc<Mutex<HostState>>,
}

impl MockHost {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: Arc::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Answer commands containing `pattern` with `output`. Later rules win.
    pub fn reply(&self, pattern: &str, output: &str) -> &Self {
        self.push_rule(pattern, Reply::Output(output.to_string()))
    }

    pub fn fail(&self, pattern: &str, exit_code: i32, output: &str) -> &Self {
        self.push_rule(pattern, Reply::Exit(exit_code, output.to_string()))
    }

    /// Commands containing `pattern` never return.
    pub fn hang(&self, pattern: &str) -> &Self {
        self.push_rule(pattern, Reply::Hang)
    }

    fn push_rule(&self, pattern: &str, reply: Reply) -> &Self {
        self.state.lock().rules.push((pattern.to_string(), reply));
        self
    }

    pub fn put_file(&self, path: &str, content: &str) {
        self.state
            .lock()
            .files
            .insert(path.to_string(), content.as_bytes().to_vec());
    }

    pub fn file(&self, path: &str) -> Option<String> {
        self.state
            .lock()
            .files
            .get(path)
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }

    /// Every command run and every file moved, in order.
    pub fn log(&self) -> Vec<String> {
        self.state.lock().log.clone()
    }

    pub fn log_matching(&self, pattern: &str) -> Vec<String> {
        self.log().into_iter().filter(|l| l.contains(pattern)).collect()
    }

    pub fn clear_log(&self) {
        self.state.lock().log.clear();
    }

    pub fn connects(&self) -> usize {
        self.state.lock().connects
    }

    pub fn closes(&self) -> usize {
        self.state.lock().closes
    }

    pub fn connector(&self) -> Arc<dyn Connector> {
        Arc::new(self.clone())
    }

    fn answer(&self, command: &str) -> Reply {
        let mut state = self.state.lock();
        state.log.push(command.to_string());
        state
            .rules
            .iter()
            .rev()
            .find(|(pattern, _)| command.contains(pattern.as_str()))
            .map(|(_, reply)| reply.clone())
            .unwrap_or_else(|| Reply::Output(String::new()))
    }
}

#[async_trait]
impl Connector for MockHost {
    async fn connect(&self) -> Result<Box<dyn Transport>, TransportError> {
        self.state.lock().connects += 1;
        Ok(Box::new(MockTransport { host: self.clone() }))
    }

    fn describe(&self) -> String {
        format!("mock:{}", self.name)
    }
}

struct MockTransport {
    host: MockHost,
}

#[async_trait]
impl Transport for MockTransport {
    fn protocol(&self) -> Protocol {
        Protocol::Ssh
    }

    async fn run(&self, command: &str, timeout: Option<Duration>) -> Result<String, TransportError> {
        match self.host.answer(command) {
            Reply::Output(output) => Ok(output),
            Reply::Exit(exit_code, output) => Err(TransportError::NonZeroExit { exit_code, output }),
            Reply::Hang => match timeout {
                Some(limit) => {
                    tokio::time::sleep(limit).await;
                    Err(TransportError::Timeout(limit))
                }
                None => std::future::pending().await,
            },
        }
    }

    async fn upload(&self, content: &[u8], remote_path: &str) -> Result<(), TransportError> {
        let mut state = self.host.state.lock();
        state.log.push(format!("upload {remote_path}"));
        state.files.insert(remote_path.to_string(), content.to_vec());
        Ok(())
    }

    async fn download(&self, remote_path: &str) -> Result<Vec<u8>, TransportError> {
        let mut state = self.host.state.lock();
        state.log.push(format!("download {remote_path}"));
        state
            .files
            .get(remote_path)
            .cloned()
            .ok_or_else(|| TransportError::Download {
                path: remote_path.to_string(),
                reason: "no such file".to_string(),
            })
    }

    fn remote_addr(&self) -> String {
        self.host.describe()
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.host.state.lock().closes += 1;
        Ok(())
    }
}

/// A service of cluster `c1` (store id 1) living on `host`.
pub fn service_on(host: &MockHost, role: Role, sequence: u32) -> ServiceSpec {
    let id = ServiceId::new("c1", role, host.name(), sequence).unwrap();
    let port_base: u16 = match role {
        Role::Etcd => 2379,
        Role::Mds => 6700,
        _ => 8200,
    };
    ServiceSpec {
        layout: Layout::under("/data/clusteradm", &id),
        id,
        cluster_id: 1,
        role,
        host: host.name().to_string(),
        address: format!("{}.lan", host.name()),
        sequence,
        image: format!("clusteradm/{role}:test"),
        client_port: Some(port_base + sequence as u16),
        peer_port: (role == Role::Etcd).then_some(2380 + sequence as u16),
        config: BTreeMap::new(),
        pull_image: false,
        target: host.connector(),
    }
}
