// ABOUTME: Configuration types and parsing for clusteradm.yml.
// ABOUTME: Resolves hosts and service entries into placements, targets and service specs.

mod deserialize;
mod host;
mod init;
mod service;

pub use host::{HostConfig, HostProtocol};
pub use init::init_config;
pub use service::ServiceConfig;

use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::ssh::{HostKeyPolicy, SessionConfig};
use crate::topology::{Placement, Topology};
use crate::transport::{Connector, ExecOptions, HttpAgentConfig, Target};
use crate::types::{Role, ServiceId};
use crate::workflow::{Layout, ServiceSpec};
use deserialize::deserialize_hosts;
use nonempty::NonEmpty;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub const CONFIG_FILENAME: &str = "clusteradm.yml";
pub const CONFIG_FILENAME_ALT: &str = "clusteradm.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".clusteradm/config.yml";

const DEFAULT_HTTP_AGENT_PORT: u16 = 8080;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub cluster: String,

    /// State store URL; see [`Config::store_url`] for the default.
    #[serde(default)]
    pub store: Option<String>,

    /// Detected on the first host when unset.
    #[serde(default)]
    pub engine: Option<Engine>,

    #[serde(default = "default_parallelism")]
    pub parallelism: usize,

    #[serde(default = "default_command_timeout", with = "humantime_serde")]
    pub command_timeout: Duration,

    #[serde(default)]
    pub sudo: bool,

    #[serde(default = "default_sudo_alias")]
    pub sudo_alias: String,

    #[serde(default = "default_data_root")]
    pub data_root: String,

    #[serde(default)]
    pub ssh: SshDefaults,

    #[serde(deserialize_with = "deserialize_hosts")]
    pub hosts: NonEmpty<HostConfig>,

    #[serde(default)]
    pub services: Vec<ServiceConfig>,
}

/// SSH settings shared by every host unless the host overrides them.
#[derive(Debug, Clone, Deserialize)]
pub struct SshDefaults {
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    #[serde(default)]
    pub key_path: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub use_agent: bool,
    #[serde(default)]
    pub known_hosts: Option<PathBuf>,
    #[serde(default)]
    pub host_key_policy: HostKeyPolicy,
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,
    #[serde(default = "default_connect_retries")]
    pub connect_retries: u32,
}

impl Default for SshDefaults {
    fn default() -> Self {
        Self {
            user: None,
            port: default_ssh_port(),
            key_path: None,
            use_agent: true,
            known_hosts: None,
            host_key_policy: HostKeyPolicy::default(),
            connect_timeout: default_connect_timeout(),
            connect_retries: default_connect_retries(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_connect_retries() -> u32 {
    2
}

fn default_parallelism() -> usize {
    crate::runner::DEFAULT_PARALLELISM
}

fn default_command_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_sudo_alias() -> String {
    "sudo".to_string()
}

fn default_data_root() -> String {
    "/data/clusteradm".to_string()
}

fn default_ssh_port() -> u16 {
    22
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(Error::from)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn discover(dir: &Path) -> Result<Self> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        for path in &candidates {
            if path.exists() {
                return Self::load(path);
            }
        }

        Err(Error::ConfigNotFound(dir.to_path_buf()))
    }

    /// Cross-field checks serde cannot express.
    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for host in &self.hosts {
            if !names.insert(host.name.as_str()) {
                return Err(Error::InvalidConfig(format!("duplicate host: {}", host.name)));
            }
            ServiceId::new(&self.cluster, Role::Etcd, &host.name, 0)
                .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        }

        let mut roles = HashSet::new();
        for service in &self.services {
            if !roles.insert(service.role) {
                return Err(Error::InvalidConfig(format!(
                    "role {} configured more than once",
                    service.role
                )));
            }
            if service.instances == 0 {
                return Err(Error::InvalidConfig(format!(
                    "role {} must have at least one instance",
                    service.role
                )));
            }
            for host in &service.hosts {
                self.host(host)?;
            }
        }
        Ok(())
    }

    pub fn host(&self, name: &str) -> Result<&HostConfig> {
        self.hosts
            .iter()
            .find(|h| h.name == name)
            .ok_or_else(|| Error::UnknownHost(name.to_string()))
    }

    pub fn service(&self, role: Role) -> Result<&ServiceConfig> {
        self.services
            .iter()
            .find(|s| s.role == role)
            .ok_or_else(|| Error::InvalidConfig(format!("no service configured for role {role}")))
    }

    /// Configured store, or `sqlite://$HOME/.clusteradm/data.db`.
    pub fn store_url(&self) -> String {
        match &self.store {
            Some(url) => url.clone(),
            None => {
                let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
                format!("sqlite://{home}/.clusteradm/data.db")
            }
        }
    }

    pub fn exec_options(&self, engine: Engine) -> ExecOptions {
        ExecOptions::default()
            .with_sudo(self.sudo)
            .with_sudo_alias(&self.sudo_alias)
            .with_engine(engine)
            .with_timeout(self.command_timeout)
    }

    /// How to reach `host`.
    pub fn target(&self, host: &HostConfig) -> Target {
        match host.protocol {
            HostProtocol::Local => Target::Local,
            HostProtocol::Http => Target::Http(
                HttpAgentConfig::new(&host.address, host.port.unwrap_or(DEFAULT_HTTP_AGENT_PORT))
                    .command_timeout(self.command_timeout),
            ),
            HostProtocol::Ssh => {
                let user = host
                    .user
                    .clone()
                    .or_else(|| self.ssh.user.clone())
                    .unwrap_or_else(|| std::env::var("USER").unwrap_or_else(|_| "root".to_string()));
                let mut session = SessionConfig::new(&host.address, user)
                    .port(host.port.unwrap_or(self.ssh.port))
                    .use_agent(self.ssh.use_agent)
                    .host_keys(self.ssh.host_key_policy)
                    .connect_timeout(self.ssh.connect_timeout)
                    .connect_retries(self.ssh.connect_retries)
                    .command_timeout(self.command_timeout);
                if let Some(key) = host.key_path.as_ref().or(self.ssh.key_path.as_ref()) {
                    session = session.key_path(key);
                }
                if let Some(known_hosts) = &self.ssh.known_hosts {
                    session = session.known_hosts(known_hosts);
                }
                Target::Ssh(session)
            }
        }
    }

    /// One shared connector per host name.
    pub fn connectors(&self) -> BTreeMap<String, Arc<dyn Connector>> {
        self.hosts
            .iter()
            .map(|h| (h.name.clone(), Arc::new(self.target(h)) as Arc<dyn Connector>))
            .collect()
    }

    /// Desired placements, in config order.
    pub fn topology(&self) -> Topology {
        let placements = self
            .services
            .iter()
            .flat_map(|service| {
                service.hosts.iter().flat_map(move |host| {
                    (0..service.instances).map(move |sequence| Placement {
                        role: service.role,
                        host: host.clone(),
                        sequence,
                    })
                })
            })
            .collect();
        Topology::new(placements)
    }

    /// Specs for every desired placement.
    pub fn service_specs(&self, cluster_id: i64) -> Result<Vec<ServiceSpec>> {
        self.specs_for(&self.topology().placements, cluster_id)
    }

    pub fn specs_for(&self, placements: &[Placement], cluster_id: i64) -> Result<Vec<ServiceSpec>> {
        let connectors = self.connectors();
        placements
            .iter()
            .map(|p| {
                let target = connectors
                    .get(&p.host)
                    .cloned()
                    .ok_or_else(|| Error::UnknownHost(p.host.clone()))?;
                self.service_spec(p, cluster_id, target)
            })
            .collect()
    }

    pub fn service_spec(
        &self,
        placement: &Placement,
        cluster_id: i64,
        target: Arc<dyn Connector>,
    ) -> Result<ServiceSpec> {
        let service = self.service(placement.role)?;
        let host = self.host(&placement.host)?;
        let id = ServiceId::new(&self.cluster, placement.role, &host.name, placement.sequence)
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        let data_root = service.data_root.as_deref().unwrap_or(&self.data_root);
        // Extra instances on one host shift their ports to stay distinct.
        let offset = placement.sequence as u16;

        Ok(ServiceSpec {
            layout: Layout::under(data_root, &id),
            id,
            cluster_id,
            role: placement.role,
            host: host.name.clone(),
            address: host.service_address().to_string(),
            sequence: placement.sequence,
            image: service.image.clone(),
            client_port: service.client_port.map(|p| p + offset),
            peer_port: service.peer_port.map(|p| p + offset),
            config: service.config.clone(),
            pull_image: service.pull,
            target,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
cluster: c1
command_timeout: 90s
sudo: true
hosts:
  - root@10.0.0.1
  - name: host2
    address: 10.0.0.2
    port: 2222
  - name: local
    address: 127.0.0.1
    protocol: local
services:
  - role: etcd
    image: curvebs:v1
    hosts: [10.0.0.1, host2]
    client_port: 2379
    peer_port: 2380
  - role: mds
    image: curvebs:v1
    hosts: [host2]
    instances: 2
    client_port: 6700
    config:
      mds.etcd.endpoint: 10.0.0.1:2379,10.0.0.2:2379
"#;

    #[test]
    fn parses_hosts_and_durations() {
        let config = Config::from_yaml(YAML).unwrap();
        config.validate().unwrap();
        assert_eq!(config.command_timeout, Duration::from_secs(90));
        assert_eq!(config.hosts.first().name, "10.0.0.1");
        assert_eq!(config.hosts.first().user.as_deref(), Some("root"));
        assert_eq!(config.parallelism, 16);
        assert!(matches!(config.target(config.host("local").unwrap()), Target::Local));
    }

    #[test]
    fn topology_expands_instances() {
        let config = Config::from_yaml(YAML).unwrap();
        let topology = config.topology();
        assert_eq!(topology.placements.len(), 4);
        assert_eq!(topology.of_role(Role::Mds).count(), 2);
    }

    #[test]
    fn specs_carry_identity_layout_and_ports() {
        let config = Config::from_yaml(YAML).unwrap();
        let specs = config.service_specs(7).unwrap();
        let mds1 = specs
            .iter()
            .find(|s| s.id.as_str() == "c1_mds_host2_1")
            .unwrap();
        assert_eq!(mds1.cluster_id, 7);
        assert_eq!(mds1.address, "10.0.0.2");
        assert_eq!(mds1.client_port, Some(6701));
        assert_eq!(mds1.layout.data_dir, "/data/clusteradm/c1_mds_host2_1/data");
        assert!(mds1.config_text().unwrap().starts_with("mds.etcd.endpoint="));
    }

    #[test]
    fn empty_host_list_is_rejected() {
        let err = Config::from_yaml("cluster: c1\nhosts: []\n").unwrap_err();
        assert!(err.to_string().contains("at least one host"));
    }

    #[test]
    fn unknown_service_host_fails_validation() {
        let yaml = "cluster: c1\nhosts: [h1]\nservices:\n  - role: etcd\n    image: x\n    hosts: [h9]\n";
        let config = Config::from_yaml(yaml).unwrap();
        assert!(matches!(config.validate(), Err(Error::UnknownHost(h)) if h == "h9"));
    }

    #[test]
    fn cluster_name_with_separator_is_invalid() {
        let config = Config::from_yaml("cluster: my_cluster\nhosts: [h1]\n").unwrap();
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn discover_finds_alternate_names() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(Config::discover(dir.path()), Err(Error::ConfigNotFound(_))));
        std::fs::write(dir.path().join(CONFIG_FILENAME_ALT), "cluster: c1\nhosts: [h1]\n").unwrap();
        assert_eq!(Config::discover(dir.path()).unwrap().cluster, "c1");
    }
}
