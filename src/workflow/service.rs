// ABOUTME: Desired state of one service instance, as the workflows consume it.
// ABOUTME: Directory layout, ports and config values derive from role and identity.

use crate::step::ContainerSpec;
use crate::transport::Connector;
use crate::types::{Role, ServiceId};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Host directories a service container mounts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub conf_dir: String,
    pub data_dir: String,
    pub log_dir: String,
}

impl Layout {
    /// `{root}/{service id}/{conf,data,logs}`.
    pub fn under(root: &str, id: &ServiceId) -> Self {
        let base = format!("{}/{}", root.trim_end_matches('/'), id);
        Self {
            conf_dir: format!("{base}/conf"),
            data_dir: format!("{base}/data"),
            log_dir: format!("{base}/logs"),
        }
    }

    pub fn all(&self) -> [&str; 3] {
        [&self.conf_dir, &self.data_dir, &self.log_dir]
    }
}

/// One service instance to deploy or operate.
#[derive(Debug, Clone)]
pub struct ServiceSpec {
    pub id: ServiceId,
    pub cluster_id: i64,
    pub role: Role,
    pub host: String,
    /// Address other services use to reach this one.
    pub address: String,
    pub sequence: u32,
    pub image: String,
    pub layout: Layout,
    pub client_port: Option<u16>,
    pub peer_port: Option<u16>,
    /// `key=value` lines of the service's config file.
    pub config: BTreeMap<String, String>,
    pub pull_image: bool,
    pub target: Arc<dyn Connector>,
}

impl ServiceSpec {
    /// Path of the service's config file on the host.
    pub fn config_path(&self) -> String {
        format!("{}/{}.conf", self.layout.conf_dir, self.role)
    }

    /// Rendered config file, if the service has any config.
    pub fn config_text(&self) -> Option<String> {
        if self.config.is_empty() {
            return None;
        }
        Some(
            self.config
                .iter()
                .map(|(k, v)| format!("{k}={v}\n"))
                .collect(),
        )
    }

    /// `address:client_port`, the endpoint dependents embed.
    pub fn client_endpoint(&self) -> Option<String> {
        self.client_port.map(|p| format!("{}:{}", self.address, p))
    }

    pub fn peer_url(&self) -> Option<String> {
        self.peer_port.map(|p| format!("http://{}:{}", self.address, p))
    }

    /// The container this service runs in.
    pub fn container_spec(&self) -> ContainerSpec {
        let root = format!("/clusteradm/{}", self.role);
        ContainerSpec::new(&self.image)
            .name(self.id.as_str())
            .hostname(format!("{}-{}-{}", self.role, self.host, self.sequence))
            .network("host")
            .restart_policy("always")
            .volume(&self.layout.conf_dir, format!("{root}/conf"))
            .volume(&self.layout.data_dir, format!("{root}/data"))
            .volume(&self.layout.log_dir, format!("{root}/logs"))
            .label("clusteradm.service", self.id.as_str())
            .label("clusteradm.role", self.role.as_str())
    }
}

/// Comma-joined client endpoints of `members`.
pub fn endpoint_list<'a>(members: impl IntoIterator<Item = &'a ServiceSpec>) -> String {
    members
        .into_iter()
        .filter_map(ServiceSpec::client_endpoint)
        .collect::<Vec<_>>()
        .join(",")
}
