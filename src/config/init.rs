// ABOUTME: Config scaffolding for new clusters.
// ABOUTME: Writes a clusteradm.yml template with a three-node etcd layout.

use std::path::Path;

use crate::error::{Error, Result};

use super::CONFIG_FILENAME;

pub fn init_config(dir: &Path, cluster: Option<&str>, force: bool) -> Result<()> {
    let config_path = dir.join(CONFIG_FILENAME);

    if config_path.exists() && !force {
        return Err(Error::AlreadyExists(config_path));
    }

    let cluster = cluster.unwrap_or("my-cluster");
    if cluster.is_empty() || cluster.contains('_') {
        return Err(Error::InvalidConfig(format!(
            "cluster name must be non-empty and contain no '_': {cluster}"
        )));
    }

    std::fs::write(&config_path, template_yaml(cluster))?;
    Ok(())
}

fn template_yaml(cluster: &str) -> String {
    format!(
        r#"cluster: {cluster}
# store: sqlite:///var/lib/clusteradm/data.db
# engine: docker
parallelism: 16
command_timeout: 5m
sudo: true
data_root: /data/clusteradm
hosts:
  - root@10.0.0.1
  - root@10.0.0.2
  - root@10.0.0.3
ssh:
  # strict: the host must already be in ~/.ssh/known_hosts
  # accept-new: record unseen hosts on first contact
  host_key_policy: strict
  connect_timeout: 10s
  connect_retries: 2
services:
  - role: etcd
    image: opencurvedocker/curvebs:v1.2
    hosts: [10.0.0.1, 10.0.0.2, 10.0.0.3]
    client_port: 2379
    peer_port: 2380
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn template_parses() {
        let config = Config::from_yaml(&template_yaml("c1")).unwrap();
        assert_eq!(config.cluster, "c1");
        assert_eq!(config.hosts.len(), 3);
        config.validate().unwrap();
    }

    #[test]
    fn refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        init_config(dir.path(), Some("c1"), false).unwrap();
        assert!(matches!(
            init_config(dir.path(), Some("c1"), false),
            Err(Error::AlreadyExists(_))
        ));
        init_config(dir.path(), Some("c2"), true).unwrap();
    }
}
