// ABOUTME: Per-role service entries: image, placement, ports and config values.
// ABOUTME: One entry expands to `instances` services on each listed host.

use super::deserialize::deserialize_placement;
use crate::types::Role;
use nonempty::NonEmpty;
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub role: Role,
    pub image: String,
    /// Host names this role runs on.
    #[serde(deserialize_with = "deserialize_placement")]
    pub hosts: NonEmpty<String>,
    #[serde(default = "default_instances")]
    pub instances: u32,
    #[serde(default)]
    pub client_port: Option<u16>,
    #[serde(default)]
    pub peer_port: Option<u16>,
    /// Pull the image before creating the container.
    #[serde(default)]
    pub pull: bool,
    /// Overrides the cluster-wide data root for this role.
    #[serde(default)]
    pub data_root: Option<String>,
    /// `key=value` lines written to the service's config file.
    #[serde(default)]
    pub config: BTreeMap<String, String>,
}

fn default_instances() -> u32 {
    1
}
