// ABOUTME: Host entries: where a service runs and how to reach it.
// ABOUTME: Accepts "host", "user@host", "host:port" and "user@host:port" shorthands.

use crate::transport::Protocol;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostProtocol {
    #[default]
    Ssh,
    Local,
    Http,
}

impl From<HostProtocol> for Protocol {
    fn from(p: HostProtocol) -> Self {
        match p {
            HostProtocol::Ssh => Protocol::Ssh,
            HostProtocol::Local => Protocol::Local,
            HostProtocol::Http => Protocol::Http,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HostConfig {
    /// Name used in service placements and identities. Defaults to `address`.
    #[serde(default)]
    pub name: String,
    pub address: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub protocol: HostProtocol,
    #[serde(default)]
    pub key_path: Option<PathBuf>,
    /// Address other services use; defaults to `address`.
    #[serde(default)]
    pub listen_address: Option<String>,
}

impl HostConfig {
    pub fn parse(s: &str) -> Result<Self, String> {
        let s = s.trim();
        if s.is_empty() {
            return Err("host address cannot be empty".to_string());
        }

        // [user@]host[:port]
        let (user, rest) = match s.split_once('@') {
            Some((user, rest)) if !user.is_empty() => (Some(user), rest),
            Some(_) => return Err(format!("empty user in host: {s}")),
            None => (None, s),
        };

        let (address, port) = match rest.rsplit_once(':') {
            Some((address, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| format!("invalid port: {port}"))?;
                (address, Some(port))
            }
            None => (rest, None),
        };

        if address.is_empty() {
            return Err("hostname cannot be empty".to_string());
        }

        Ok(HostConfig {
            name: address.to_string(),
            address: address.to_string(),
            port,
            user: user.map(str::to_string),
            protocol: HostProtocol::Ssh,
            key_path: None,
            listen_address: None,
        })
    }

    /// Address services on this host advertise to each other.
    pub fn service_address(&self) -> &str {
        self.listen_address.as_deref().unwrap_or(&self.address)
    }
}
