// ABOUTME: Server host key verification against known_hosts.
// ABOUTME: Strict hosts must already be recorded; accept-new records unseen keys on first contact.

use russh::client;
use russh::keys::known_hosts::{
    check_known_hosts, check_known_hosts_path, learn_known_hosts, learn_known_hosts_path,
};
use russh::keys::ssh_key;
use serde::Deserialize;
use std::path::PathBuf;
use tracing::{debug, warn};

/// What to do with a host key that known_hosts has never seen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HostKeyPolicy {
    /// Refuse unknown hosts.
    #[default]
    Strict,
    /// Record unknown hosts on first contact. A changed key is still refused.
    AcceptNew,
}

/// What known_hosts says about a presented key.
#[derive(Debug, PartialEq, Eq)]
enum Verdict {
    Known,
    Unknown,
    Changed,
    Unreadable(String),
}

impl HostKeyPolicy {
    fn accepts(self, verdict: &Verdict) -> bool {
        match verdict {
            Verdict::Known => true,
            Verdict::Changed => false,
            Verdict::Unknown | Verdict::Unreadable(_) => self == HostKeyPolicy::AcceptNew,
        }
    }
}

/// russh handler that checks one host's key.
pub(crate) struct HostKeyCheck {
    host: String,
    port: u16,
    policy: HostKeyPolicy,
    known_hosts: Option<PathBuf>,
}

impl HostKeyCheck {
    pub(crate) fn new(host: &str, port: u16, policy: HostKeyPolicy, known_hosts: Option<PathBuf>) -> Self {
        Self {
            host: host.to_string(),
            port,
            policy,
            known_hosts,
        }
    }

    fn lookup(&self, key: &ssh_key::PublicKey) -> Verdict {
        let found = match &self.known_hosts {
            Some(path) => check_known_hosts_path(&self.host, self.port, key, path),
            None => check_known_hosts(&self.host, self.port, key),
        };
        match found {
            Ok(true) => Verdict::Known,
            Ok(false) => Verdict::Unknown,
            Err(russh::keys::Error::KeyChanged { .. }) => Verdict::Changed,
            Err(e) => Verdict::Unreadable(e.to_string()),
        }
    }

    fn remember(&self, key: &ssh_key::PublicKey) {
        let learned = match &self.known_hosts {
            Some(path) => learn_known_hosts_path(&self.host, self.port, key, path),
            None => learn_known_hosts(&self.host, self.port, key),
        };
        if let Err(e) = learned {
            warn!(host = %self.host, error = %e, "could not record host key in known_hosts");
        }
    }
}

impl client::Handler for HostKeyCheck {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &ssh_key::PublicKey,
    ) -> Result<bool, Self::Error> {
        let verdict = self.lookup(server_public_key);
        let accepted = self.policy.accepts(&verdict);
        match &verdict {
            Verdict::Changed => {
                warn!(host = %self.host, port = self.port, "host key differs from known_hosts");
            }
            Verdict::Unknown if accepted => {
                warn!(host = %self.host, port = self.port, "accepting new host key");
                self.remember(server_public_key);
            }
            Verdict::Unreadable(reason) => {
                debug!(host = %self.host, reason = %reason, accepted, "known_hosts unreadable");
            }
            _ => {}
        }
        Ok(accepted)
    }
}
