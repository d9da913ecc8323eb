// ABOUTME: Service roles deployed into a storage cluster.
// ABOUTME: Parses and displays the lowercase role names used in config and identities.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("unknown service role: {0}")]
pub struct ParseRoleError(String);

/// A service role within the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Etcd,
    Mds,
    Chunkserver,
    Snapshotclone,
    Metaserver,
    Monitor,
    Client,
}

impl Role {
    pub const ALL: [Role; 7] = [
        Role::Etcd,
        Role::Mds,
        Role::Chunkserver,
        Role::Snapshotclone,
        Role::Metaserver,
        Role::Monitor,
        Role::Client,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Etcd => "etcd",
            Role::Mds => "mds",
            Role::Chunkserver => "chunkserver",
            Role::Snapshotclone => "snapshotclone",
            Role::Metaserver => "metaserver",
            Role::Monitor => "monitor",
            Role::Client => "client",
        }
    }

    /// Roles whose configuration embeds the etcd membership list.
    pub fn embeds_etcd_endpoints(&self) -> bool {
        matches!(self, Role::Mds | Role::Snapshotclone)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ParseRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| ParseRoleError(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_round_trip_through_names() {
        for role in Role::ALL {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
    }

    #[test]
    fn unknown_role_is_rejected() {
        assert!("nginx".parse::<Role>().is_err());
    }
}
