// ABOUTME: Desired-state topology and the diff between two of them.
// ABOUTME: Instances are matched by role and ordinal; a host change becomes a migration pair.

use crate::types::Role;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One service instance placed on a host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Placement {
    pub role: Role,
    pub host: String,
    /// Instance number on `host`.
    pub sequence: u32,
}

/// Every placement of a cluster, in config order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    pub placements: Vec<Placement>,
}

impl Topology {
    pub fn new(placements: Vec<Placement>) -> Self {
        Self { placements }
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml)
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    pub fn of_role(&self, role: Role) -> impl Iterator<Item = &Placement> {
        self.placements.iter().filter(move |p| p.role == role)
    }

    /// Placements keyed by (role, ordinal within role).
    fn keyed(&self) -> BTreeMap<(Role, usize), &Placement> {
        let mut ordinals: BTreeMap<Role, usize> = BTreeMap::new();
        self.placements
            .iter()
            .map(|p| {
                let ordinal = ordinals.entry(p.role).or_default();
                let key = (p.role, *ordinal);
                *ordinal += 1;
                (key, p)
            })
            .collect()
    }
}

/// A placement that moved between hosts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Moved {
    pub from: Placement,
    pub to: Placement,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopologyDiff {
    pub added: Vec<Placement>,
    pub removed: Vec<Placement>,
    pub moved: Vec<Moved>,
}

impl TopologyDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.moved.is_empty()
    }
}

/// What changes going from `current` to `desired`.
pub fn diff(current: &Topology, desired: &Topology) -> TopologyDiff {
    let old = current.keyed();
    let new = desired.keyed();
    let mut out = TopologyDiff::default();

    for (key, to) in &new {
        match old.get(key) {
            None => out.added.push((*to).clone()),
            Some(from) if from != to => out.moved.push(Moved {
                from: (*from).clone(),
                to: (*to).clone(),
            }),
            Some(_) => {}
        }
    }
    out.removed = old
        .iter()
        .filter(|(key, _)| !new.contains_key(key))
        .map(|(_, p)| (*p).clone())
        .collect();
    out
}
