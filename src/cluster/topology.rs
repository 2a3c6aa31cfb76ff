//! Observed cluster topology
//!
//! A `ClusterTopology` is a snapshot of what one run probed. It is passed
//! by value between preflight, the orchestrator and the final
//! verification; nothing holds it globally.

use std::fmt;

use serde::Serialize;

use super::node::NodeId;
use super::role::ReplicationRole;

/// Role observation for one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Observation {
    pub node: NodeId,
    pub role: ReplicationRole,
}

/// The pair of observed roles, local node first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterTopology {
    pub local: Observation,
    pub peer: Observation,
}

/// Classification of a topology against the single-primary invariant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopologyHealth {
    /// Exactly one Primary.
    SinglePrimary,
    /// Both nodes claim Primary.
    SplitBrain,
    /// No node answered as Primary.
    NoPrimary,
}

impl ClusterTopology {
    pub fn new(
        local: NodeId,
        local_role: ReplicationRole,
        peer: NodeId,
        peer_role: ReplicationRole,
    ) -> Self {
        Self {
            local: Observation {
                node: local,
                role: local_role,
            },
            peer: Observation {
                node: peer,
                role: peer_role,
            },
        }
    }

    /// Role observed for `node`, if it is part of this topology.
    pub fn role_of(&self, node: &NodeId) -> Option<ReplicationRole> {
        [&self.local, &self.peer]
            .into_iter()
            .find(|o| &o.node == node)
            .map(|o| o.role)
    }

    /// Node observed as Primary, if exactly one is.
    pub fn primary(&self) -> Option<&NodeId> {
        match self.health() {
            TopologyHealth::SinglePrimary => [&self.local, &self.peer]
                .into_iter()
                .find(|o| o.role == ReplicationRole::Primary)
                .map(|o| &o.node),
            _ => None,
        }
    }

    pub fn primary_count(&self) -> usize {
        [&self.local, &self.peer]
            .into_iter()
            .filter(|o| o.role == ReplicationRole::Primary)
            .count()
    }

    pub fn health(&self) -> TopologyHealth {
        match self.primary_count() {
            1 => TopologyHealth::SinglePrimary,
            0 => TopologyHealth::NoPrimary,
            _ => TopologyHealth::SplitBrain,
        }
    }
}

impl fmt::Display for ClusterTopology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}={} {}={}",
            self.local.node, self.local.role, self.peer.node, self.peer.role
        )
    }
}
