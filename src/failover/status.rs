//! Read-only cluster status
//!
//! Probes both roles and reads every edge's backend list. Flags
//! split-brain, a missing Primary and edges that disagree with the
//! observed roles.

use std::collections::BTreeSet;

use crate::cluster::{ClusterTopology, Node, TopologyHealth};
use crate::runtime::Collaborators;

use super::detector::probe_topology;
use super::membership::read_all;

#[derive(Debug, Clone)]
pub struct EdgeStatus {
    pub edge: String,
    /// Registered backends, or why they could not be read.
    pub backends: Result<Vec<String>, String>,
}

#[derive(Debug, Clone)]
pub struct StatusReport {
    pub topology: ClusterTopology,
    pub edges: Vec<EdgeStatus>,
    /// Backend URLs the edges should carry given the observed roles.
    pub expected: BTreeSet<String>,
}

impl StatusReport {
    pub fn health(&self) -> TopologyHealth {
        self.topology.health()
    }

    /// Edges whose membership differs from the expected set.
    pub fn drift(&self) -> Vec<String> {
        self.edges
            .iter()
            .filter_map(|e| match &e.backends {
                Err(reason) => Some(format!("{}: unreadable ({})", e.edge, reason)),
                Ok(list) => {
                    let actual: BTreeSet<String> = list.iter().cloned().collect();
                    if actual == self.expected {
                        return None;
                    }
                    let missing: Vec<_> = self.expected.difference(&actual).cloned().collect();
                    let extra: Vec<_> = actual.difference(&self.expected).cloned().collect();
                    Some(format!(
                        "{}: missing [{}] unexpected [{}]",
                        e.edge,
                        missing.join(", "),
                        extra.join(", ")
                    ))
                }
            })
            .collect()
    }

    /// 0 with exactly one Primary, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        match self.health() {
            TopologyHealth::SinglePrimary => 0,
            _ => 1,
        }
    }

    pub fn render(&self) -> String {
        let mut out = format!("topology: {}\n", self.topology);
        match self.health() {
            TopologyHealth::SinglePrimary => {}
            TopologyHealth::SplitBrain => out.push_str("SPLIT BRAIN: both nodes are Primary\n"),
            TopologyHealth::NoPrimary => out.push_str("NO PRIMARY observed\n"),
        }
        for edge in &self.edges {
            match &edge.backends {
                Ok(list) => out.push_str(&format!("edge {}: {}\n", edge.edge, list.join(", "))),
                Err(reason) => out.push_str(&format!("edge {}: unreadable: {}\n", edge.edge, reason)),
            }
        }
        for drift in self.drift() {
            out.push_str(&format!("drift: {}\n", drift));
        }
        out
    }
}

/// Collect a status report. Mutates nothing.
pub fn collect(env: &Collaborators<'_>, local: &Node, peer: &Node) -> StatusReport {
    let topology = probe_topology(env, local, peer);
    let expected = [local, peer]
        .into_iter()
        .filter(|n| {
            topology
                .role_of(&n.id)
                .map(|r| r.is_healthy())
                .unwrap_or(false)
        })
        .map(|n| n.backend_url().to_string())
        .collect();
    let edges = read_all(env)
        .into_iter()
        .map(|(edge, backends)| EdgeStatus {
            edge,
            backends: backends.map_err(|e| e.to_string()),
        })
        .collect();
    StatusReport {
        topology,
        edges,
        expected,
    }
}
