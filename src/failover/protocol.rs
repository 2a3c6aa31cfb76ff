//! Protocols and their fixed step plans

use std::fmt;

use serde::Serialize;

use crate::cluster::NodeId;

/// An operator-invoked role transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Protocol {
    /// Promote the surviving Standby while the peer is believed failed.
    EmergencyFailover { force: bool },
    /// Swap roles of two healthy nodes, initiated on the Standby.
    PlannedSwitchover,
    /// Rebuild the local node as Standby of the named Primary.
    Reinstatement { primary: NodeId },
}

impl Protocol {
    pub fn name(&self) -> &'static str {
        match self {
            Self::EmergencyFailover { .. } => "emergency-failover",
            Self::PlannedSwitchover => "planned-switchover",
            Self::Reinstatement { .. } => "reinstate",
        }
    }

    /// Protocols that stream a full copy need the replication credential.
    pub fn needs_credential(&self) -> bool {
        matches!(self, Self::PlannedSwitchover | Self::Reinstatement { .. })
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One mutating (or final verifying) step of a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "step", rename_all = "kebab-case")]
pub enum Step {
    /// Deregister a node's backend on every edge.
    RemoveFromEdges { node: NodeId },
    /// Register a node's backend on every edge.
    AddToEdges { node: NodeId },
    /// Stop a node's application and database. Best-effort steps only warn.
    StopServices { node: NodeId, best_effort: bool },
    /// Stop a node's database so it cannot accept writes.
    FenceDatabase { node: NodeId },
    Promote { node: NodeId },
    /// Destructive rebuild of `node` from `source`.
    Resync { node: NodeId, source: NodeId },
    /// Point `app`'s application at `target`'s database.
    RedirectApp { app: NodeId, target: NodeId },
    /// Re-probe both nodes and check the single-primary invariant.
    VerifyTopology,
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Self::RemoveFromEdges { .. } => "remove-from-edges",
            Self::AddToEdges { .. } => "add-to-edges",
            Self::StopServices { .. } => "stop-services",
            Self::FenceDatabase { .. } => "fence-database",
            Self::Promote { .. } => "promote",
            Self::Resync { .. } => "resync",
            Self::RedirectApp { .. } => "redirect-app",
            Self::VerifyTopology => "verify-topology",
        }
    }

    /// Destroys data on some node.
    pub fn is_destructive(&self) -> bool {
        matches!(self, Self::Resync { .. })
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RemoveFromEdges { node } => write!(f, "remove {} from all edges", node),
            Self::AddToEdges { node } => write!(f, "add {} to all edges", node),
            Self::StopServices { node, best_effort } => {
                if *best_effort {
                    write!(f, "stop services on {} (best effort)", node)
                } else {
                    write!(f, "stop services on {}", node)
                }
            }
            Self::FenceDatabase { node } => write!(f, "stop database on {}", node),
            Self::Promote { node } => write!(f, "promote {} to Primary", node),
            Self::Resync { node, source } => {
                write!(f, "WIPE {} and resync it as Standby of {}", node, source)
            }
            Self::RedirectApp { app, target } => {
                write!(f, "point {}'s application at {}'s database", app, target)
            }
            Self::VerifyTopology => write!(f, "verify exactly one Primary"),
        }
    }
}

/// The fixed step sequence for `protocol` initiated on `local`.
pub fn plan(protocol: &Protocol, local: &NodeId, peer: &NodeId) -> Vec<Step> {
    match protocol {
        Protocol::EmergencyFailover { .. } => vec![
            Step::RemoveFromEdges { node: peer.clone() },
            Step::StopServices {
                node: peer.clone(),
                best_effort: true,
            },
            Step::Promote {
                node: local.clone(),
            },
            Step::RedirectApp {
                app: local.clone(),
                target: local.clone(),
            },
            Step::VerifyTopology,
        ],
        Protocol::PlannedSwitchover => vec![
            Step::FenceDatabase { node: peer.clone() },
            Step::Promote {
                node: local.clone(),
            },
            Step::Resync {
                node: peer.clone(),
                source: local.clone(),
            },
            Step::RedirectApp {
                app: local.clone(),
                target: local.clone(),
            },
            Step::RedirectApp {
                app: peer.clone(),
                target: local.clone(),
            },
            Step::VerifyTopology,
        ],
        Protocol::Reinstatement { primary } => vec![
            Step::StopServices {
                node: local.clone(),
                best_effort: false,
            },
            Step::Resync {
                node: local.clone(),
                source: primary.clone(),
            },
            Step::RedirectApp {
                app: local.clone(),
                target: primary.clone(),
            },
            Step::AddToEdges {
                node: local.clone(),
            },
            Step::VerifyTopology,
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> NodeId {
        NodeId::parse(s).unwrap()
    }

    #[test]
    fn test_failover_plan_order() {
        let steps = plan(&Protocol::EmergencyFailover { force: false }, &id("idp2"), &id("idp1"));
        let names: Vec<_> = steps.iter().map(Step::name).collect();
        assert_eq!(
            names,
            ["remove-from-edges", "stop-services", "promote", "redirect-app", "verify-topology"]
        );
        assert_eq!(steps[0], Step::RemoveFromEdges { node: id("idp1") });
        assert_eq!(steps[2], Step::Promote { node: id("idp2") });
    }

    #[test]
    fn test_switchover_never_touches_edges() {
        let steps = plan(&Protocol::PlannedSwitchover, &id("idp2"), &id("idp1"));
        assert!(!steps
            .iter()
            .any(|s| matches!(s, Step::AddToEdges { .. } | Step::RemoveFromEdges { .. })));
        // Old primary is fenced before the local promotion.
        assert_eq!(steps[0], Step::FenceDatabase { node: id("idp1") });
        assert_eq!(steps[1], Step::Promote { node: id("idp2") });
        assert_eq!(
            steps[2],
            Step::Resync {
                node: id("idp1"),
                source: id("idp2")
            }
        );
    }

    #[test]
    fn test_reinstatement_plan_targets_named_primary() {
        let steps = plan(
            &Protocol::Reinstatement { primary: id("idp2") },
            &id("idp1"),
            &id("idp2"),
        );
        assert_eq!(
            steps[1],
            Step::Resync {
                node: id("idp1"),
                source: id("idp2")
            }
        );
        assert_eq!(
            steps[2],
            Step::RedirectApp {
                app: id("idp1"),
                target: id("idp2")
            }
        );
        assert_eq!(steps[3], Step::AddToEdges { node: id("idp1") });
    }

    #[test]
    fn test_only_resync_is_destructive() {
        let steps = plan(
            &Protocol::Reinstatement { primary: id("idp2") },
            &id("idp1"),
            &id("idp2"),
        );
        let destructive: Vec<_> = steps.iter().filter(|s| s.is_destructive()).collect();
        assert_eq!(destructive.len(), 1);
        assert!(destructive[0].to_string().starts_with("WIPE idp1"));
    }

    #[test]
    fn test_credential_requirement() {
        assert!(!Protocol::EmergencyFailover { force: true }.needs_credential());
        assert!(Protocol::PlannedSwitchover.needs_credential());
        assert!(Protocol::Reinstatement { primary: id("idp1") }.needs_credential());
    }
}
