//! Load balancer membership
//!
//! Adds or removes a node's backend URL on every edge instance
//! independently. One failed edge is logged and skipped; membership can
//! then diverge across edges until reconciled by hand.

use std::fmt;

use crate::cluster::{EdgeInstance, Node};
use crate::observability::{log_event, Event};
use crate::runtime::{Collaborators, EdgeDocument, RuntimeResult};

use super::errors::FailoverError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipAction {
    Add,
    Remove,
}

impl MembershipAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Remove => "remove",
        }
    }
}

/// What happened on one edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeChange {
    Updated,
    /// Already had the desired membership; not rewritten.
    Unchanged,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeReport {
    pub edge: String,
    pub change: EdgeChange,
}

/// Per-edge results of one fan-out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipReport {
    pub edges: Vec<EdgeReport>,
}

impl MembershipReport {
    pub fn failed(&self) -> impl Iterator<Item = &EdgeReport> {
        self.edges
            .iter()
            .filter(|r| matches!(r.change, EdgeChange::Failed(_)))
    }

    pub fn is_complete(&self) -> bool {
        self.failed().next().is_none()
    }

    /// The reconciliation warning, if any edge failed.
    pub fn partial_failure(&self) -> Option<FailoverError> {
        if self.is_complete() {
            return None;
        }
        let failed: Vec<String> = self.failed().map(ToString::to_string).collect();
        Some(FailoverError::PartialApplication(failed.join("; ")))
    }
}

impl fmt::Display for EdgeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.change {
            EdgeChange::Updated => write!(f, "{}: updated", self.edge),
            EdgeChange::Unchanged => write!(f, "{}: unchanged", self.edge),
            EdgeChange::Failed(detail) => write!(f, "{}: {}", self.edge, detail),
        }
    }
}

/// Apply `action` for `node`'s backend on every configured edge.
pub fn apply(env: &Collaborators<'_>, action: MembershipAction, node: &Node) -> MembershipReport {
    let url = node.backend_url();
    let edges = env
        .config
        .edges
        .iter()
        .map(|edge| {
            let change = match apply_one(env, edge, action, url) {
                Ok(true) => {
                    log_event(
                        Event::EdgeUpdated,
                        &[
                            ("action", action.as_str()),
                            ("backend", url),
                            ("edge", edge.id.as_str()),
                        ],
                    );
                    EdgeChange::Updated
                }
                Ok(false) => EdgeChange::Unchanged,
                Err(e) => {
                    let detail = e.to_string();
                    log_event(
                        Event::EdgeUpdateFailed,
                        &[
                            ("action", action.as_str()),
                            ("backend", url),
                            ("edge", edge.id.as_str()),
                            ("error", detail.as_str()),
                        ],
                    );
                    EdgeChange::Failed(detail)
                }
            };
            EdgeReport {
                edge: edge.id.clone(),
                change,
            }
        })
        .collect();
    MembershipReport { edges }
}

fn apply_one(
    env: &Collaborators<'_>,
    edge: &EdgeInstance,
    action: MembershipAction,
    url: &str,
) -> RuntimeResult<bool> {
    let text = env.edges.load(edge)?;
    let mut doc = EdgeDocument::parse(&text, &env.config.edge_backends_pointer)?;
    let changed = match action {
        MembershipAction::Add => doc.add(url)?,
        MembershipAction::Remove => doc.remove(url)?,
    };
    if changed {
        env.edges.store(edge, &doc.render())?;
    }
    Ok(changed)
}

/// Registered backends on every edge. Read-only.
pub fn read_all(env: &Collaborators<'_>) -> Vec<(String, RuntimeResult<Vec<String>>)> {
    env.config
        .edges
        .iter()
        .map(|edge| {
            let backends = env.edges.load(edge).and_then(|text| {
                EdgeDocument::parse(&text, &env.config.edge_backends_pointer).map(|d| d.backends())
            });
            (edge.id.clone(), backends)
        })
        .collect()
}
