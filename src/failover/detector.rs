//! Node role detection
//!
//! Read-only. One bounded probe per call, no caching:
//! - `t` → Standby, `f` → Primary
//! - timeout or transport failure → Unreachable
//! - anything else (failed command, unexpected output) → Error

use crate::cluster::{ClusterTopology, Node, ReplicationRole};
use crate::observability::{log_event, Event};
use crate::runtime::{Collaborators, RuntimeResult};

/// Classify a raw probe answer.
pub fn classify(answer: &RuntimeResult<String>) -> ReplicationRole {
    match answer {
        Ok(text) => match text.trim() {
            "t" => ReplicationRole::Standby,
            "f" => ReplicationRole::Primary,
            _ => ReplicationRole::Error,
        },
        Err(e) if e.is_no_answer() => ReplicationRole::Unreachable,
        Err(_) => ReplicationRole::Error,
    }
}

/// Probe one node's role.
pub fn detect_role(env: &Collaborators<'_>, node: &Node) -> ReplicationRole {
    detect_role_with(env, node, Event::RoleProbed)
}

/// Probe inside a polling loop; logged at trace level.
pub(crate) fn poll_role(env: &Collaborators<'_>, node: &Node) -> ReplicationRole {
    detect_role_with(env, node, Event::RolePoll)
}

fn detect_role_with(env: &Collaborators<'_>, node: &Node, event: Event) -> ReplicationRole {
    let answer = env.db.query_role(node);
    let role = classify(&answer);
    let detail = match &answer {
        Ok(text) => text.trim().to_string(),
        Err(e) => e.to_string(),
    };
    log_event(
        event,
        &[
            ("node", node.id.as_str()),
            ("role", role.as_str()),
            ("answer", detail.as_str()),
        ],
    );
    role
}

/// Probe both members of the pair, local first.
pub fn probe_topology(env: &Collaborators<'_>, local: &Node, peer: &Node) -> ClusterTopology {
    let local_role = detect_role(env, local);
    let peer_role = detect_role(env, peer);
    ClusterTopology::new(local.id.clone(), local_role, peer.id.clone(), peer_role)
}
