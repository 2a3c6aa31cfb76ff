//! Preflight validation
//!
//! Runs before any mutation. Decision logic is pure: a `PreflightContext`
//! of observed roles goes in, an allow/deny decision comes out. Probing
//! happens separately in `run_preflight`, which threads its results in as
//! a `ClusterTopology`.
//!
//! A denied preflight never leaves partial state.

use crate::cluster::{ClusterTopology, Node, NodeId, ReplicationRole};
use crate::observability::{log_event, Event};
use crate::runtime::{Collaborators, ReplicationCredential};

use super::detector::probe_topology;
use super::errors::{FailoverError, FailoverResult};
use super::protocol::Protocol;

/// Outcome of a preflight decision.
#[derive(Debug, Clone)]
pub enum ValidationResult {
    /// Proceed. Overridden checks are reported as warnings.
    Allowed { warnings: Vec<String> },
    Denied(FailoverError),
}

impl ValidationResult {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }

    pub fn into_result(self) -> FailoverResult<Vec<String>> {
        match self {
            Self::Allowed { warnings } => Ok(warnings),
            Self::Denied(err) => Err(err),
        }
    }
}

/// Everything the pure validator looks at.
pub struct PreflightContext<'a> {
    pub topology: &'a ClusterTopology,
    pub credential_present: bool,
}

/// A passed preflight: what was observed and what was overridden.
#[derive(Debug, Clone)]
pub struct Preflight {
    pub topology: ClusterTopology,
    pub warnings: Vec<String>,
}

/// Checks that need no probe. Run before touching any node.
pub fn check_static(
    protocol: &Protocol,
    local: &NodeId,
    known: &[&NodeId],
    credential_present: bool,
) -> FailoverResult<()> {
    if let Protocol::Reinstatement { primary } = protocol {
        if primary == local {
            return Err(FailoverError::validation(format!(
                "self-reference: {} cannot be reinstated from itself",
                local
            )));
        }
        if !known.contains(&primary) {
            return Err(FailoverError::validation(format!("unknown node: {}", primary)));
        }
    }
    if protocol.needs_credential() && !credential_present {
        return Err(FailoverError::validation(format!(
            "{} needs the replication credential ({} is not set)",
            protocol,
            crate::runtime::PASSWORD_ENV
        )));
    }
    Ok(())
}

/// Decide whether `protocol` may run against the observed topology.
pub fn validate(protocol: &Protocol, ctx: &PreflightContext<'_>) -> ValidationResult {
    if protocol.needs_credential() && !ctx.credential_present {
        return ValidationResult::Denied(FailoverError::validation(
            "replication credential missing",
        ));
    }
    match protocol {
        Protocol::EmergencyFailover { force } => validate_failover(*force, ctx.topology),
        Protocol::PlannedSwitchover => validate_switchover(ctx.topology),
        Protocol::Reinstatement { primary } => validate_reinstatement(primary, ctx.topology),
    }
}

fn validate_failover(force: bool, topology: &ClusterTopology) -> ValidationResult {
    let local = &topology.local;
    let peer = &topology.peer;

    if local.role != ReplicationRole::Standby {
        return ValidationResult::Denied(FailoverError::validation(format!(
            "local node {} is {}, emergency failover must run on the Standby",
            local.node, local.role
        )));
    }

    if peer.role.is_reachable() {
        if !force {
            return ValidationResult::Denied(FailoverError::validation(format!(
                "peer still reachable ({} is {}), use switchover",
                peer.node, peer.role
            )));
        }
        return ValidationResult::Allowed {
            warnings: vec![format!(
                "peer {} is reachable ({}); proceeding because of --force",
                peer.node, peer.role
            )],
        };
    }

    ValidationResult::Allowed {
        warnings: Vec::new(),
    }
}

fn validate_switchover(topology: &ClusterTopology) -> ValidationResult {
    for o in [&topology.local, &topology.peer] {
        if !o.role.is_healthy() {
            return ValidationResult::Denied(FailoverError::validation(format!(
                "{} is {}; switchover needs both nodes healthy",
                o.node, o.role
            )));
        }
    }
    if topology.primary_count() != 1 {
        return ValidationResult::Denied(FailoverError::validation(format!(
            "expected one Primary and one Standby, observed {}",
            topology
        )));
    }
    if topology.local.role != ReplicationRole::Standby {
        return ValidationResult::Denied(FailoverError::validation(format!(
            "switchover must be initiated from the Standby; {} is {}",
            topology.local.node, topology.local.role
        )));
    }
    ValidationResult::Allowed {
        warnings: Vec::new(),
    }
}

fn validate_reinstatement(primary: &NodeId, topology: &ClusterTopology) -> ValidationResult {
    if primary == &topology.local.node {
        return ValidationResult::Denied(FailoverError::validation(format!(
            "self-reference: {} cannot be reinstated from itself",
            primary
        )));
    }
    let role = match topology.role_of(primary) {
        Some(role) => role,
        None => {
            return ValidationResult::Denied(FailoverError::validation(format!(
                "unknown node: {}",
                primary
            )))
        }
    };
    match role {
        ReplicationRole::Primary => ValidationResult::Allowed {
            warnings: Vec::new(),
        },
        ReplicationRole::Unreachable => ValidationResult::Denied(FailoverError::UnreachablePeer {
            node: primary.clone(),
            detail: "reinstatement target did not answer the role probe".to_string(),
        }),
        other => ValidationResult::Denied(FailoverError::validation(format!(
            "reinstatement target {} is {}, not Primary",
            primary, other
        ))),
    }
}

/// Probe both nodes and validate. Read-only.
pub fn run_preflight(
    env: &Collaborators<'_>,
    protocol: &Protocol,
    local: &Node,
    peer: &Node,
    credential: Option<&ReplicationCredential>,
) -> FailoverResult<Preflight> {
    let known = [&local.id, &peer.id];
    let checked = check_static(protocol, &local.id, &known, credential.is_some())
        .and_then(|()| {
            let topology = probe_topology(env, local, peer);
            let ctx = PreflightContext {
                topology: &topology,
                credential_present: credential.is_some(),
            };
            validate(protocol, &ctx)
                .into_result()
                .map(|warnings| Preflight { topology, warnings })
        });

    match checked {
        Ok(preflight) => {
            let observed = preflight.topology.to_string();
            log_event(
                Event::PreflightPassed,
                &[("protocol", protocol.name()), ("topology", observed.as_str())],
            );
            for warning in &preflight.warnings {
                log_event(
                    Event::PreflightOverridden,
                    &[("protocol", protocol.name()), ("warning", warning.as_str())],
                );
            }
            Ok(preflight)
        }
        Err(err) => {
            let reason = err.to_string();
            log_event(
                Event::PreflightFailed,
                &[
                    ("kind", err.kind().as_str()),
                    ("protocol", protocol.name()),
                    ("reason", reason.as_str()),
                ],
            );
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::failover::errors::ErrorKind;
    use ReplicationRole::*;

    fn id(s: &str) -> NodeId {
        NodeId::parse(s).unwrap()
    }

    fn topo(local: ReplicationRole, peer: ReplicationRole) -> ClusterTopology {
        ClusterTopology::new(id("idp2"), local, id("idp1"), peer)
    }

    fn check(protocol: Protocol, local: ReplicationRole, peer: ReplicationRole) -> ValidationResult {
        let topology = topo(local, peer);
        validate(
            &protocol,
            &PreflightContext {
                topology: &topology,
                credential_present: true,
            },
        )
    }

    fn denial(result: ValidationResult) -> FailoverError {
        match result {
            ValidationResult::Denied(err) => err,
            ValidationResult::Allowed { .. } => panic!("expected denial"),
        }
    }

    #[test]
    fn test_failover_refused_while_peer_reachable() {
        let err = denial(check(
            Protocol::EmergencyFailover { force: false },
            Standby,
            Primary,
        ));
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("use switchover"));
    }

    #[test]
    fn test_failover_error_peer_counts_as_reachable() {
        let err = denial(check(Protocol::EmergencyFailover { force: false }, Standby, Error));
        assert!(err.to_string().contains("peer still reachable"));
    }

    #[test]
    fn test_failover_forced_warns() {
        match check(Protocol::EmergencyFailover { force: true }, Standby, Primary) {
            ValidationResult::Allowed { warnings } => {
                assert_eq!(warnings.len(), 1);
                assert!(warnings[0].contains("--force"));
            }
            ValidationResult::Denied(e) => panic!("unexpected denial: {}", e),
        }
    }

    #[test]
    fn test_failover_with_unreachable_peer() {
        match check(Protocol::EmergencyFailover { force: false }, Standby, Unreachable) {
            ValidationResult::Allowed { warnings } => assert!(warnings.is_empty()),
            ValidationResult::Denied(e) => panic!("unexpected denial: {}", e),
        }
    }

    #[test]
    fn test_failover_on_primary_refused_even_when_forced() {
        for force in [false, true] {
            let err = denial(check(Protocol::EmergencyFailover { force }, Primary, Unreachable));
            assert_eq!(err.kind(), ErrorKind::Validation);
        }
    }

    #[test]
    fn test_switchover_rules() {
        assert!(check(Protocol::PlannedSwitchover, Standby, Primary).is_allowed());
        assert!(!check(Protocol::PlannedSwitchover, Primary, Standby).is_allowed());
        assert!(!check(Protocol::PlannedSwitchover, Standby, Standby).is_allowed());
        assert!(!check(Protocol::PlannedSwitchover, Primary, Primary).is_allowed());
        assert!(!check(Protocol::PlannedSwitchover, Standby, Unreachable).is_allowed());
        assert!(!check(Protocol::PlannedSwitchover, Standby, Error).is_allowed());
    }

    #[test]
    fn test_reinstatement_target_must_be_primary() {
        let target = Protocol::Reinstatement { primary: id("idp1") };
        assert!(check(target.clone(), Error, Primary).is_allowed());
        assert!(check(target.clone(), Primary, Primary).is_allowed());

        let err = denial(check(target.clone(), Standby, Unreachable));
        assert_eq!(err.kind(), ErrorKind::UnreachablePeer);

        let err = denial(check(target, Standby, Standby));
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_static_self_reference() {
        let err = check_static(
            &Protocol::Reinstatement { primary: id("idp1") },
            &id("idp1"),
            &[&id("idp1"), &id("idp2")],
            true,
        )
        .unwrap_err();
        assert!(err.to_string().contains("self-reference"));
    }

    #[test]
    fn test_static_unknown_node() {
        let err = check_static(
            &Protocol::Reinstatement { primary: id("idp9") },
            &id("idp1"),
            &[&id("idp1"), &id("idp2")],
            true,
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown node"));
    }

    #[test]
    fn test_static_credential_required() {
        let err = check_static(
            &Protocol::PlannedSwitchover,
            &id("idp2"),
            &[&id("idp1"), &id("idp2")],
            false,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(check_static(
            &Protocol::EmergencyFailover { force: false },
            &id("idp2"),
            &[&id("idp1"), &id("idp2")],
            false,
        )
        .is_ok());
    }
}
