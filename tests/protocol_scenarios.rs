//! Protocol Scenario Tests
//!
//! End-to-end runs of the three protocols against the in-memory pair:
//! - A: failover refused while the peer answers
//! - B: failover with an unreachable peer
//! - C: planned switchover
//! - D: reinstatement of a failed-over node
//! - E: reinstatement naming the local node

mod common;

use common::*;
use haswitch::cluster::ReplicationRole;
use haswitch::failover::{ErrorKind, Protocol, RunOutcome, StepStatus};
use haswitch::runtime::Service;

// =============================================================================
// Emergency Failover
// =============================================================================

/// Scenario A: peer still Primary and reachable, no --force.
#[test]
fn test_failover_refused_while_peer_reachable() {
    let sim = pair();
    let run = run(&sim, "idp2", failover(false));

    assert_eq!(run.outcome, Some(RunOutcome::AbortedAtPreflight));
    assert_eq!(run.exit_code(), 1);
    let failure = run.failure.as_ref().unwrap();
    assert_eq!(failure.kind, ErrorKind::Validation);
    assert!(failure.message.contains("use switchover"));
    assert!(sim.mutations().is_empty());
    assert!(run.steps.iter().all(|r| r.status == StepStatus::Pending));
}

/// Scenario B: peer unreachable, failover completes.
#[test]
fn test_failover_with_unreachable_peer() {
    let sim = pair();
    sim.set_unreachable("idp1", true);

    let run = run(&sim, "idp2", failover(false));

    assert_eq!(run.outcome, Some(RunOutcome::Complete), "{}", run.render_summary());
    assert_eq!(run.exit_code(), 0);
    assert_eq!(sim.observed_role("idp2"), ReplicationRole::Primary);
    assert_eq!(sim.edge_backends("edge-1"), vec![IDP2_URL]);
    assert_eq!(sim.edge_backends("edge-2"), vec![IDP2_URL]);
    assert_eq!(sim.app_db_host("idp2").as_deref(), Some("idp2.example.org"));
    assert_single_primary(&run);

    // Stopping the unreachable peer is best effort.
    assert_eq!(
        step_statuses(&run),
        ["done", "warned", "done", "done", "done"]
    );
}

/// Reachable peer with --force: proceeds with a warning and stops the peer.
#[test]
fn test_forced_failover_stops_peer() {
    let sim = pair();
    sim.crash_database("idp1");

    let run = run(&sim, "idp2", failover(true));

    assert_eq!(run.outcome, Some(RunOutcome::Complete), "{}", run.render_summary());
    assert!(run.warnings.iter().any(|w| w.contains("--force")));
    assert!(!sim.database_running("idp1"));
    assert_eq!(sim.observed_role("idp2"), ReplicationRole::Primary);
    assert_single_primary(&run);
}

/// A crashed database on a reachable host still blocks unforced failover.
#[test]
fn test_failover_refused_when_peer_host_answers() {
    let sim = pair();
    sim.crash_database("idp1");

    let run = run(&sim, "idp2", failover(false));

    assert_eq!(run.exit_code(), 1);
    assert!(sim.mutations().is_empty());
}

// =============================================================================
// Planned Switchover
// =============================================================================

/// Scenario C: roles swap, both applications follow, edges untouched.
#[test]
fn test_planned_switchover() {
    let sim = pair();

    let run = run(&sim, "idp2", Protocol::PlannedSwitchover);

    assert_eq!(run.outcome, Some(RunOutcome::Complete), "{}", run.render_summary());
    assert_eq!(sim.observed_role("idp2"), ReplicationRole::Primary);
    assert_eq!(sim.observed_role("idp1"), ReplicationRole::Standby);
    assert_eq!(sim.follower_of("idp1").as_deref(), Some("idp2"));
    assert_eq!(sim.app_db_host("idp1").as_deref(), Some("idp2.example.org"));
    assert_eq!(sim.app_db_host("idp2").as_deref(), Some("idp2.example.org"));
    assert!(!sim.mutations().iter().any(|m| m.starts_with("edge")));
    assert_eq!(sim.edge_backends("edge-1"), vec![IDP1_URL, IDP2_URL]);
    assert_single_primary(&run);

    // The old Primary was wiped before the copy streamed in.
    let mutations = sim.mutations();
    let wipe = mutations.iter().position(|m| m == "wipe idp1");
    let stream = mutations.iter().position(|m| m == "stream idp1 <- idp2");
    assert!(wipe.is_some() && wipe < stream, "{:?}", mutations);
}

/// The old Primary is stopped before the Standby is promoted.
#[test]
fn test_switchover_fences_before_promotion() {
    let sim = pair();
    run(&sim, "idp2", Protocol::PlannedSwitchover);

    let mutations = sim.mutations();
    let fence = mutations.iter().position(|m| m == "stop idp1 database");
    let promote = mutations.iter().position(|m| m == "promote idp2");
    assert!(fence.is_some() && fence < promote, "{:?}", mutations);
}

#[test]
fn test_switchover_refused_from_primary() {
    let sim = pair();
    let run = run(&sim, "idp1", Protocol::PlannedSwitchover);
    assert_eq!(run.exit_code(), 1);
    assert!(run
        .failure
        .as_ref()
        .unwrap()
        .message
        .contains("initiated from the Standby"));
    assert!(sim.mutations().is_empty());
}

#[test]
fn test_switchover_refused_without_credential() {
    let sim = pair();
    let run = run_with(
        &sim,
        "idp2",
        Protocol::PlannedSwitchover,
        &haswitch::failover::AssumeYes,
        None,
        false,
    );
    assert_eq!(run.outcome, Some(RunOutcome::AbortedAtPreflight));
    assert!(sim.mutations().is_empty());
}

// =============================================================================
// Reinstatement
// =============================================================================

/// Scenario D: after a failover with the old Primary cut off, the old
/// Primary comes back still writable and is rebuilt as Standby.
#[test]
fn test_reinstatement_after_failover() {
    let sim = pair();
    sim.set_unreachable("idp1", true);
    let first = run(&sim, "idp2", failover(false));
    assert_eq!(first.exit_code(), 0, "{}", first.render_summary());
    sim.set_unreachable("idp1", false);

    let run = run(&sim, "idp1", reinstate("idp2"));

    assert_eq!(run.outcome, Some(RunOutcome::Complete), "{}", run.render_summary());
    assert_eq!(sim.observed_role("idp1"), ReplicationRole::Standby);
    assert_eq!(sim.observed_role("idp2"), ReplicationRole::Primary);
    assert_eq!(sim.follower_of("idp1").as_deref(), Some("idp2"));
    assert_eq!(sim.app_db_host("idp1").as_deref(), Some("idp2.example.org"));
    for edge in ["edge-1", "edge-2"] {
        let backends = sim.edge_backends(edge);
        assert!(backends.contains(&IDP1_URL.to_string()), "{}: {:?}", edge, backends);
        assert!(backends.contains(&IDP2_URL.to_string()), "{}: {:?}", edge, backends);
    }
    assert_single_primary(&run);
}

/// Scenario E: the named Primary is the local node.
#[test]
fn test_reinstatement_self_reference() {
    let sim = pair();
    let run = run(&sim, "idp1", reinstate("idp1"));

    assert_eq!(run.outcome, Some(RunOutcome::AbortedAtPreflight));
    assert_eq!(run.exit_code(), 1);
    assert!(run.failure.as_ref().unwrap().message.contains("self-reference"));
    assert!(run.preflight.is_none());
    assert!(sim.mutations().is_empty());
}

#[test]
fn test_reinstatement_unknown_node() {
    let sim = pair();
    let run = run(&sim, "idp2", reinstate("idp7"));
    assert_eq!(run.exit_code(), 1);
    assert!(run.failure.as_ref().unwrap().message.contains("unknown node"));
    assert!(sim.mutations().is_empty());
}

#[test]
fn test_reinstatement_target_unreachable() {
    let sim = pair();
    sim.set_unreachable("idp1", true);
    let run = run(&sim, "idp2", reinstate("idp1"));
    assert_eq!(run.exit_code(), 1);
    assert_eq!(run.failure.as_ref().unwrap().kind, ErrorKind::UnreachablePeer);
    assert!(sim.mutations().is_empty());
}

#[test]
fn test_reinstatement_target_must_be_primary() {
    let sim = pair();
    let run = run(&sim, "idp1", reinstate("idp2"));
    assert_eq!(run.exit_code(), 1);
    assert_eq!(run.failure.as_ref().unwrap().kind, ErrorKind::Validation);
    assert!(sim.mutations().is_empty());
}

/// A missing application container counts as stopped.
#[test]
fn test_reinstatement_tolerates_missing_container() {
    let sim = pair();
    sim.set_unreachable("idp1", true);
    run(&sim, "idp2", failover(false));
    sim.set_unreachable("idp1", false);
    sim.remove_container("idp1", Service::Application);

    let run = run(&sim, "idp1", reinstate("idp2"));

    // The stop succeeds; the redirect cannot restart a missing container.
    assert_eq!(run.steps[0].status, StepStatus::Warned);
    assert!(run.steps[0].details[0].contains("not present"));
    assert_eq!(run.exit_code(), 2);
    assert_eq!(run.failure.as_ref().unwrap().step.as_deref(), Some("redirect-app"));
}
