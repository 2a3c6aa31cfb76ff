//! Protocol Property Tests
//!
//! - Successful runs leave exactly one Primary
//! - The wipe never runs unless the source answered as Primary in the
//!   same run
//! - Two switchovers restore the original roles
//! - Refused, declined and dry runs mutate nothing
//! - Mutation failures stop the run and report what completed

mod common;

use std::cell::Cell;

use common::*;
use haswitch::cluster::{ReplicationRole, TopologyHealth};
use haswitch::failover::{collect_status, ErrorKind, Protocol, RunOutcome, StepStatus};

// =============================================================================
// Single Primary
// =============================================================================

#[test]
fn test_successful_runs_leave_one_primary() {
    let sim = pair();
    let runs = [
        run(&sim, "idp2", Protocol::PlannedSwitchover),
        run(&sim, "idp1", Protocol::PlannedSwitchover),
    ];
    sim.set_unreachable("idp1", true);
    let failover = run(&sim, "idp2", failover(false));
    sim.set_unreachable("idp1", false);
    let reinstated = run(&sim, "idp1", reinstate("idp2"));

    for run in runs.iter().chain([&failover, &reinstated]) {
        assert_eq!(run.outcome, Some(RunOutcome::Complete), "{}", run.render_summary());
        assert_single_primary(run);
    }
}

/// A cut-off Primary that comes back after a failover is still writable;
/// status reports the split brain until it is reinstated.
#[test]
fn test_status_flags_returning_primary() {
    let sim = pair();
    sim.set_unreachable("idp1", true);
    assert_eq!(run(&sim, "idp2", failover(false)).exit_code(), 0);
    sim.set_unreachable("idp1", false);

    let env = sim.collaborators();
    let (idp2, idp1) = (sim.node("idp2").unwrap(), sim.node("idp1").unwrap());
    let report = collect_status(&env, idp2, idp1);
    assert_eq!(report.health(), TopologyHealth::SplitBrain);
    assert_eq!(report.exit_code(), 1);
    assert!(report.render().contains("SPLIT BRAIN"));
    assert!(report.drift().iter().any(|d| d.contains(IDP1_URL)));

    assert_eq!(run(&sim, "idp1", reinstate("idp2")).exit_code(), 0);
    let report = collect_status(&env, idp2, idp1);
    assert_eq!(report.health(), TopologyHealth::SinglePrimary);
    assert!(report.drift().is_empty(), "{:?}", report.drift());
}

// =============================================================================
// Wipe Safety
// =============================================================================

/// The Primary disappears between preflight and resync: the node keeps its
/// data and the run fails without a wipe.
#[test]
fn test_no_wipe_without_verified_source() {
    let sim = pair();
    sim.set_unreachable("idp1", true);
    run(&sim, "idp2", failover(false));
    sim.set_unreachable("idp1", false);

    let confirm = |_: &str| {
        sim.set_unreachable("idp2", true);
        true
    };
    let cred = credential();
    let run = run_with(&sim, "idp1", reinstate("idp2"), &confirm, Some(&cred), false);

    assert_eq!(run.exit_code(), 2);
    let failure = run.failure.as_ref().unwrap();
    assert_eq!(failure.kind, ErrorKind::Mutation);
    assert!(failure.message.contains("no data removed"));
    assert!(sim.has_data("idp1"));
    assert!(!sim.mutations().iter().any(|m| m.starts_with("wipe")));
}

#[test]
fn test_stream_failure_is_fatal() {
    let sim = pair();
    sim.fail_stream_into("idp1");

    let run = run(&sim, "idp2", Protocol::PlannedSwitchover);

    assert_eq!(run.outcome, Some(RunOutcome::PartialFailure));
    assert!(run
        .failure
        .as_ref()
        .unwrap()
        .message
        .contains("manual recovery required"));
    assert_eq!(step_statuses(&run), ["done", "done", "failed", "skipped", "skipped", "skipped"]);
    assert!(run.render_summary().contains("last completed step: promote idp2 to Primary"));
}

// =============================================================================
// Round Trip
// =============================================================================

#[test]
fn test_switchover_twice_restores_roles() {
    let sim = pair();
    assert_eq!(run(&sim, "idp2", Protocol::PlannedSwitchover).exit_code(), 0);
    assert_eq!(run(&sim, "idp1", Protocol::PlannedSwitchover).exit_code(), 0);

    assert_eq!(sim.observed_role("idp1"), ReplicationRole::Primary);
    assert_eq!(sim.observed_role("idp2"), ReplicationRole::Standby);
    assert_eq!(sim.follower_of("idp2").as_deref(), Some("idp1"));
    assert_eq!(sim.app_db_host("idp1").as_deref(), Some("idp1.example.org"));
    assert_eq!(sim.app_db_host("idp2").as_deref(), Some("idp1.example.org"));
}

// =============================================================================
// Zero Mutation
// =============================================================================

#[test]
fn test_failover_on_primary_mutates_nothing() {
    for force in [false, true] {
        let sim = pair();
        let run = run(&sim, "idp1", failover(force));
        assert_eq!(run.outcome, Some(RunOutcome::AbortedAtPreflight));
        assert_eq!(run.failure.as_ref().unwrap().kind, ErrorKind::Validation);
        assert!(sim.mutations().is_empty());
    }
}

#[test]
fn test_dry_run_mutates_nothing() {
    let sim = pair();
    let cred = credential();
    let run = run_with(
        &sim,
        "idp2",
        Protocol::PlannedSwitchover,
        &|_: &str| -> bool { panic!("dry run must not ask") },
        Some(&cred),
        true,
    );

    assert_eq!(run.outcome, Some(RunOutcome::DryRun));
    assert_eq!(run.exit_code(), 0);
    assert!(!run.confirmed);
    assert!(run.preflight.is_some());
    assert!(run.steps.iter().all(|r| r.status == StepStatus::Pending));
    assert!(sim.mutations().is_empty());
}

#[test]
fn test_decline_mutates_nothing() {
    let sim = pair();
    let asked = Cell::new(0);
    let cred = credential();
    let confirm = |prompt: &str| {
        asked.set(asked.get() + 1);
        assert!(prompt.contains("WIPE idp1"));
        false
    };
    let run = run_with(&sim, "idp2", Protocol::PlannedSwitchover, &confirm, Some(&cred), false);

    assert_eq!(asked.get(), 1);
    assert_eq!(run.outcome, Some(RunOutcome::Declined));
    assert_eq!(run.exit_code(), 1);
    assert!(sim.mutations().is_empty());
}

// =============================================================================
// Partial Application And Mutation Failures
// =============================================================================

#[test]
fn test_unreachable_edge_is_a_warning() {
    let sim = pair();
    sim.set_unreachable("idp1", true);
    sim.set_edge_unreachable("edge-2", true);

    let run = run(&sim, "idp2", failover(false));

    assert_eq!(run.outcome, Some(RunOutcome::Complete), "{}", run.render_summary());
    assert_eq!(run.steps[0].status, StepStatus::Warned);
    assert!(run
        .warnings
        .iter()
        .any(|w| w.contains("needs manual reconciliation") && w.contains("edge-2")));
    assert_eq!(sim.edge_backends("edge-1"), vec![IDP2_URL]);
    sim.set_edge_unreachable("edge-2", false);
    assert_eq!(sim.edge_backends("edge-2"), vec![IDP1_URL, IDP2_URL]);
}

#[test]
fn test_stalled_promotion_stops_the_run() {
    let sim = pair();
    sim.set_unreachable("idp1", true);
    sim.stall_promotion("idp2");

    let run = run(&sim, "idp2", failover(false));

    assert_eq!(run.exit_code(), 2);
    assert_eq!(step_statuses(&run), ["done", "warned", "failed", "skipped", "skipped"]);
    let failure = run.failure.as_ref().unwrap();
    assert_eq!(failure.step.as_deref(), Some("promote"));
    assert!(failure.message.contains("last observed role: Standby"));
    assert!(!sim.mutations().iter().any(|m| m.starts_with("settings")));
}

#[test]
fn test_application_never_ready() {
    let sim = pair();
    sim.set_unreachable("idp1", true);
    sim.app_never_ready("idp2");

    let run = run(&sim, "idp2", failover(false));

    assert_eq!(run.exit_code(), 2);
    assert_eq!(run.failure.as_ref().unwrap().step.as_deref(), Some("redirect-app"));
    // Promotion already happened and is not rolled back.
    assert_eq!(sim.observed_role("idp2"), ReplicationRole::Primary);
}

#[test]
fn test_run_record_serializes() {
    let sim = pair();
    let run = run(&sim, "idp1", failover(false));
    let json = serde_json::to_value(&run).unwrap();
    assert_eq!(json["outcome"], "aborted_at_preflight");
    assert_eq!(json["failure"]["kind"], "validation");
    assert_eq!(json["local"], "idp1");
    assert!(!json.to_string().contains("s3cret"));
}
