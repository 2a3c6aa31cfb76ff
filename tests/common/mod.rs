//! Shared helpers for protocol tests against the in-memory cluster.

#![allow(dead_code)]

use haswitch::cluster::{NodeId, TopologyHealth};
use haswitch::failover::{self, AssumeYes, Confirm, Protocol, ProtocolRun, RunOptions};
use haswitch::runtime::ReplicationCredential;
use haswitch::sim::SimCluster;

pub const IDP1_URL: &str = "http://idp1.example.org:8080";
pub const IDP2_URL: &str = "http://idp2.example.org:8080";

pub fn id(s: &str) -> NodeId {
    NodeId::parse(s).unwrap()
}

pub fn credential() -> ReplicationCredential {
    ReplicationCredential::new("replicator", "s3cret")
}

/// `idp1` Primary, `idp2` Standby.
pub fn pair() -> SimCluster {
    SimCluster::pair().unwrap()
}

/// Run `protocol` on `local` with `--yes` and a credential.
pub fn run(sim: &SimCluster, local: &str, protocol: Protocol) -> ProtocolRun {
    run_with(sim, local, protocol, &AssumeYes, Some(&credential()), false)
}

pub fn run_with(
    sim: &SimCluster,
    local: &str,
    protocol: Protocol,
    confirm: &dyn Confirm,
    credential: Option<&ReplicationCredential>,
    dry_run: bool,
) -> ProtocolRun {
    let env = sim.collaborators();
    let options = RunOptions {
        credential,
        dry_run,
        confirm,
    };
    failover::run(&env, &protocol, sim.node(local).unwrap(), &options)
}

pub fn failover(force: bool) -> Protocol {
    Protocol::EmergencyFailover { force }
}

pub fn reinstate(primary: &str) -> Protocol {
    Protocol::Reinstatement {
        primary: id(primary),
    }
}

pub fn assert_single_primary(run: &ProtocolRun) {
    let topology = run
        .final_topology
        .as_ref()
        .unwrap_or_else(|| panic!("no final topology:\n{}", run.render_summary()));
    assert_eq!(
        topology.health(),
        TopologyHealth::SinglePrimary,
        "{}",
        run.render_summary()
    );
}

pub fn step_statuses(run: &ProtocolRun) -> Vec<&'static str> {
    run.steps.iter().map(|r| r.status.as_str()).collect()
}
