//! Protocol orchestrator
//!
//! Drives one protocol run: preflight, confirmation, then the fixed step
//! plan in order. Purely coordinating; every mutation is delegated to the
//! executors. Stops at the first failed step and never retries or rolls
//! back.

use crate::cluster::{Node, NodeId, TopologyHealth};
use crate::observability::{log_event, Event};
use crate::runtime::{Collaborators, ReplicationCredential};

use super::confirm::{self, Confirm, Confirmed};
use super::detector::probe_topology;
use super::errors::{FailoverError, FailoverResult};
use super::membership::{self, MembershipAction};
use super::preflight::run_preflight;
use super::promotion::promote;
use super::protocol::{plan, Protocol, Step};
use super::redirect::redirect_app;
use super::resync::resync;
use super::run::ProtocolRun;
use super::services::{fence_database, stop_all};

/// Per-invocation options.
pub struct RunOptions<'a> {
    pub credential: Option<&'a ReplicationCredential>,
    pub dry_run: bool,
    pub confirm: &'a dyn Confirm,
}

/// What a successful step produced.
#[derive(Debug, Default)]
struct StepOutcome {
    warnings: Vec<String>,
}

/// Run `protocol` initiated on `local`. Always returns the run record;
/// its outcome carries success or failure.
pub fn run(
    env: &Collaborators<'_>,
    protocol: &Protocol,
    local: &Node,
    options: &RunOptions<'_>,
) -> ProtocolRun {
    let mut record = match env.config.peer_of(&local.id) {
        Ok(peer) => ProtocolRun::new(protocol, local.id.clone(), plan(protocol, &local.id, &peer.id)),
        Err(e) => {
            let mut record = ProtocolRun::new(protocol, local.id.clone(), Vec::new());
            let err = FailoverError::validation(e.to_string());
            if record.abort(&err).is_err() {
                record.force_fail(&err);
            }
            return record;
        }
    };

    let run_id = record.id.to_string();
    log_event(
        Event::RunStart,
        &[
            ("local", local.id.as_str()),
            ("protocol", protocol.name()),
            ("run_id", run_id.as_str()),
        ],
    );

    if let Err(err) = drive(env, protocol, local, options, &mut record) {
        record.force_fail(&err);
    }

    let outcome = record.outcome.map(|o| o.as_str()).unwrap_or("unfinished");
    let event = if record.exit_code() == 2 {
        Event::RunFailed
    } else {
        Event::RunComplete
    };
    log_event(
        event,
        &[
            ("outcome", outcome),
            ("protocol", protocol.name()),
            ("run_id", run_id.as_str()),
        ],
    );
    record
}

/// Err only when the run's own state machine is misused.
fn drive(
    env: &Collaborators<'_>,
    protocol: &Protocol,
    local: &Node,
    options: &RunOptions<'_>,
    record: &mut ProtocolRun,
) -> FailoverResult<()> {
    let peer = env
        .config
        .peer_of(&local.id)
        .map_err(|e| FailoverError::validation(e.to_string()))?;

    let preflight = match run_preflight(env, protocol, local, peer, options.credential) {
        Ok(preflight) => preflight,
        Err(err) => return record.abort(&err),
    };
    record.pass_preflight(preflight.topology, preflight.warnings)?;

    let steps: Vec<Step> = record.steps.iter().map(|r| r.step.clone()).collect();

    if options.dry_run {
        log_event(Event::DryRunComplete, &[("protocol", protocol.name())]);
        return record.finish_dry_run();
    }

    let confirmed = match confirm::request(options.confirm, protocol, &steps) {
        Some(token) => token,
        None => return record.decline(),
    };
    record.confirm()?;

    for (index, step) in steps.iter().enumerate() {
        record.begin_step(index)?;
        let position = (index + 1).to_string();
        log_event(
            Event::StepBegin,
            &[("position", position.as_str()), ("step", step.name())],
        );
        let result = execute_step(env, step, local, peer, options, &confirmed, record);
        match result {
            Ok(outcome) => {
                if outcome.warnings.is_empty() {
                    log_event(Event::StepComplete, &[("step", step.name())]);
                } else {
                    for warning in &outcome.warnings {
                        log_event(
                            Event::StepWarned,
                            &[("step", step.name()), ("warning", warning.as_str())],
                        );
                    }
                }
                record.complete_step(index, outcome.warnings);
            }
            Err(err) => {
                let reason = err.to_string();
                log_event(
                    Event::StepFailed,
                    &[
                        ("error", reason.as_str()),
                        ("kind", err.kind().as_str()),
                        ("step", step.name()),
                    ],
                );
                return record.fail_step(index, &err);
            }
        }
    }

    record.complete()
}

fn execute_step(
    env: &Collaborators<'_>,
    step: &Step,
    local: &Node,
    peer: &Node,
    options: &RunOptions<'_>,
    confirmed: &Confirmed,
    record: &mut ProtocolRun,
) -> FailoverResult<StepOutcome> {
    let node = |id: &NodeId| lookup(env, step, id);

    match step {
        Step::RemoveFromEdges { node: id } => {
            Ok(membership_step(env, MembershipAction::Remove, node(id)?))
        }
        Step::AddToEdges { node: id } => Ok(membership_step(env, MembershipAction::Add, node(id)?)),
        Step::StopServices { node: id, best_effort } => Ok(StepOutcome {
            warnings: stop_all(env, node(id)?, *best_effort)?,
        }),
        Step::FenceDatabase { node: id } => Ok(StepOutcome {
            warnings: fence_database(env, node(id)?)?,
        }),
        Step::Promote { node: id } => {
            promote(env, node(id)?)?;
            Ok(StepOutcome::default())
        }
        Step::Resync { node: id, source } => {
            let credential = options.credential.ok_or_else(|| {
                FailoverError::mutation(step.name(), "replication credential missing")
            })?;
            Ok(StepOutcome {
                warnings: resync(env, node(id)?, node(source)?, credential, confirmed)?,
            })
        }
        Step::RedirectApp { app, target } => {
            redirect_app(env, node(app)?, node(target)?)?;
            Ok(StepOutcome::default())
        }
        Step::VerifyTopology => {
            let topology = probe_topology(env, local, peer);
            let health = topology.health();
            let observed = topology.to_string();
            record.final_topology = Some(topology);
            match health {
                TopologyHealth::SinglePrimary => {
                    log_event(Event::TopologyVerified, &[("topology", observed.as_str())]);
                    Ok(StepOutcome::default())
                }
                TopologyHealth::SplitBrain => {
                    log_event(Event::SplitBrainDetected, &[("topology", observed.as_str())]);
                    Err(FailoverError::mutation(
                        "verify topology",
                        format!("two Primaries observed: {}", observed),
                    ))
                }
                TopologyHealth::NoPrimary => Err(FailoverError::mutation(
                    "verify topology",
                    format!("no Primary observed: {}", observed),
                )),
            }
        }
    }
}

fn lookup<'c>(env: &Collaborators<'c>, step: &Step, id: &NodeId) -> FailoverResult<&'c Node> {
    env.config
        .node(id)
        .map_err(|e| FailoverError::mutation(step.name(), e.to_string()))
}

fn membership_step(env: &Collaborators<'_>, action: MembershipAction, node: &Node) -> StepOutcome {
    let report = membership::apply(env, action, node);
    StepOutcome {
        warnings: report
            .partial_failure()
            .map(|w| vec![w.to_string()])
            .unwrap_or_default(),
    }
}
