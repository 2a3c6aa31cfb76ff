//! Resynchronization executor
//!
//! Destructively rebuilds a node as Standby of a source Primary:
//!
//! 1. stop the node's database
//! 2. verify the source answers as Primary
//! 3. admit the node in the source's replication allowlist
//! 4. wipe the node's data directory
//! 5. stream a full physical copy from the source
//! 6. configure the node as follower of the source
//! 7. start the database and wait for it to report Standby
//!
//! The wipe takes a `VerifiedSource`, which only step 2 produces, and
//! the whole sequence takes a `Confirmed` from the confirmation gate.
//! Failures from step 4 on leave the node without usable data. A node
//! that starts but is not observed as Standby is only warned about.

use std::thread;

use crate::cluster::{Node, NodeId, ReplicationRole};
use crate::observability::{log_event, Event};
use crate::runtime::{Collaborators, ReplicationCredential, Service};

use super::confirm::Confirmed;
use super::detector::{detect_role, poll_role};
use super::errors::{FailoverError, FailoverResult, ResyncStage};
use super::services::{stop_service, StopOutcome};

/// Proof that a resync source answered as Primary in this run.
#[derive(Debug)]
pub struct VerifiedSource {
    node: NodeId,
}

impl VerifiedSource {
    pub fn node(&self) -> &NodeId {
        &self.node
    }
}

/// Probe `source`; it must answer as Primary.
pub fn verify_source(env: &Collaborators<'_>, source: &Node) -> FailoverResult<VerifiedSource> {
    match detect_role(env, source) {
        ReplicationRole::Primary => Ok(VerifiedSource {
            node: source.id.clone(),
        }),
        observed => Err(FailoverError::SourceUnavailable {
            primary: source.id.clone(),
            observed,
        }),
    }
}

/// Remove `node`'s data. Callable only with a fresh source proof.
pub fn wipe(env: &Collaborators<'_>, node: &Node, source: &VerifiedSource) -> FailoverResult<()> {
    env.db
        .wipe_data(node)
        .map_err(|e| failed(node, ResyncStage::Wipe, e))?;
    log_event(
        Event::DataWiped,
        &[("node", node.id.as_str()), ("source", source.node().as_str())],
    );
    Ok(())
}

/// Rebuild `node` as Standby of `source`. Returns warnings.
pub fn resync(
    env: &Collaborators<'_>,
    node: &Node,
    source: &Node,
    credential: &ReplicationCredential,
    _confirmed: &Confirmed,
) -> FailoverResult<Vec<String>> {
    let mut warnings = Vec::new();

    match stop_service(env, node, Service::Database) {
        Ok(StopOutcome::Stopped) => {}
        Ok(StopOutcome::Absent) => warnings.push(format!(
            "{} database not present, treated as stopped",
            node.id
        )),
        Err(e) => return Err(failed(node, ResyncStage::StopService, e)),
    }

    let verified = verify_source(env, source)?;

    env.db
        .allow_replication(source, node)
        .map_err(|e| failed(node, ResyncStage::AllowReplication, e))?;

    wipe(env, node, &verified)?;

    log_event(
        Event::StreamBegin,
        &[("node", node.id.as_str()), ("source", source.id.as_str())],
    );
    env.db
        .stream_full_copy(node, source, credential)
        .map_err(|e| failed(node, ResyncStage::Stream, e))?;
    log_event(
        Event::StreamComplete,
        &[("node", node.id.as_str()), ("source", source.id.as_str())],
    );

    env.db
        .configure_follower(node, source, credential)
        .map_err(|e| failed(node, ResyncStage::ConfigureFollower, e))?;

    env.services
        .start(node, Service::Database)
        .map_err(|e| failed(node, ResyncStage::StartService, e))?;

    let (interval, polls) = env.config.timing.standby_polls();
    let mut observed = ReplicationRole::Error;
    for _ in 0..polls {
        thread::sleep(interval);
        observed = poll_role(env, node);
        if observed == ReplicationRole::Standby {
            return Ok(warnings);
        }
    }
    warnings.push(format!(
        "{} started but was observed as {} instead of Standby; check replication by hand",
        node.id, observed
    ));
    Ok(warnings)
}

fn failed(node: &Node, stage: ResyncStage, err: impl ToString) -> FailoverError {
    FailoverError::ResyncFailed {
        node: node.id.clone(),
        stage,
        detail: err.to_string(),
    }
}
