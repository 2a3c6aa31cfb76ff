//! Service stop helpers
//!
//! A stop first asks whether the container exists. A missing container
//! counts as stopped; stopping an already stopped one is a no-op for the
//! runtime.

use crate::cluster::Node;
use crate::observability::{log_event, Event};
use crate::runtime::{Collaborators, RuntimeResult, Service};

use super::errors::{FailoverError, FailoverResult};

/// What a stop request found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    /// No such container; nothing to stop.
    Absent,
}

pub fn stop_service(
    env: &Collaborators<'_>,
    node: &Node,
    service: Service,
) -> RuntimeResult<StopOutcome> {
    if !env.services.exists(node, service)? {
        return Ok(StopOutcome::Absent);
    }
    env.services.stop(node, service)?;
    Ok(StopOutcome::Stopped)
}

/// Stop the application, then the database.
///
/// Best effort: every failure becomes a warning and the remaining stops
/// are still attempted. Otherwise the first failure is fatal.
pub fn stop_all(
    env: &Collaborators<'_>,
    node: &Node,
    best_effort: bool,
) -> FailoverResult<Vec<String>> {
    let mut warnings = Vec::new();
    for service in [Service::Application, Service::Database] {
        match stop_service(env, node, service) {
            Ok(StopOutcome::Stopped) => {}
            Ok(StopOutcome::Absent) => {
                warnings.push(format!("{} {} not present, treated as stopped", node.id, service))
            }
            Err(e) => {
                let detail = e.to_string();
                log_event(
                    Event::ServiceStopFailed,
                    &[
                        ("error", detail.as_str()),
                        ("node", node.id.as_str()),
                        ("service", service.as_str()),
                    ],
                );
                if !best_effort {
                    return Err(FailoverError::mutation(
                        format!("stop {} on {}", service, node.id),
                        detail,
                    ));
                }
                warnings.push(format!("could not stop {} on {}: {}", service, node.id, detail));
            }
        }
    }
    Ok(warnings)
}

/// Stop only the database so the node stops accepting writes.
pub fn fence_database(env: &Collaborators<'_>, node: &Node) -> FailoverResult<Vec<String>> {
    match stop_service(env, node, Service::Database) {
        Ok(StopOutcome::Stopped) => Ok(Vec::new()),
        Ok(StopOutcome::Absent) => Ok(vec![format!(
            "{} database not present, treated as stopped",
            node.id
        )]),
        Err(e) => Err(FailoverError::mutation(
            format!("stop database on {}", node.id),
            e.to_string(),
        )),
    }
}
