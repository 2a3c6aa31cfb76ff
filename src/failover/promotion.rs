//! Promotion executor
//!
//! Flips a Standby to Primary and waits until the new role is observed.
//! A promotion that does not complete within the configured wait is
//! fatal and is not retried.

use std::thread;

use crate::cluster::{Node, ReplicationRole};
use crate::observability::{log_event, Event};
use crate::runtime::Collaborators;

use super::detector::{detect_role, poll_role};
use super::errors::{FailoverError, FailoverResult};

/// Promote `node`. Valid only when it is currently observed as Standby.
pub fn promote(env: &Collaborators<'_>, node: &Node) -> FailoverResult<()> {
    let current = detect_role(env, node);
    if current != ReplicationRole::Standby {
        return Err(FailoverError::PromotionFailed {
            node: node.id.clone(),
            last_observed: current,
            detail: "only a Standby can be promoted".to_string(),
        });
    }

    env.db
        .promote(node)
        .map_err(|e| FailoverError::PromotionFailed {
            node: node.id.clone(),
            last_observed: current,
            detail: e.to_string(),
        })?;
    log_event(Event::PromotionIssued, &[("node", node.id.as_str())]);

    let (interval, polls) = env.config.timing.promote_polls();
    let mut last_observed = current;
    for _ in 0..polls {
        thread::sleep(interval);
        last_observed = poll_role(env, node);
        if last_observed == ReplicationRole::Primary {
            return Ok(());
        }
    }

    Err(FailoverError::PromotionFailed {
        node: node.id.clone(),
        last_observed,
        detail: format!("not observed as Primary after {} polls", polls),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimCluster;

    #[test]
    fn test_promote_standby() {
        let sim = SimCluster::pair().unwrap();
        promote(&sim.collaborators(), sim.node("idp2").unwrap()).unwrap();
        assert_eq!(sim.observed_role("idp2"), ReplicationRole::Primary);
        assert_eq!(sim.mutations(), vec!["promote idp2".to_string()]);
    }

    #[test]
    fn test_promote_refuses_primary() {
        let sim = SimCluster::pair().unwrap();
        let err = promote(&sim.collaborators(), sim.node("idp1").unwrap()).unwrap_err();
        assert!(matches!(
            err,
            FailoverError::PromotionFailed {
                last_observed: ReplicationRole::Primary,
                ..
            }
        ));
        assert!(sim.mutations().is_empty());
    }

    #[test]
    fn test_stalled_promotion_times_out() {
        let sim = SimCluster::pair().unwrap();
        sim.stall_promotion("idp2");
        let err = promote(&sim.collaborators(), sim.node("idp2").unwrap()).unwrap_err();
        match err {
            FailoverError::PromotionFailed {
                last_observed,
                detail,
                ..
            } => {
                assert_eq!(last_observed, ReplicationRole::Standby);
                assert!(detail.contains("after 3 polls"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }
}
