//! Application redirector
//!
//! Rewrites the application's database target, restarts it and polls
//! readiness. Always rewrites and restarts, even when the target did not
//! change.

use std::thread;

use crate::cluster::Node;
use crate::observability::{log_event, Event};
use crate::runtime::{Collaborators, KeyValueDocument, Service, Style};

use super::errors::{FailoverError, FailoverResult};

/// Point `app`'s application at `target`'s database.
pub fn redirect_app(env: &Collaborators<'_>, app: &Node, target: &Node) -> FailoverResult<()> {
    let settings = &env.config.application;
    let fail = |detail: String| FailoverError::RedirectFailed {
        node: app.id.clone(),
        detail,
    };

    let text = env
        .apps
        .read_settings(app)
        .map_err(|e| fail(format!("read settings: {}", e)))?;
    let mut doc = KeyValueDocument::parse(&text, Style::Env);
    doc.set(&settings.db_host_key, target.db_host());
    if let Some(port_key) = &settings.db_port_key {
        doc.set(port_key, &target.db_port.to_string());
    }
    env.apps
        .write_settings(app, &doc.render())
        .map_err(|e| fail(format!("write settings: {}", e)))?;

    env.services
        .restart(app, Service::Application)
        .map_err(|e| fail(format!("restart: {}", e)))?;

    let attempts = env.config.timing.ready_max_attempts.max(1);
    let interval = env.config.timing.ready_poll_interval();
    let mut last = String::from("not ready");
    for attempt in 0..attempts {
        if attempt > 0 {
            thread::sleep(interval);
        }
        match env.apps.probe_ready(app) {
            Ok(true) => {
                log_event(
                    Event::AppRedirected,
                    &[("node", app.id.as_str()), ("target", target.db_host())],
                );
                return Ok(());
            }
            Ok(false) => last = "not ready".to_string(),
            Err(e) => last = e.to_string(),
        }
    }

    Err(fail(format!(
        "readiness not reached after {} attempts ({})",
        attempts, last
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimCluster;

    #[test]
    fn test_redirect_rewrites_and_restarts() {
        let sim = SimCluster::pair().unwrap();
        let env = sim.collaborators();
        redirect_app(&env, sim.node("idp2").unwrap(), sim.node("idp2").unwrap()).unwrap();
        assert_eq!(sim.app_db_host("idp2").as_deref(), Some("idp2.example.org"));
        let settings = sim.app_settings("idp2");
        assert!(settings.starts_with("# identity service\nKC_DB=postgres\n"));
        assert!(settings.contains("KC_DB_URL_PORT=5432"));
        assert_eq!(
            sim.mutations(),
            vec!["settings idp2".to_string(), "restart idp2 application".to_string()]
        );
    }

    #[test]
    fn test_unchanged_target_still_restarts() {
        let sim = SimCluster::pair().unwrap();
        redirect_app(
            &sim.collaborators(),
            sim.node("idp1").unwrap(),
            sim.node("idp1").unwrap(),
        )
        .unwrap();
        assert!(sim
            .mutations()
            .contains(&"restart idp1 application".to_string()));
    }

    #[test]
    fn test_readiness_exhaustion_fails() {
        let sim = SimCluster::pair().unwrap();
        sim.app_never_ready("idp2");
        let err = redirect_app(
            &sim.collaborators(),
            sim.node("idp2").unwrap(),
            sim.node("idp1").unwrap(),
        )
        .unwrap_err();
        assert!(matches!(err, FailoverError::RedirectFailed { .. }));
        assert!(err.to_string().contains("after 3 attempts"));
    }
}
