//! Operator confirmation gate
//!
//! Destructive protocols need an explicit, contemporaneous "yes". The
//! gate is the only place a `Confirmed` proof is created, so anything
//! that takes one can only run after an operator agreed in this run.

use std::io::{self, BufRead, Write};

use crate::observability::{log_event, Event};

use super::protocol::{Protocol, Step};

/// Ask an operator to approve a plan.
pub trait Confirm {
    /// Show `prompt` and return whether the operator approved.
    fn confirm(&self, prompt: &str) -> bool;
}

impl<F> Confirm for F
where
    F: Fn(&str) -> bool,
{
    fn confirm(&self, prompt: &str) -> bool {
        self(prompt)
    }
}

/// Interactive confirmation on the controlling terminal. The prompt goes
/// to stderr; only an exact `yes` approves.
pub struct StdinConfirm;

impl Confirm for StdinConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        let mut stderr = io::stderr();
        if write!(stderr, "{}\nType 'yes' to continue: ", prompt).is_err() {
            return false;
        }
        let _ = stderr.flush();

        let mut answer = String::new();
        match io::stdin().lock().read_line(&mut answer) {
            Ok(_) => answer.trim() == "yes",
            Err(_) => false,
        }
    }
}

/// Non-interactive approval (`--yes`).
pub struct AssumeYes;

impl Confirm for AssumeYes {
    fn confirm(&self, _prompt: &str) -> bool {
        true
    }
}

/// Proof that an operator approved the current run.
#[derive(Debug)]
pub struct Confirmed {
    _private: (),
}

/// Build the prompt for `protocol`'s plan.
pub fn render_prompt(protocol: &Protocol, steps: &[Step]) -> String {
    let mut prompt = format!("About to run {}:\n", protocol);
    for (i, step) in steps.iter().enumerate() {
        prompt.push_str(&format!("  {}. {}\n", i + 1, step));
    }
    if steps.iter().any(Step::is_destructive) {
        prompt.push_str("This plan DESTROYS the data directory of a node and cannot be undone.\n");
    }
    prompt.push_str("There is no automatic rollback.");
    prompt
}

/// Ask `confirm` to approve the plan. `None` means the operator declined.
pub fn request(confirm: &dyn Confirm, protocol: &Protocol, steps: &[Step]) -> Option<Confirmed> {
    let prompt = render_prompt(protocol, steps);
    if confirm.confirm(&prompt) {
        log_event(Event::ConfirmationGranted, &[("protocol", protocol.name())]);
        Some(Confirmed { _private: () })
    } else {
        log_event(Event::ConfirmationDeclined, &[("protocol", protocol.name())]);
        None
    }
}

#[cfg(test)]
pub(crate) fn test_token() -> Confirmed {
    Confirmed { _private: () }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::NodeId;
    use crate::failover::protocol::plan;
    use std::cell::RefCell;

    #[test]
    fn test_decline_yields_no_token() {
        let steps = plan(
            &Protocol::PlannedSwitchover,
            &NodeId::parse("idp2").unwrap(),
            &NodeId::parse("idp1").unwrap(),
        );
        assert!(request(&|_: &str| false, &Protocol::PlannedSwitchover, &steps).is_none());
        assert!(request(&AssumeYes, &Protocol::PlannedSwitchover, &steps).is_some());
    }

    #[test]
    fn test_prompt_lists_steps_and_warns_on_wipe() {
        let seen = RefCell::new(String::new());
        let recorder = |p: &str| {
            *seen.borrow_mut() = p.to_string();
            true
        };
        let steps = plan(
            &Protocol::Reinstatement {
                primary: NodeId::parse("idp2").unwrap(),
            },
            &NodeId::parse("idp1").unwrap(),
            &NodeId::parse("idp2").unwrap(),
        );
        request(
            &recorder,
            &Protocol::Reinstatement {
                primary: NodeId::parse("idp2").unwrap(),
            },
            &steps,
        );
        let prompt = seen.borrow();
        assert!(prompt.contains("1. stop services on idp1"));
        assert!(prompt.contains("DESTROYS"));
    }

    #[test]
    fn test_failover_prompt_has_no_wipe_warning() {
        let steps = plan(
            &Protocol::EmergencyFailover { force: false },
            &NodeId::parse("idp2").unwrap(),
            &NodeId::parse("idp1").unwrap(),
        );
        let prompt = render_prompt(&Protocol::EmergencyFailover { force: false }, &steps);
        assert!(!prompt.contains("DESTROYS"));
        assert!(prompt.ends_with("no automatic rollback."));
    }
}
