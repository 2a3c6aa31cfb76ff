//! Protocol run record and its state machine
//!
//! States are explicit; every transition is a consuming method that
//! rejects out-of-order use:
//!
//! ```text
//! Init ─┬─> PreflightPassed ─┬─> Confirmed ─> Executing ─┬─> Complete
//!       │                    ├─> DryRun                   └─> Failed
//!       └─> Aborted          └─> Declined
//! ```
//!
//! After `Confirmed` there is no rollback. A failed run reports which
//! steps completed and which were skipped. Runs are never persisted.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::cluster::{ClusterTopology, NodeId};

use super::errors::{ErrorKind, FailoverError, FailoverResult};
use super::protocol::{Protocol, Step};

// =============================================================================
// STATE MACHINE
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Init,
    PreflightPassed,
    Confirmed,
    /// Running the step at this index.
    Executing { step: usize },
    Complete,
    Failed,
    /// Preflight denied; nothing mutated.
    Aborted,
    /// Operator declined; nothing mutated.
    Declined,
    /// Plan shown; nothing mutated.
    DryRun,
}

impl RunState {
    pub fn state_name(&self) -> &'static str {
        match self {
            Self::Init => "Init",
            Self::PreflightPassed => "PreflightPassed",
            Self::Confirmed => "Confirmed",
            Self::Executing { .. } => "Executing",
            Self::Complete => "Complete",
            Self::Failed => "Failed",
            Self::Aborted => "Aborted",
            Self::Declined => "Declined",
            Self::DryRun => "DryRun",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Complete | Self::Failed | Self::Aborted | Self::Declined | Self::DryRun
        )
    }

    /// Init → PreflightPassed
    pub fn pass_preflight(self) -> FailoverResult<Self> {
        match self {
            Self::Init => Ok(Self::PreflightPassed),
            _ => Err(FailoverError::forbidden_transition(
                self.state_name(),
                "PreflightPassed",
            )),
        }
    }

    /// Init → Aborted
    pub fn abort(self) -> FailoverResult<Self> {
        match self {
            Self::Init => Ok(Self::Aborted),
            _ => Err(FailoverError::forbidden_transition(self.state_name(), "Aborted")),
        }
    }

    /// PreflightPassed → DryRun
    pub fn finish_dry_run(self) -> FailoverResult<Self> {
        match self {
            Self::PreflightPassed => Ok(Self::DryRun),
            _ => Err(FailoverError::forbidden_transition(self.state_name(), "DryRun")),
        }
    }

    /// PreflightPassed → Confirmed
    pub fn confirm(self) -> FailoverResult<Self> {
        match self {
            Self::PreflightPassed => Ok(Self::Confirmed),
            _ => Err(FailoverError::forbidden_transition(self.state_name(), "Confirmed")),
        }
    }

    /// PreflightPassed → Declined
    pub fn decline(self) -> FailoverResult<Self> {
        match self {
            Self::PreflightPassed => Ok(Self::Declined),
            _ => Err(FailoverError::forbidden_transition(self.state_name(), "Declined")),
        }
    }

    /// Confirmed → Executing(0), Executing(n) → Executing(n + 1)
    pub fn begin_step(self, index: usize) -> FailoverResult<Self> {
        match self {
            Self::Confirmed if index == 0 => Ok(Self::Executing { step: 0 }),
            Self::Executing { step } if index == step + 1 => Ok(Self::Executing { step: index }),
            _ => Err(FailoverError::forbidden_transition(
                self.state_name(),
                "Executing",
            )),
        }
    }

    /// Executing(last) → Complete
    pub fn complete(self, step_count: usize) -> FailoverResult<Self> {
        match self {
            Self::Executing { step } if step + 1 == step_count => Ok(Self::Complete),
            Self::Confirmed if step_count == 0 => Ok(Self::Complete),
            _ => Err(FailoverError::forbidden_transition(self.state_name(), "Complete")),
        }
    }

    /// Executing → Failed
    pub fn fail(self) -> FailoverResult<Self> {
        match self {
            Self::Executing { .. } => Ok(Self::Failed),
            _ => Err(FailoverError::forbidden_transition(self.state_name(), "Failed")),
        }
    }
}

// =============================================================================
// RUN RECORD
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Done,
    Warned,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Done => "done",
            Self::Warned => "warned",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub step: Step,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Complete,
    DryRun,
    AbortedAtPreflight,
    Declined,
    PartialFailure,
}

impl RunOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::DryRun => "dry_run",
            Self::AbortedAtPreflight => "aborted_at_preflight",
            Self::Declined => "declined",
            Self::PartialFailure => "partial_failure",
        }
    }

    /// 0 success, 1 nothing mutated, 2 partial state.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Complete | Self::DryRun => 0,
            Self::AbortedAtPreflight | Self::Declined => 1,
            Self::PartialFailure => 2,
        }
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunFailure {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
}

/// Ephemeral record of one protocol invocation.
#[derive(Debug, Clone, Serialize)]
pub struct ProtocolRun {
    pub id: Uuid,
    pub protocol: &'static str,
    pub local: NodeId,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    state: RunState,
    pub confirmed: bool,
    pub preflight: Option<ClusterTopology>,
    pub final_topology: Option<ClusterTopology>,
    pub steps: Vec<StepRecord>,
    pub warnings: Vec<String>,
    pub failure: Option<RunFailure>,
    pub outcome: Option<RunOutcome>,
}

impl ProtocolRun {
    pub fn new(protocol: &Protocol, local: NodeId, plan: Vec<Step>) -> Self {
        Self {
            id: Uuid::new_v4(),
            protocol: protocol.name(),
            local,
            started_at: Utc::now(),
            finished_at: None,
            state: RunState::Init,
            confirmed: false,
            preflight: None,
            final_topology: None,
            steps: plan
                .into_iter()
                .map(|step| StepRecord {
                    step,
                    status: StepStatus::Pending,
                    details: Vec::new(),
                })
                .collect(),
            warnings: Vec::new(),
            failure: None,
            outcome: None,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Exit code for the process; a run that never finished counts as a
    /// mutation failure.
    pub fn exit_code(&self) -> i32 {
        self.outcome
            .map(|o| o.exit_code())
            .unwrap_or_else(|| RunOutcome::PartialFailure.exit_code())
    }

    pub fn completed_steps(&self) -> impl Iterator<Item = &StepRecord> {
        self.steps
            .iter()
            .filter(|r| matches!(r.status, StepStatus::Done | StepStatus::Warned))
    }

    // =========================================================================
    // TRANSITIONS
    // =========================================================================

    pub fn pass_preflight(
        &mut self,
        topology: ClusterTopology,
        warnings: Vec<String>,
    ) -> FailoverResult<()> {
        self.state = self.state.pass_preflight()?;
        self.preflight = Some(topology);
        self.warnings.extend(warnings);
        Ok(())
    }

    pub fn abort(&mut self, err: &FailoverError) -> FailoverResult<()> {
        self.state = self.state.abort()?;
        self.record_failure(err, None);
        self.finish(RunOutcome::AbortedAtPreflight);
        Ok(())
    }

    pub fn finish_dry_run(&mut self) -> FailoverResult<()> {
        self.state = self.state.finish_dry_run()?;
        self.finish(RunOutcome::DryRun);
        Ok(())
    }

    pub fn confirm(&mut self) -> FailoverResult<()> {
        self.state = self.state.confirm()?;
        self.confirmed = true;
        Ok(())
    }

    pub fn decline(&mut self) -> FailoverResult<()> {
        self.state = self.state.decline()?;
        self.finish(RunOutcome::Declined);
        Ok(())
    }

    pub fn begin_step(&mut self, index: usize) -> FailoverResult<&Step> {
        self.state = self.state.begin_step(index)?;
        self.steps
            .get(index)
            .map(|r| &r.step)
            .ok_or_else(|| FailoverError::forbidden_transition("Executing", "Executing"))
    }

    /// Mark the running step done, or warned when `warnings` is non-empty.
    pub fn complete_step(&mut self, index: usize, warnings: Vec<String>) {
        if let Some(record) = self.steps.get_mut(index) {
            record.status = if warnings.is_empty() {
                StepStatus::Done
            } else {
                StepStatus::Warned
            };
            self.warnings.extend(warnings.iter().cloned());
            record.details = warnings;
        }
    }

    /// Mark the running step failed and every later step skipped.
    pub fn fail_step(&mut self, index: usize, err: &FailoverError) -> FailoverResult<()> {
        self.state = self.state.fail()?;
        let step_name = self.steps.get(index).map(|r| r.step.name().to_string());
        for (i, record) in self.steps.iter_mut().enumerate() {
            if i == index {
                record.status = StepStatus::Failed;
                record.details.push(err.to_string());
            } else if i > index {
                record.status = StepStatus::Skipped;
            }
        }
        self.record_failure(err, step_name);
        self.finish(RunOutcome::PartialFailure);
        Ok(())
    }

    pub fn complete(&mut self) -> FailoverResult<()> {
        self.state = self.state.complete(self.steps.len())?;
        self.finish(RunOutcome::Complete);
        Ok(())
    }

    /// Terminate a run whose own bookkeeping broke. Counts as a failure
    /// with partial state when anything may have been mutated.
    pub fn force_fail(&mut self, err: &FailoverError) {
        let outcome = if self.confirmed {
            RunOutcome::PartialFailure
        } else {
            RunOutcome::AbortedAtPreflight
        };
        self.state = if self.confirmed {
            RunState::Failed
        } else {
            RunState::Aborted
        };
        self.record_failure(err, None);
        self.finish(outcome);
    }

    fn record_failure(&mut self, err: &FailoverError, step: Option<String>) {
        self.failure = Some(RunFailure {
            kind: err.kind(),
            message: err.to_string(),
            step,
        });
    }

    fn finish(&mut self, outcome: RunOutcome) {
        self.outcome = Some(outcome);
        self.finished_at = Some(Utc::now());
    }

    // =========================================================================
    // SUMMARY
    // =========================================================================

    /// Human-readable step-by-step summary.
    pub fn render_summary(&self) -> String {
        let mut out = String::new();
        let outcome = self.outcome.map(|o| o.as_str()).unwrap_or("unfinished");
        out.push_str(&format!(
            "{} on {}: {} (run {})\n",
            self.protocol, self.local, outcome, self.id
        ));
        if let Some(topology) = &self.preflight {
            out.push_str(&format!("  observed: {}\n", topology));
        }
        for (i, record) in self.steps.iter().enumerate() {
            out.push_str(&format!(
                "  [{:>7}] {}. {}\n",
                record.status.as_str(),
                i + 1,
                record.step
            ));
            for detail in &record.details {
                out.push_str(&format!("            {}\n", detail));
            }
        }
        if let Some(topology) = &self.final_topology {
            out.push_str(&format!("  final: {}\n", topology));
        }
        for warning in &self.warnings {
            out.push_str(&format!("  warning: {}\n", warning));
        }
        if let Some(failure) = &self.failure {
            out.push_str(&format!("  error [{}]: {}\n", failure.kind, failure.message));
            if self.outcome == Some(RunOutcome::PartialFailure) {
                let last = self
                    .completed_steps()
                    .last()
                    .map(|r| r.step.to_string())
                    .unwrap_or_else(|| "none".to_string());
                out.push_str(&format!(
                    "  last completed step: {}; manual recovery required\n",
                    last
                ));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::ReplicationRole;
    use crate::failover::protocol::plan;

    fn id(s: &str) -> NodeId {
        NodeId::parse(s).unwrap()
    }

    fn new_run() -> ProtocolRun {
        let protocol = Protocol::EmergencyFailover { force: false };
        ProtocolRun::new(&protocol, id("idp2"), plan(&protocol, &id("idp2"), &id("idp1")))
    }

    fn topology() -> ClusterTopology {
        ClusterTopology::new(
            id("idp2"),
            ReplicationRole::Standby,
            id("idp1"),
            ReplicationRole::Unreachable,
        )
    }

    // =========================================================================
    // STATE MACHINE TESTS
    // =========================================================================

    #[test]
    fn test_happy_path_transitions() {
        let state = RunState::Init
            .pass_preflight()
            .and_then(RunState::confirm)
            .and_then(|s| s.begin_step(0))
            .and_then(|s| s.begin_step(1))
            .and_then(|s| s.complete(2))
            .unwrap();
        assert_eq!(state, RunState::Complete);
        assert!(state.is_terminal());
    }

    #[test]
    fn test_cannot_execute_without_confirmation() {
        let state = RunState::Init.pass_preflight().unwrap();
        let err = state.begin_step(0).unwrap_err();
        assert!(matches!(
            err,
            FailoverError::ForbiddenTransition {
                from: "PreflightPassed",
                to: "Executing"
            }
        ));
    }

    #[test]
    fn test_cannot_skip_steps() {
        let state = RunState::Confirmed.begin_step(0).unwrap();
        assert!(state.begin_step(2).is_err());
        assert!(RunState::Confirmed.begin_step(1).is_err());
    }

    #[test]
    fn test_cannot_confirm_before_preflight() {
        assert!(RunState::Init.confirm().is_err());
        assert!(RunState::Aborted.pass_preflight().is_err());
    }

    #[test]
    fn test_complete_requires_last_step() {
        let state = RunState::Confirmed.begin_step(0).unwrap();
        assert!(state.complete(3).is_err());
    }

    // =========================================================================
    // RUN RECORD TESTS
    // =========================================================================

    #[test]
    fn test_abort_has_exit_code_one() {
        let mut run = new_run();
        run.abort(&FailoverError::validation("peer still reachable, use switchover"))
            .unwrap();
        assert_eq!(run.outcome, Some(RunOutcome::AbortedAtPreflight));
        assert_eq!(run.exit_code(), 1);
        assert!(run.steps.iter().all(|r| r.status == StepStatus::Pending));
    }

    #[test]
    fn test_failed_step_skips_rest() {
        let mut run = new_run();
        run.pass_preflight(topology(), Vec::new()).unwrap();
        run.confirm().unwrap();
        run.begin_step(0).unwrap();
        run.complete_step(0, vec!["edge-2: timed out".into()]);
        run.begin_step(1).unwrap();
        run.complete_step(1, Vec::new());
        run.begin_step(2).unwrap();
        run.fail_step(2, &FailoverError::mutation("promote", "timeout"))
            .unwrap();

        let statuses: Vec<_> = run.steps.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            [
                StepStatus::Warned,
                StepStatus::Done,
                StepStatus::Failed,
                StepStatus::Skipped,
                StepStatus::Skipped
            ]
        );
        assert_eq!(run.exit_code(), 2);
        assert_eq!(run.warnings, vec!["edge-2: timed out".to_string()]);

        let summary = run.render_summary();
        assert!(summary.contains("partial_failure"));
        assert!(summary.contains("last completed step: stop services on idp1 (best effort)"));
    }

    #[test]
    fn test_summary_serializes_without_state() {
        let mut run = new_run();
        run.pass_preflight(topology(), Vec::new()).unwrap();
        run.finish_dry_run().unwrap();
        let json = serde_json::to_value(&run).unwrap();
        assert_eq!(json["outcome"], "dry_run");
        assert_eq!(json["protocol"], "emergency-failover");
        assert_eq!(json["steps"][0]["step"]["step"], "remove-from-edges");
        assert!(json.get("state").is_none());
    }
}
