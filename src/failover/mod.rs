//! Failover, switchover and reinstatement orchestration
//!
//! Components, leaves first:
//! - `detector`: read-only role probes
//! - `preflight`: per-protocol preconditions, run before any mutation
//! - `promotion`, `resync`, `redirect`, `membership`, `services`: the
//!   executors that mutate the cluster
//! - `confirm`: the operator gate
//! - `orchestrator` + `run`: one protocol run and its record
//! - `status`: read-only report
//!
//! One run per process. No internal parallelism, no locking, no retry.
//! Concurrent operators can still break the single-primary invariant;
//! preflight and the final topology check only detect it.

mod confirm;
mod detector;
mod errors;
mod membership;
mod orchestrator;
mod preflight;
mod promotion;
mod protocol;
mod redirect;
mod resync;
mod run;
mod services;
mod status;

pub use confirm::{render_prompt, request as request_confirmation, AssumeYes, Confirm, Confirmed, StdinConfirm};
pub use detector::{classify, detect_role, probe_topology};
pub use errors::{ErrorKind, FailoverError, FailoverResult, ResyncStage};
pub use membership::{EdgeChange, EdgeReport, MembershipAction, MembershipReport};
pub use orchestrator::{run, RunOptions};
pub use preflight::{check_static, run_preflight, validate, Preflight, PreflightContext, ValidationResult};
pub use protocol::{plan, Protocol, Step};
pub use run::{ProtocolRun, RunFailure, RunOutcome, RunState, StepRecord, StepStatus};
pub use status::{collect as collect_status, EdgeStatus, StatusReport};

// Executors, for callers composing their own sequences.
pub use membership::apply as apply_membership;
pub use promotion::promote;
pub use redirect::redirect_app;
pub use resync::{resync, verify_source, VerifiedSource};
pub use services::{stop_all, stop_service, StopOutcome};
