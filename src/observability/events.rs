//! Observable events
//!
//! Every log line the orchestrators emit names one of these events.
//! Events are explicit and typed; each carries its own severity.

use std::fmt;

use super::logger::Severity;

/// Observable events in a protocol run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Lifecycle
    /// Configuration file loaded and validated
    ConfigLoaded,
    /// Protocol run created
    RunStart,
    /// Run reached Complete
    RunComplete,
    /// Run ended after a mutation failed
    RunFailed,
    /// The result could not be written to stdout
    OutputFailed,

    // Preflight
    /// A node's role was probed
    RoleProbed,
    /// A role poll inside a bounded wait
    RolePoll,
    /// All preconditions hold
    PreflightPassed,
    /// A precondition failed; nothing was mutated
    PreflightFailed,
    /// A precondition was overridden by the operator
    PreflightOverridden,
    /// Dry run finished after printing the plan
    DryRunComplete,

    // Confirmation
    /// Operator accepted the plan
    ConfirmationGranted,
    /// Operator refused the plan
    ConfirmationDeclined,

    // Steps
    /// A mutating step begins
    StepBegin,
    /// A mutating step finished
    StepComplete,
    /// A step finished with a non-fatal problem
    StepWarned,
    /// A step failed; the run stops here
    StepFailed,

    // Components
    /// Promotion was issued to the database
    PromotionIssued,
    /// Destructive wipe of a node's data directory
    DataWiped,
    /// Full copy streaming started
    StreamBegin,
    /// Full copy streaming finished
    StreamComplete,
    /// Application settings rewritten and restarted
    AppRedirected,
    /// Edge backend list rewritten
    EdgeUpdated,
    /// Edge could not be updated; membership may have drifted
    EdgeUpdateFailed,
    /// Best-effort service stop failed
    ServiceStopFailed,

    // Topology
    /// Topology re-probed and consistent
    TopologyVerified,
    /// Two Primaries observed
    SplitBrainDetected,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::RunStart => "RUN_START",
            Event::RunComplete => "RUN_COMPLETE",
            Event::RunFailed => "RUN_FAILED",
            Event::OutputFailed => "OUTPUT_FAILED",

            Event::RoleProbed => "ROLE_PROBED",
            Event::RolePoll => "ROLE_POLL",
            Event::PreflightPassed => "PREFLIGHT_PASSED",
            Event::PreflightFailed => "PREFLIGHT_FAILED",
            Event::PreflightOverridden => "PREFLIGHT_OVERRIDDEN",
            Event::DryRunComplete => "DRY_RUN_COMPLETE",

            Event::ConfirmationGranted => "CONFIRMATION_GRANTED",
            Event::ConfirmationDeclined => "CONFIRMATION_DECLINED",

            Event::StepBegin => "STEP_BEGIN",
            Event::StepComplete => "STEP_COMPLETE",
            Event::StepWarned => "STEP_WARNED",
            Event::StepFailed => "STEP_FAILED",

            Event::PromotionIssued => "PROMOTION_ISSUED",
            Event::DataWiped => "DATA_WIPED",
            Event::StreamBegin => "STREAM_BEGIN",
            Event::StreamComplete => "STREAM_COMPLETE",
            Event::AppRedirected => "APP_REDIRECTED",
            Event::EdgeUpdated => "EDGE_UPDATED",
            Event::EdgeUpdateFailed => "EDGE_UPDATE_FAILED",
            Event::ServiceStopFailed => "SERVICE_STOP_FAILED",

            Event::TopologyVerified => "TOPOLOGY_VERIFIED",
            Event::SplitBrainDetected => "SPLIT_BRAIN_DETECTED",
        }
    }

    /// Severity this event is logged at
    pub fn severity(&self) -> Severity {
        match self {
            Event::RolePoll => Severity::Trace,
            Event::PreflightOverridden
            | Event::ConfirmationDeclined
            | Event::StepWarned
            | Event::EdgeUpdateFailed
            | Event::ServiceStopFailed => Severity::Warn,
            Event::PreflightFailed
            | Event::StepFailed
            | Event::RunFailed
            | Event::OutputFailed => Severity::Error,
            Event::SplitBrainDetected => Severity::Fatal,
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
