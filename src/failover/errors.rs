//! Failover error taxonomy
//!
//! - Validation: a precondition is unmet. Nothing was mutated.
//! - UnreachablePeer: a node the protocol needs did not answer.
//! - Mutation: a mutating step failed. No automatic retry, no rollback.
//! - PartialApplication: some edges were not updated. Not fatal.
//!
//! Mutation errors carry what was observed so an operator can resume by
//! hand.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::cluster::{NodeId, ReplicationRole};

/// Result type for failover operations
pub type FailoverResult<T> = Result<T, FailoverError>;

/// Error classification driving exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    UnreachablePeer,
    Mutation,
    PartialApplication,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "VALIDATION",
            Self::UnreachablePeer => "UNREACHABLE_PEER",
            Self::Mutation => "MUTATION_FAILURE",
            Self::PartialApplication => "PARTIAL_APPLICATION",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stage of a resynchronization, for failure reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResyncStage {
    StopService,
    VerifySource,
    AllowReplication,
    Wipe,
    Stream,
    ConfigureFollower,
    StartService,
}

impl ResyncStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StopService => "stop-service",
            Self::VerifySource => "verify-source",
            Self::AllowReplication => "allow-replication",
            Self::Wipe => "wipe",
            Self::Stream => "stream",
            Self::ConfigureFollower => "configure-follower",
            Self::StartService => "start-service",
        }
    }

    /// Stages at or after the wipe leave the node without usable data.
    pub fn loses_data(&self) -> bool {
        matches!(self, Self::Wipe | Self::Stream | Self::ConfigureFollower)
    }
}

impl fmt::Display for ResyncStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error)]
pub enum FailoverError {
    #[error("{0}")]
    Validation(String),

    #[error("{node} did not answer: {detail}")]
    UnreachablePeer { node: NodeId, detail: String },

    #[error("promotion of {node} failed: {detail} (last observed role: {last_observed})")]
    PromotionFailed {
        node: NodeId,
        last_observed: ReplicationRole,
        detail: String,
    },

    #[error("resync source {primary} is {observed}; aborted before wipe, no data removed")]
    SourceUnavailable {
        primary: NodeId,
        observed: ReplicationRole,
    },

    #[error("resync of {node} failed at {stage}: {detail}{}", data_note(.stage))]
    ResyncFailed {
        node: NodeId,
        stage: ResyncStage,
        detail: String,
    },

    #[error("redirect of {node}'s application failed: {detail}")]
    RedirectFailed { node: NodeId, detail: String },

    #[error("{operation} failed: {detail}")]
    Mutation { operation: String, detail: String },

    #[error("edge membership needs manual reconciliation: {0}")]
    PartialApplication(String),

    #[error("forbidden run transition: {from} -> {to}")]
    ForbiddenTransition { from: &'static str, to: &'static str },
}

fn data_note(stage: &ResyncStage) -> &'static str {
    if stage.loses_data() {
        "; node has no usable data, manual recovery required"
    } else {
        ""
    }
}

impl FailoverError {
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation(reason.into())
    }

    pub fn mutation(operation: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Mutation {
            operation: operation.into(),
            detail: detail.into(),
        }
    }

    pub fn forbidden_transition(from: &'static str, to: &'static str) -> Self {
        Self::ForbiddenTransition { from, to }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::UnreachablePeer { .. } => ErrorKind::UnreachablePeer,
            Self::PartialApplication(_) => ErrorKind::PartialApplication,
            Self::PromotionFailed { .. }
            | Self::SourceUnavailable { .. }
            | Self::ResyncFailed { .. }
            | Self::RedirectFailed { .. }
            | Self::Mutation { .. }
            | Self::ForbiddenTransition { .. } => ErrorKind::Mutation,
        }
    }
}
