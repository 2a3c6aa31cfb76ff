//! Collaborator errors

use thiserror::Error;

use crate::remote::RemoteError;

/// Result type for collaborator calls
pub type RuntimeResult<T> = Result<T, RuntimeError>;

#[derive(Debug, Clone, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// A document or answer could not be understood.
    #[error("malformed {what}: {detail}")]
    Malformed { what: String, detail: String },

    /// The collaborator refused the operation.
    #[error("{0}")]
    Rejected(String),
}

impl RuntimeError {
    pub fn malformed(what: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Malformed {
            what: what.into(),
            detail: detail.into(),
        }
    }

    /// Timeout or transport failure: the target gave no answer.
    pub fn is_no_answer(&self) -> bool {
        matches!(self, Self::Remote(e) if e.is_no_answer())
    }
}
