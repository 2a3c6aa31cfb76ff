//! Remote execution errors

use std::time::Duration;

use thiserror::Error;

/// Result type for remote execution
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Failure of one remote call.
#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    /// The transport could not reach the host.
    #[error("host {host} unreachable: {detail}")]
    Unreachable { host: String, detail: String },

    /// The call did not finish within its bound. The child was killed.
    #[error("{program} on {host} timed out after {after:?}")]
    Timeout {
        host: String,
        program: String,
        after: Duration,
    },

    /// The local process could not be started.
    #[error("failed to spawn command for {host}: {detail}")]
    Spawn { host: String, detail: String },

    /// The command ran and exited non-zero.
    #[error("{program} on {host} exited with status {status}: {stderr}")]
    Failed {
        host: String,
        program: String,
        status: i32,
        stderr: String,
    },
}

impl RemoteError {
    /// Timeouts and transport failures mean "no answer".
    pub fn is_no_answer(&self) -> bool {
        matches!(self, Self::Unreachable { .. } | Self::Timeout { .. })
    }
}
