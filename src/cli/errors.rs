//! CLI-specific error types
//!
//! Every CLI error happens before any mutation and exits with status 1.

use std::fmt;
use std::io;

use crate::cluster::ConfigError;
use crate::remote::RemoteError;

/// CLI error codes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliErrorCode {
    /// Configuration file error
    ConfigError,
    /// Bad node id on the command line
    InvalidNode,
    /// Remote execution could not be set up
    ExecutorError,
    /// I/O error (stdout)
    IoError,
}

impl CliErrorCode {
    /// Get the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError => "HASWITCH_CLI_CONFIG_ERROR",
            Self::InvalidNode => "HASWITCH_CLI_INVALID_NODE",
            Self::ExecutorError => "HASWITCH_CLI_EXECUTOR_ERROR",
            Self::IoError => "HASWITCH_CLI_IO_ERROR",
        }
    }
}

/// CLI error
#[derive(Debug)]
pub struct CliError {
    code: CliErrorCode,
    message: String,
}

impl CliError {
    /// Create a new CLI error
    pub fn new(code: CliErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Config error
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::ConfigError, msg)
    }

    /// Invalid node id
    pub fn invalid_node(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::InvalidNode, msg)
    }

    /// I/O error
    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::IoError, msg)
    }

    /// Get the error code
    pub fn code(&self) -> &CliErrorCode {
        &self.code
    }

    /// Get the error code string
    pub fn code_str(&self) -> &'static str {
        self.code.code()
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Process exit status. Nothing was mutated.
    pub fn exit_code(&self) -> i32 {
        1
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for CliError {}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        match e {
            ConfigError::InvalidNodeId(_) | ConfigError::UnknownNode(_) => {
                Self::invalid_node(e.to_string())
            }
            other => Self::new(
                CliErrorCode::ConfigError,
                format!("{} ({})", other, other.code()),
            ),
        }
    }
}

impl From<RemoteError> for CliError {
    fn from(e: RemoteError) -> Self {
        Self::new(CliErrorCode::ExecutorError, e.to_string())
    }
}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        Self::io_error(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::io_error(format!("JSON error: {}", e))
    }
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_code() {
        let err = CliError::config_error("missing nodes");
        assert_eq!(err.to_string(), "HASWITCH_CLI_CONFIG_ERROR: missing nodes");
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_unknown_node_maps_to_invalid_node() {
        let err = CliError::from(ConfigError::UnknownNode("idp9".into()));
        assert_eq!(err.code(), &CliErrorCode::InvalidNode);
    }
}
