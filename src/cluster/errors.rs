//! Cluster configuration errors

use std::path::PathBuf;

use thiserror::Error;

/// Result type for configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while loading or resolving the node table
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config JSON: {0}")]
    Parse(String),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("invalid node id '{0}': expected lowercase letters, digits and '-'")]
    InvalidNodeId(String),

    #[error("unknown node '{0}'")]
    UnknownNode(String),

    #[error("local node not set: pass --node or set local_node in the config")]
    NoLocalNode,
}

impl ConfigError {
    /// Stable code for CLI output
    pub fn code(&self) -> &'static str {
        match self {
            ConfigError::Read { .. } => "HASWITCH_CONFIG_READ",
            ConfigError::Parse(_) => "HASWITCH_CONFIG_PARSE",
            ConfigError::Invalid(_) => "HASWITCH_CONFIG_INVALID",
            ConfigError::InvalidNodeId(_) => "HASWITCH_CONFIG_NODE_ID",
            ConfigError::UnknownNode(_) => "HASWITCH_CONFIG_UNKNOWN_NODE",
            ConfigError::NoLocalNode => "HASWITCH_CONFIG_NO_LOCAL_NODE",
        }
    }
}
