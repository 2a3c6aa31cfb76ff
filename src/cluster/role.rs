//! Replication role as observed by a probe
//!
//! A role is never remembered between runs. Every protocol run probes
//! both nodes and works from what it saw.

use std::fmt;

use serde::Serialize;

/// Role of a node's database, as classified by the last probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplicationRole {
    /// Accepts writes; replication source.
    Primary,

    /// Applies the primary's change log; read-only.
    Standby,

    /// The probe timed out or could not reach the host.
    Unreachable,

    /// The host answered, but not with a recognizable role.
    Error,
}

impl ReplicationRole {
    /// Name used in logs and summaries.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "Primary",
            Self::Standby => "Standby",
            Self::Unreachable => "Unreachable",
            Self::Error => "Error",
        }
    }

    /// The node answered the probe at all.
    pub fn is_reachable(&self) -> bool {
        !matches!(self, Self::Unreachable)
    }

    /// The node answered with a real role.
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Primary | Self::Standby)
    }
}

impl fmt::Display for ReplicationRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reachability() {
        assert!(ReplicationRole::Primary.is_reachable());
        assert!(ReplicationRole::Standby.is_reachable());
        assert!(ReplicationRole::Error.is_reachable());
        assert!(!ReplicationRole::Unreachable.is_reachable());
    }

    #[test]
    fn test_health() {
        assert!(ReplicationRole::Primary.is_healthy());
        assert!(ReplicationRole::Standby.is_healthy());
        assert!(!ReplicationRole::Error.is_healthy());
        assert!(!ReplicationRole::Unreachable.is_healthy());
    }
}
