//! Node identity and endpoints

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::errors::ConfigError;

fn node_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-z0-9][a-z0-9-]{0,62}$").expect("static pattern"))
}

/// Short node identifier, e.g. `idp1`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeId(String);

impl NodeId {
    /// Validate and wrap a node id.
    pub fn parse(raw: impl Into<String>) -> Result<Self, ConfigError> {
        let raw = raw.into();
        if node_id_pattern().is_match(&raw) {
            Ok(Self(raw))
        } else {
            Err(ConfigError::InvalidNodeId(raw))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for NodeId {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<NodeId> for String {
    fn from(id: NodeId) -> Self {
        id.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One member of the pair.
///
/// The database endpoint is `fqdn:db_port`; the application endpoint is
/// `app_url`, which is also the backend URL registered on the edges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub id: NodeId,
    pub fqdn: String,
    pub peer: NodeId,
    pub db_port: u16,
    pub app_url: String,
    /// Address or CIDR admitted in the replication allowlist of the
    /// primary when this node follows it.
    pub replication_address: String,
}

impl Node {
    /// Host other nodes use to reach this node's database.
    pub fn db_host(&self) -> &str {
        &self.fqdn
    }

    /// URL registered for this node on the edge proxies.
    pub fn backend_url(&self) -> &str {
        &self.app_url
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id, self.fqdn)
    }
}
