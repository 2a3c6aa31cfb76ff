//! Cluster configuration
//!
//! One JSON file describes the pair, the edge proxies and how to reach
//! the services on each host. It is loaded once per invocation and passed
//! by reference.
//!
//! Example:
//!
//! ```json
//! {
//!   "local_node": "idp1",
//!   "nodes": {
//!     "idp1": { "fqdn": "idp1.example.org", "peer": "idp2", "app_url": "http://idp1.example.org:8080" },
//!     "idp2": { "fqdn": "idp2.example.org", "peer": "idp1", "app_url": "http://idp2.example.org:8080" }
//!   },
//!   "edges": [ { "id": "edge-1", "host": "edge1.example.org", "config_path": "/etc/edge/dynamic/idp.json" } ]
//! }
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use super::errors::{ConfigError, ConfigResult};
use super::node::{Node, NodeId};

/// One node entry as written in the file.
#[derive(Debug, Clone, Deserialize)]
struct NodeEntry {
    fqdn: String,
    peer: NodeId,
    #[serde(default = "default_db_port")]
    db_port: u16,
    app_url: String,
    #[serde(default)]
    replication_address: Option<String>,
}

/// One edge proxy instance.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EdgeInstance {
    pub id: String,
    pub host: String,
    /// Path of the proxy's dynamic config document on `host`.
    pub config_path: String,
}

/// Container names, identical on both nodes.
#[derive(Debug, Clone, Deserialize)]
pub struct ContainerNames {
    #[serde(default = "default_db_container")]
    pub database: String,
    #[serde(default = "default_app_container")]
    pub application: String,
}

impl Default for ContainerNames {
    fn default() -> Self {
        Self {
            database: default_db_container(),
            application: default_app_container(),
        }
    }
}

/// Database layout on each node.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_superuser")]
    pub superuser: String,
    #[serde(default = "default_replication_user")]
    pub replication_user: String,
    /// Data directory on the host, bind-mounted into the container.
    #[serde(default = "default_host_data_dir")]
    pub host_data_dir: String,
    /// Image used for the one-off base backup container.
    #[serde(default = "default_db_image")]
    pub image: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            superuser: default_superuser(),
            replication_user: default_replication_user(),
            host_data_dir: default_host_data_dir(),
            image: default_db_image(),
        }
    }
}

/// Where the application keeps its database target.
#[derive(Debug, Clone, Deserialize)]
pub struct ApplicationSettings {
    #[serde(default = "default_settings_path")]
    pub settings_path: String,
    #[serde(default = "default_db_host_key")]
    pub db_host_key: String,
    #[serde(default)]
    pub db_port_key: Option<String>,
    /// Probed from the application's own host.
    #[serde(default = "default_readiness_url")]
    pub readiness_url: String,
}

impl Default for ApplicationSettings {
    fn default() -> Self {
        Self {
            settings_path: default_settings_path(),
            db_host_key: default_db_host_key(),
            db_port_key: None,
            readiness_url: default_readiness_url(),
        }
    }
}

/// Remote shell settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SshSettings {
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            user: None,
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

/// Timeouts and polling bounds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Timing {
    /// Bound on a read-only role probe. A timeout means Unreachable.
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    /// Bound on an ordinary mutating command.
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
    /// Bound on full-copy streaming.
    #[serde(default = "default_stream_timeout_ms")]
    pub stream_timeout_ms: u64,
    #[serde(default = "default_promote_poll_interval_ms")]
    pub promote_poll_interval_ms: u64,
    #[serde(default = "default_promote_max_wait_ms")]
    pub promote_max_wait_ms: u64,
    #[serde(default = "default_standby_poll_interval_ms")]
    pub standby_poll_interval_ms: u64,
    #[serde(default = "default_standby_max_wait_ms")]
    pub standby_max_wait_ms: u64,
    #[serde(default = "default_ready_poll_interval_ms")]
    pub ready_poll_interval_ms: u64,
    #[serde(default = "default_ready_max_attempts")]
    pub ready_max_attempts: u32,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            probe_timeout_ms: default_probe_timeout_ms(),
            command_timeout_ms: default_command_timeout_ms(),
            stream_timeout_ms: default_stream_timeout_ms(),
            promote_poll_interval_ms: default_promote_poll_interval_ms(),
            promote_max_wait_ms: default_promote_max_wait_ms(),
            standby_poll_interval_ms: default_standby_poll_interval_ms(),
            standby_max_wait_ms: default_standby_max_wait_ms(),
            ready_poll_interval_ms: default_ready_poll_interval_ms(),
            ready_max_attempts: default_ready_max_attempts(),
        }
    }
}

impl Timing {
    /// No waiting between polls. Poll bounds are kept small so loops
    /// still terminate. Used with the in-memory simulation.
    pub fn immediate() -> Self {
        Self {
            probe_timeout_ms: 0,
            command_timeout_ms: 0,
            stream_timeout_ms: 0,
            promote_poll_interval_ms: 0,
            promote_max_wait_ms: 0,
            standby_poll_interval_ms: 0,
            standby_max_wait_ms: 0,
            ready_poll_interval_ms: 0,
            ready_max_attempts: 3,
        }
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn stream_timeout(&self) -> Duration {
        Duration::from_millis(self.stream_timeout_ms)
    }

    /// Poll interval and number of polls for promotion.
    pub fn promote_polls(&self) -> (Duration, u32) {
        poll_bounds(self.promote_poll_interval_ms, self.promote_max_wait_ms)
    }

    /// Poll interval and number of polls for post-start standby checks.
    pub fn standby_polls(&self) -> (Duration, u32) {
        poll_bounds(self.standby_poll_interval_ms, self.standby_max_wait_ms)
    }

    pub fn ready_poll_interval(&self) -> Duration {
        Duration::from_millis(self.ready_poll_interval_ms)
    }

    /// Bounds for values read from a file. `immediate()` does not pass
    /// and is only installed through `ClusterConfig::with_timing`.
    pub fn validate(&self) -> ConfigResult<()> {
        if !PROBE_TIMEOUT_RANGE_MS.contains(&self.probe_timeout_ms) {
            return Err(ConfigError::Invalid(format!(
                "timing.probe_timeout_ms must be between {} and {}, got {}",
                PROBE_TIMEOUT_RANGE_MS.start(),
                PROBE_TIMEOUT_RANGE_MS.end(),
                self.probe_timeout_ms
            )));
        }
        let nonzero = [
            ("command_timeout_ms", self.command_timeout_ms),
            ("stream_timeout_ms", self.stream_timeout_ms),
            ("promote_poll_interval_ms", self.promote_poll_interval_ms),
            ("promote_max_wait_ms", self.promote_max_wait_ms),
            ("standby_poll_interval_ms", self.standby_poll_interval_ms),
            ("standby_max_wait_ms", self.standby_max_wait_ms),
            ("ready_poll_interval_ms", self.ready_poll_interval_ms),
            ("ready_max_attempts", u64::from(self.ready_max_attempts)),
        ];
        if let Some((name, _)) = nonzero.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::Invalid(format!("timing.{name} must be greater than 0")));
        }
        Ok(())
    }
}

const PROBE_TIMEOUT_RANGE_MS: std::ops::RangeInclusive<u64> = 5_000..=10_000;

/// At least one poll, then one per interval until the wait is spent.
fn poll_bounds(interval_ms: u64, max_wait_ms: u64) -> (Duration, u32) {
    let polls = if interval_ms == 0 {
        3
    } else {
        (max_wait_ms / interval_ms).clamp(1, u32::MAX as u64) as u32
    };
    (Duration::from_millis(interval_ms), polls)
}

fn default_db_port() -> u16 {
    5432
}
fn default_db_container() -> String {
    "idp-db".to_string()
}
fn default_app_container() -> String {
    "idp-app".to_string()
}
fn default_superuser() -> String {
    "postgres".to_string()
}
fn default_replication_user() -> String {
    "replicator".to_string()
}
fn default_host_data_dir() -> String {
    "/srv/idp/pgdata".to_string()
}
fn default_db_image() -> String {
    "postgres:16".to_string()
}
fn default_settings_path() -> String {
    "/srv/idp/app.env".to_string()
}
fn default_db_host_key() -> String {
    "KC_DB_URL_HOST".to_string()
}
fn default_readiness_url() -> String {
    "http://127.0.0.1:9000/health/ready".to_string()
}
fn default_connect_timeout_secs() -> u64 {
    5
}
fn default_edge_pointer() -> String {
    "/http/services/idp/loadBalancer/servers".to_string()
}
fn default_probe_timeout_ms() -> u64 {
    8_000
}
fn default_command_timeout_ms() -> u64 {
    120_000
}
fn default_stream_timeout_ms() -> u64 {
    3_600_000
}
fn default_promote_poll_interval_ms() -> u64 {
    2_000
}
fn default_promote_max_wait_ms() -> u64 {
    60_000
}
fn default_standby_poll_interval_ms() -> u64 {
    2_000
}
fn default_standby_max_wait_ms() -> u64 {
    120_000
}
fn default_ready_poll_interval_ms() -> u64 {
    5_000
}
fn default_ready_max_attempts() -> u32 {
    24
}

/// Configuration file as written.
#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    local_node: Option<NodeId>,
    nodes: BTreeMap<NodeId, NodeEntry>,
    #[serde(default)]
    edges: Vec<EdgeInstance>,
    #[serde(default = "default_edge_pointer")]
    edge_backends_pointer: String,
    #[serde(default)]
    containers: ContainerNames,
    #[serde(default)]
    database: DatabaseSettings,
    #[serde(default)]
    application: ApplicationSettings,
    #[serde(default)]
    ssh: SshSettings,
    #[serde(default)]
    timing: Timing,
}

/// Validated configuration with the node table resolved.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    pub local_node: Option<NodeId>,
    nodes: BTreeMap<NodeId, Node>,
    pub edges: Vec<EdgeInstance>,
    /// JSON pointer to the backend list inside each edge document.
    pub edge_backends_pointer: String,
    pub containers: ContainerNames,
    pub database: DatabaseSettings,
    pub application: ApplicationSettings,
    pub ssh: SshSettings,
    pub timing: Timing,
}

impl ClusterConfig {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    /// Parse and validate configuration JSON.
    pub fn from_json(content: &str) -> ConfigResult<Self> {
        let file: ConfigFile =
            serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Self::resolve(file)
    }

    fn resolve(file: ConfigFile) -> ConfigResult<Self> {
        if file.nodes.len() != 2 {
            return Err(ConfigError::Invalid(format!(
                "exactly two nodes are required, found {}",
                file.nodes.len()
            )));
        }

        // Each node must name the other as its peer. The peer's FQDN is
        // always taken from the peer's own entry.
        for (id, entry) in &file.nodes {
            if &entry.peer == id {
                return Err(ConfigError::Invalid(format!("node {id} names itself as peer")));
            }
            match file.nodes.get(&entry.peer) {
                Some(peer) if &peer.peer == id => {}
                Some(_) => {
                    return Err(ConfigError::Invalid(format!(
                        "peer of {} is {}, but {} does not name {} back",
                        id, entry.peer, entry.peer, id
                    )))
                }
                None => return Err(ConfigError::UnknownNode(entry.peer.to_string())),
            }
            if entry.fqdn.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("node {id} has an empty fqdn")));
            }
            if entry.app_url.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("node {id} has an empty app_url")));
            }
        }

        let mut edge_ids = BTreeSet::new();
        for edge in &file.edges {
            if edge.id.is_empty() || edge.host.is_empty() || edge.config_path.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "edge entry '{}' must set id, host and config_path",
                    edge.id
                )));
            }
            if !edge_ids.insert(edge.id.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate edge id '{}'", edge.id)));
            }
        }

        if !file.edge_backends_pointer.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "edge_backends_pointer must be a JSON pointer, got '{}'",
                file.edge_backends_pointer
            )));
        }

        file.timing.validate()?;

        if let Some(local) = &file.local_node {
            if !file.nodes.contains_key(local) {
                return Err(ConfigError::UnknownNode(local.to_string()));
            }
        }

        let nodes = file
            .nodes
            .into_iter()
            .map(|(id, entry)| {
                let replication_address = entry
                    .replication_address
                    .unwrap_or_else(|| entry.fqdn.clone());
                let node = Node {
                    id: id.clone(),
                    fqdn: entry.fqdn,
                    peer: entry.peer,
                    db_port: entry.db_port,
                    app_url: entry.app_url,
                    replication_address,
                };
                (id, node)
            })
            .collect();

        Ok(Self {
            local_node: file.local_node,
            nodes,
            edges: file.edges,
            edge_backends_pointer: file.edge_backends_pointer,
            containers: file.containers,
            database: file.database,
            application: file.application,
            ssh: file.ssh,
            timing: file.timing,
        })
    }

    /// Look up a node by id.
    pub fn node(&self, id: &NodeId) -> ConfigResult<&Node> {
        self.nodes
            .get(id)
            .ok_or_else(|| ConfigError::UnknownNode(id.to_string()))
    }

    /// The other member of the pair.
    pub fn peer_of(&self, id: &NodeId) -> ConfigResult<&Node> {
        let node = self.node(id)?;
        self.node(&node.peer)
    }

    /// Resolve the initiating node: explicit override first, then the file.
    pub fn local(&self, override_id: Option<&NodeId>) -> ConfigResult<&Node> {
        let id = override_id
            .or(self.local_node.as_ref())
            .ok_or(ConfigError::NoLocalNode)?;
        self.node(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Replace timing, e.g. for tests against the simulation.
    pub fn with_timing(mut self, timing: Timing) -> Self {
        self.timing = timing;
        self
    }
}
