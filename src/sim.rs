//! In-memory two-node cluster
//!
//! Implements every collaborator trait against plain state so protocols
//! can run end to end without remote hosts. Edge documents and settings
//! files are kept as text and go through the same parsers as production.
//!
//! Failures are injected per node or per edge. Every successful mutation
//! is appended to a log, so tests can assert that a refused run mutated
//! nothing.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use crate::cluster::{ClusterConfig, EdgeInstance, Node, NodeId, ReplicationRole, Timing};
use crate::remote::RemoteError;
use crate::runtime::{
    AppControl, Collaborators, DatabaseControl, EdgeDocument, EdgeStore, KeyValueDocument,
    ReplicationCredential, RuntimeError, RuntimeResult, Service, ServiceRuntime, Style,
};

/// Two nodes, two edges, `idp1` Primary and `idp2` its Standby.
pub const PAIR_CONFIG: &str = r#"{
    "local_node": "idp2",
    "nodes": {
        "idp1": { "fqdn": "idp1.example.org", "peer": "idp2", "app_url": "http://idp1.example.org:8080" },
        "idp2": { "fqdn": "idp2.example.org", "peer": "idp1", "app_url": "http://idp2.example.org:8080" }
    },
    "edges": [
        { "id": "edge-1", "host": "edge1.example.org", "config_path": "/etc/edge/idp.json" },
        { "id": "edge-2", "host": "edge2.example.org", "config_path": "/etc/edge/idp.json" }
    ],
    "application": { "db_port_key": "KC_DB_URL_PORT" }
}"#;

#[derive(Debug, Clone)]
struct SimNode {
    fqdn: String,
    /// Role the database reports while running.
    role: ReplicationRole,
    db_present: bool,
    db_running: bool,
    app_present: bool,
    app_running: bool,
    has_data: bool,
    follower_of: Option<NodeId>,
    /// Followers admitted by this node's replication allowlist.
    admits: BTreeSet<NodeId>,
    settings: String,
    unreachable: bool,
    stall_promotion: bool,
    fail_stream: bool,
    never_ready: bool,
}

#[derive(Debug, Clone)]
struct SimEdge {
    document: String,
    unreachable: bool,
}

#[derive(Debug, Default)]
struct SimState {
    nodes: BTreeMap<NodeId, SimNode>,
    edges: BTreeMap<String, SimEdge>,
    mutations: Vec<String>,
}

pub struct SimCluster {
    config: ClusterConfig,
    state: RefCell<SimState>,
}

impl SimCluster {
    /// The standard pair: `idp1` Primary, `idp2` Standby, both backends
    /// registered on every edge, both applications on `idp1`'s database.
    pub fn pair() -> RuntimeResult<Self> {
        let config = ClusterConfig::from_json(PAIR_CONFIG)
            .map_err(|e| RuntimeError::malformed("sim config", e.to_string()))?
            .with_timing(Timing::immediate());
        let primary =
            NodeId::parse("idp1").map_err(|e| RuntimeError::malformed("node id", e.to_string()))?;
        Self::new(config, &primary)
    }

    /// A healthy cluster over `config` with `primary` writable.
    pub fn new(config: ClusterConfig, primary: &NodeId) -> RuntimeResult<Self> {
        let primary_node = config
            .node(primary)
            .map_err(|e| RuntimeError::malformed("sim config", e.to_string()))?;
        let settings = initial_settings(&config, primary_node);

        let mut state = SimState::default();
        for node in config.nodes() {
            let is_primary = &node.id == primary;
            state.nodes.insert(
                node.id.clone(),
                SimNode {
                    fqdn: node.fqdn.clone(),
                    role: if is_primary {
                        ReplicationRole::Primary
                    } else {
                        ReplicationRole::Standby
                    },
                    db_present: true,
                    db_running: true,
                    app_present: true,
                    app_running: true,
                    has_data: true,
                    follower_of: if is_primary { None } else { Some(primary.clone()) },
                    admits: BTreeSet::new(),
                    settings: settings.clone(),
                    unreachable: false,
                    stall_promotion: false,
                    fail_stream: false,
                    never_ready: false,
                },
            );
        }

        let mut doc = EdgeDocument::parse("", &config.edge_backends_pointer)?;
        for node in config.nodes() {
            doc.add(node.backend_url())?;
        }
        for edge in &config.edges {
            state.edges.insert(
                edge.id.clone(),
                SimEdge {
                    document: doc.render(),
                    unreachable: false,
                },
            );
        }

        Ok(Self {
            config,
            state: RefCell::new(state),
        })
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    pub fn collaborators(&self) -> Collaborators<'_> {
        Collaborators {
            config: &self.config,
            db: self,
            services: self,
            edges: self,
            apps: self,
        }
    }

    pub fn node(&self, id: &str) -> RuntimeResult<&Node> {
        let id = NodeId::parse(id).map_err(|e| RuntimeError::malformed("node id", e.to_string()))?;
        self.config
            .node(&id)
            .map_err(|e| RuntimeError::malformed("node id", e.to_string()))
    }

    // =========================================================================
    // INSPECTION
    // =========================================================================

    /// What a role probe would answer right now.
    pub fn observed_role(&self, id: &str) -> ReplicationRole {
        match self.node(id) {
            Ok(node) => crate::failover::classify(&self.query_role(node)),
            Err(_) => ReplicationRole::Error,
        }
    }

    pub fn has_data(&self, id: &str) -> bool {
        self.with_node(id, |n| n.has_data).unwrap_or(false)
    }

    pub fn database_running(&self, id: &str) -> bool {
        self.with_node(id, |n| n.db_running).unwrap_or(false)
    }

    pub fn follower_of(&self, id: &str) -> Option<String> {
        self.with_node(id, |n| n.follower_of.as_ref().map(|f| f.to_string()))
            .flatten()
    }

    /// Backends registered on `edge`, parsed from its document.
    pub fn edge_backends(&self, edge: &str) -> Vec<String> {
        let state = self.state.borrow();
        state
            .edges
            .get(edge)
            .and_then(|e| EdgeDocument::parse(&e.document, &self.config.edge_backends_pointer).ok())
            .map(|d| d.backends())
            .unwrap_or_default()
    }

    /// Database host `id`'s application is configured for.
    pub fn app_db_host(&self, id: &str) -> Option<String> {
        let key = self.config.application.db_host_key.clone();
        self.with_node(id, |n| {
            KeyValueDocument::parse(&n.settings, Style::Env)
                .get(&key)
                .map(str::to_string)
        })
        .flatten()
    }

    pub fn app_settings(&self, id: &str) -> String {
        self.with_node(id, |n| n.settings.clone()).unwrap_or_default()
    }

    /// Every successful mutation so far, in order.
    pub fn mutations(&self) -> Vec<String> {
        self.state.borrow().mutations.clone()
    }

    // =========================================================================
    // FAILURE INJECTION
    // =========================================================================

    /// Host stops answering: every call to it times out.
    pub fn set_unreachable(&self, id: &str, unreachable: bool) {
        self.update(id, |n| n.unreachable = unreachable);
    }

    /// Promotion requests are accepted but never take effect.
    pub fn stall_promotion(&self, id: &str) {
        self.update(id, |n| n.stall_promotion = true);
    }

    /// Streaming a copy into this node fails midway.
    pub fn fail_stream_into(&self, id: &str) {
        self.update(id, |n| n.fail_stream = true);
    }

    /// The application on this node never reports ready.
    pub fn app_never_ready(&self, id: &str) {
        self.update(id, |n| n.never_ready = true);
    }

    pub fn remove_container(&self, id: &str, service: Service) {
        self.update(id, |n| match service {
            Service::Database => {
                n.db_present = false;
                n.db_running = false;
            }
            Service::Application => {
                n.app_present = false;
                n.app_running = false;
            }
        });
    }

    /// Stop the database without recording a mutation (a crash).
    pub fn crash_database(&self, id: &str) {
        self.update(id, |n| n.db_running = false);
    }

    /// Force a role, e.g. to stage a split brain.
    pub fn force_role(&self, id: &str, role: ReplicationRole) {
        self.update(id, |n| {
            n.role = role;
            if role == ReplicationRole::Primary {
                n.follower_of = None;
            }
        });
    }

    pub fn set_edge_unreachable(&self, edge: &str, unreachable: bool) {
        if let Some(e) = self.state.borrow_mut().edges.get_mut(edge) {
            e.unreachable = unreachable;
        }
    }

    // =========================================================================
    // INTERNALS
    // =========================================================================

    fn with_node<T>(&self, id: &str, f: impl FnOnce(&SimNode) -> T) -> Option<T> {
        let id = NodeId::parse(id).ok()?;
        self.state.borrow().nodes.get(&id).map(f)
    }

    fn update(&self, id: &str, f: impl FnOnce(&mut SimNode)) {
        if let Ok(id) = NodeId::parse(id) {
            if let Some(node) = self.state.borrow_mut().nodes.get_mut(&id) {
                f(node);
            }
        }
    }

    /// Run `f` on a reachable node's state, recording `mutation` on success.
    fn mutate<T>(
        &self,
        node: &Node,
        program: &str,
        mutation: Option<String>,
        f: impl FnOnce(&mut SimNode) -> RuntimeResult<T>,
    ) -> RuntimeResult<T> {
        let mut state = self.state.borrow_mut();
        let sim = state
            .nodes
            .get_mut(&node.id)
            .ok_or_else(|| RuntimeError::Rejected(format!("unknown node {}", node.id)))?;
        if sim.unreachable {
            return Err(timeout(&sim.fqdn, program));
        }
        let value = f(sim)?;
        if let Some(entry) = mutation {
            state.mutations.push(entry);
        }
        Ok(value)
    }

    fn read<T>(
        &self,
        node: &Node,
        program: &str,
        f: impl FnOnce(&SimNode) -> RuntimeResult<T>,
    ) -> RuntimeResult<T> {
        let state = self.state.borrow();
        let sim = state
            .nodes
            .get(&node.id)
            .ok_or_else(|| RuntimeError::Rejected(format!("unknown node {}", node.id)))?;
        if sim.unreachable {
            return Err(timeout(&sim.fqdn, program));
        }
        f(sim)
    }
}

fn initial_settings(config: &ClusterConfig, primary: &Node) -> String {
    let mut doc = KeyValueDocument::parse("# identity service\nKC_DB=postgres\n", Style::Env);
    doc.set(&config.application.db_host_key, primary.db_host());
    if let Some(port_key) = &config.application.db_port_key {
        doc.set(port_key, &primary.db_port.to_string());
    }
    doc.render()
}

fn timeout(host: &str, program: &str) -> RuntimeError {
    RuntimeError::Remote(RemoteError::Timeout {
        host: host.to_string(),
        program: program.to_string(),
        after: Duration::from_secs(8),
    })
}

fn failed(host: &str, program: &str, stderr: &str) -> RuntimeError {
    RuntimeError::Remote(RemoteError::Failed {
        host: host.to_string(),
        program: program.to_string(),
        status: 1,
        stderr: stderr.to_string(),
    })
}

fn edge_timeout(edge: &EdgeInstance) -> RuntimeError {
    RuntimeError::Remote(RemoteError::Unreachable {
        host: edge.host.clone(),
        detail: "connection timed out".to_string(),
    })
}

// =============================================================================
// COLLABORATOR IMPLEMENTATIONS
// =============================================================================

impl DatabaseControl for SimCluster {
    fn query_role(&self, node: &Node) -> RuntimeResult<String> {
        self.read(node, "psql", |n| {
            if !n.db_running || !n.has_data {
                return Err(failed(&n.fqdn, "docker", "database is not running"));
            }
            match n.role {
                ReplicationRole::Primary => Ok("f\n".to_string()),
                ReplicationRole::Standby => Ok("t\n".to_string()),
                _ => Ok("?\n".to_string()),
            }
        })
    }

    fn promote(&self, node: &Node) -> RuntimeResult<()> {
        self.mutate(node, "psql", Some(format!("promote {}", node.id)), |n| {
            if !n.db_running {
                return Err(failed(&n.fqdn, "docker", "database is not running"));
            }
            if n.role != ReplicationRole::Standby {
                return Err(RuntimeError::Rejected("not in recovery".to_string()));
            }
            if !n.stall_promotion {
                n.role = ReplicationRole::Primary;
                n.follower_of = None;
            }
            Ok(())
        })
    }

    fn allow_replication(&self, source: &Node, follower: &Node) -> RuntimeResult<()> {
        let follower_id = follower.id.clone();
        self.mutate(
            source,
            "psql",
            Some(format!("allow-replication {} {}", source.id, follower.id)),
            |n| {
                n.admits.insert(follower_id);
                Ok(())
            },
        )
    }

    fn wipe_data(&self, node: &Node) -> RuntimeResult<()> {
        self.mutate(node, "find", Some(format!("wipe {}", node.id)), |n| {
            if n.db_running {
                return Err(RuntimeError::Rejected(
                    "refusing to wipe a running database".to_string(),
                ));
            }
            n.has_data = false;
            n.follower_of = None;
            Ok(())
        })
    }

    fn stream_full_copy(
        &self,
        node: &Node,
        source: &Node,
        credential: &ReplicationCredential,
    ) -> RuntimeResult<()> {
        if credential.expose_secret().is_empty() {
            return Err(RuntimeError::Rejected("authentication failed".to_string()));
        }
        let admitted = self.read(source, "pg_basebackup", |s| {
            if !s.db_running || s.role != ReplicationRole::Primary {
                return Err(failed(&s.fqdn, "pg_basebackup", "source is not a running primary"));
            }
            Ok(s.admits.contains(&node.id))
        })?;
        if !admitted {
            return Err(RuntimeError::Rejected(format!(
                "no pg_hba entry for replication connection from {}",
                node.id
            )));
        }
        self.mutate(
            node,
            "pg_basebackup",
            Some(format!("stream {} <- {}", node.id, source.id)),
            |n| {
                if n.fail_stream {
                    return Err(failed(&n.fqdn, "pg_basebackup", "connection reset by peer"));
                }
                n.has_data = true;
                n.role = ReplicationRole::Standby;
                Ok(())
            },
        )
    }

    fn configure_follower(
        &self,
        node: &Node,
        source: &Node,
        _credential: &ReplicationCredential,
    ) -> RuntimeResult<()> {
        let source_id = source.id.clone();
        self.mutate(
            node,
            "sh",
            Some(format!("follow {} -> {}", node.id, source.id)),
            |n| {
                n.follower_of = Some(source_id);
                n.role = ReplicationRole::Standby;
                Ok(())
            },
        )
    }
}

impl ServiceRuntime for SimCluster {
    fn exists(&self, node: &Node, service: Service) -> RuntimeResult<bool> {
        self.read(node, "docker", |n| {
            Ok(match service {
                Service::Database => n.db_present,
                Service::Application => n.app_present,
            })
        })
    }

    fn start(&self, node: &Node, service: Service) -> RuntimeResult<()> {
        self.mutate(node, "docker", Some(format!("start {} {}", node.id, service)), |n| {
            match service {
                Service::Database if n.db_present => n.db_running = true,
                Service::Application if n.app_present => n.app_running = true,
                _ => return Err(failed(&n.fqdn, "docker", "No such container")),
            }
            Ok(())
        })
    }

    fn stop(&self, node: &Node, service: Service) -> RuntimeResult<()> {
        self.mutate(node, "docker", Some(format!("stop {} {}", node.id, service)), |n| {
            match service {
                Service::Database if n.db_present => n.db_running = false,
                Service::Application if n.app_present => n.app_running = false,
                _ => return Err(failed(&n.fqdn, "docker", "No such container")),
            }
            Ok(())
        })
    }

    fn restart(&self, node: &Node, service: Service) -> RuntimeResult<()> {
        self.mutate(node, "docker", Some(format!("restart {} {}", node.id, service)), |n| {
            match service {
                Service::Database if n.db_present => n.db_running = true,
                Service::Application if n.app_present => n.app_running = true,
                _ => return Err(failed(&n.fqdn, "docker", "No such container")),
            }
            Ok(())
        })
    }
}

impl EdgeStore for SimCluster {
    fn load(&self, edge: &EdgeInstance) -> RuntimeResult<String> {
        let state = self.state.borrow();
        match state.edges.get(&edge.id) {
            Some(e) if e.unreachable => Err(edge_timeout(edge)),
            Some(e) => Ok(e.document.clone()),
            None => Err(failed(&edge.host, "cat", "No such file or directory")),
        }
    }

    fn store(&self, edge: &EdgeInstance, document: &str) -> RuntimeResult<()> {
        let mut state = self.state.borrow_mut();
        match state.edges.get_mut(&edge.id) {
            Some(e) if e.unreachable => return Err(edge_timeout(edge)),
            Some(e) => e.document = document.to_string(),
            None => return Err(failed(&edge.host, "sh", "No such file or directory")),
        }
        state.mutations.push(format!("edge {}", edge.id));
        Ok(())
    }
}

impl AppControl for SimCluster {
    fn read_settings(&self, node: &Node) -> RuntimeResult<String> {
        self.read(node, "cat", |n| Ok(n.settings.clone()))
    }

    fn write_settings(&self, node: &Node, contents: &str) -> RuntimeResult<()> {
        self.mutate(node, "sh", Some(format!("settings {}", node.id)), |n| {
            n.settings = contents.to_string();
            Ok(())
        })
    }

    /// Ready when the application runs and its database target is a
    /// reachable running node with data.
    fn probe_ready(&self, node: &Node) -> RuntimeResult<bool> {
        let key = &self.config.application.db_host_key;
        let target = self.read(node, "curl", |n| {
            if !n.app_running || n.never_ready {
                return Ok(None);
            }
            Ok(KeyValueDocument::parse(&n.settings, Style::Env)
                .get(key)
                .map(str::to_string))
        })?;
        let Some(host) = target else {
            return Ok(false);
        };
        let state = self.state.borrow();
        Ok(state
            .nodes
            .values()
            .any(|n| n.fqdn == host && !n.unreachable && n.db_running && n.has_data))
    }
}
