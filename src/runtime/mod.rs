//! External collaborators
//!
//! The orchestration core touches the outside world only through the
//! four traits below. Production implementations drive PostgreSQL, a
//! container runtime, edge proxy config files and the application's
//! settings file through a `RemoteExecutor`; `crate::sim` provides an
//! in-memory pair for tests.
//!
//! Every file the core edits is parsed into a structure, changed there
//! and rendered back (`settings`, `edge`, `hba`).

mod app;
mod credential;
mod docker;
mod edge;
mod errors;
mod hba;
mod postgres;
mod settings;

use std::fmt;

pub use app::RemoteAppControl;
pub use credential::{ReplicationCredential, PASSWORD_ENV};
pub use docker::DockerRuntime;
pub use edge::{EdgeDocument, RemoteEdgeStore};
pub use errors::{RuntimeError, RuntimeResult};
pub use hba::{HbaFile, HbaRule};
pub use postgres::PostgresControl;
pub use settings::{KeyValueDocument, Style};

use crate::cluster::{ClusterConfig, EdgeInstance, Node};

/// A managed service on a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Database,
    Application,
}

impl Service {
    pub fn as_str(&self) -> &'static str {
        match self {
            Service::Database => "database",
            Service::Application => "application",
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Database control surface.
pub trait DatabaseControl {
    /// Raw answer of the replication status query (`t` in recovery,
    /// `f` writable). Bounded by the probe timeout.
    fn query_role(&self, node: &Node) -> RuntimeResult<String>;

    /// Ask a standby to leave recovery. Does not wait.
    fn promote(&self, node: &Node) -> RuntimeResult<()>;

    /// Admit `follower` in `source`'s replication allowlist and reload.
    fn allow_replication(&self, source: &Node, follower: &Node) -> RuntimeResult<()>;

    /// Remove everything in `node`'s data directory. The service must be
    /// stopped.
    fn wipe_data(&self, node: &Node) -> RuntimeResult<()>;

    /// Stream a full physical copy of `source` into `node`'s empty data
    /// directory. Blocks until done.
    fn stream_full_copy(
        &self,
        node: &Node,
        source: &Node,
        credential: &ReplicationCredential,
    ) -> RuntimeResult<()>;

    /// Mark `node` as a follower of `source`.
    fn configure_follower(
        &self,
        node: &Node,
        source: &Node,
        credential: &ReplicationCredential,
    ) -> RuntimeResult<()>;
}

/// Process/container runtime.
pub trait ServiceRuntime {
    fn exists(&self, node: &Node, service: Service) -> RuntimeResult<bool>;
    fn start(&self, node: &Node, service: Service) -> RuntimeResult<()>;
    fn stop(&self, node: &Node, service: Service) -> RuntimeResult<()>;
    fn restart(&self, node: &Node, service: Service) -> RuntimeResult<()>;
}

/// Edge proxy dynamic config storage.
pub trait EdgeStore {
    fn load(&self, edge: &EdgeInstance) -> RuntimeResult<String>;
    fn store(&self, edge: &EdgeInstance, document: &str) -> RuntimeResult<()>;
}

/// The dependent application on a node.
pub trait AppControl {
    fn read_settings(&self, node: &Node) -> RuntimeResult<String>;
    fn write_settings(&self, node: &Node, contents: &str) -> RuntimeResult<()>;
    /// One readiness probe. `Ok(false)` means "answered, not ready".
    fn probe_ready(&self, node: &Node) -> RuntimeResult<bool>;
}

/// Everything a protocol run needs, borrowed for its duration.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub config: &'a ClusterConfig,
    pub db: &'a dyn DatabaseControl,
    pub services: &'a dyn ServiceRuntime,
    pub edges: &'a dyn EdgeStore,
    pub apps: &'a dyn AppControl,
}
