//! Cluster model
//!
//! - The static node table (two nodes, each naming the other as peer)
//! - Edge proxy instances and per-host service layout
//! - Probed replication roles and the topology they form
//!
//! Roles are observed, never configured. The single-primary invariant is
//! checked against a `ClusterTopology` built from probes in the same run.

mod config;
mod errors;
mod node;
mod role;
mod topology;

pub use config::{
    ApplicationSettings, ClusterConfig, ContainerNames, DatabaseSettings, EdgeInstance,
    SshSettings, Timing,
};
pub use errors::{ConfigError, ConfigResult};
pub use node::{Node, NodeId};
pub use role::ReplicationRole;
pub use topology::{ClusterTopology, Observation, TopologyHealth};
