//! haswitch - operator-driven role transitions for a two-node
//! primary/standby database-backed identity service
//!
//! Three protocols move the Primary role and keep the dependent
//! application and the edge load balancers in step:
//! - emergency failover: promote the Standby while the Primary is down
//! - planned switchover: swap roles of two healthy nodes
//! - reinstatement: rebuild a node as Standby of the current Primary
//!
//! A human stays in the loop. There is no leader election, no consensus
//! and no automatic rollback.

pub mod cli;
pub mod cluster;
pub mod failover;
pub mod observability;
pub mod remote;
pub mod runtime;
#[cfg(any(test, feature = "sim"))]
pub mod sim;
