//! CLI module for haswitch
//!
//! Provides command-line interface for:
//! - emergency-failover: promote the local Standby while the peer is down
//! - planned-switchover: swap roles of two healthy nodes
//! - reinstate: rebuild the local node as Standby of the current Primary
//! - status: read-only topology and edge report

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{load_config, run, run_command};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{write_json, write_text};
