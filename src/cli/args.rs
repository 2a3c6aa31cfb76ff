//! CLI argument definitions using clap
//!
//! Commands:
//! - haswitch emergency-failover [--force] [--dry-run]
//! - haswitch planned-switchover [--dry-run]
//! - haswitch reinstate --primary <node-id> [--dry-run]
//! - haswitch status

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Operator-driven failover for a two-node primary/standby pair
#[derive(Parser, Debug)]
#[command(name = "haswitch")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, global = true, default_value = "./haswitch.json")]
    pub config: PathBuf,

    /// Id of the node this command runs on (defaults to `local_node`)
    #[arg(long, global = true)]
    pub node: Option<String>,

    /// Do not ask for confirmation
    #[arg(long, global = true)]
    pub yes: bool,

    /// Print the run record as JSON instead of a text summary
    #[arg(long, global = true)]
    pub json: bool,

    /// Log every role poll
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Promote this Standby while the Primary is down
    EmergencyFailover {
        /// Proceed even though the peer still answers
        #[arg(long)]
        force: bool,

        /// Run preflight and print the plan without changing anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Swap roles with the healthy Primary (run on the Standby)
    PlannedSwitchover {
        /// Run preflight and print the plan without changing anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Rebuild this node as Standby of the current Primary
    Reinstate {
        /// Id of the current Primary
        #[arg(long)]
        primary: String,

        /// Run preflight and print the plan without changing anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Show observed roles and edge membership
    Status,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
