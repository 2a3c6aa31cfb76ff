//! CLI command implementations
//!
//! Each command loads the configuration, resolves the local node, wires
//! the production collaborators over one `SshExecutor` and hands off to
//! the failover core. The returned value is the process exit status.

use std::path::Path;

use serde_json::json;

use crate::cluster::{ClusterConfig, Node, NodeId};
use crate::failover::{
    self, AssumeYes, Confirm, Protocol, ProtocolRun, RunOptions, StatusReport, StdinConfirm,
};
use crate::observability::{log_event, Event, Logger, Severity};
use crate::remote::SshExecutor;
use crate::runtime::{
    Collaborators, DockerRuntime, PostgresControl, RemoteAppControl, RemoteEdgeStore,
    ReplicationCredential,
};

use super::args::{Cli, Command};
use super::errors::{CliError, CliResult};
use super::io::{write_json, write_text};

/// Parse arguments and run. Returns the exit status.
pub fn run() -> CliResult<i32> {
    run_command(Cli::parse_args())
}

pub fn run_command(cli: Cli) -> CliResult<i32> {
    let Cli {
        config: config_path,
        node,
        yes,
        json,
        verbose,
        command,
    } = cli;

    Logger::set_min_severity(if verbose {
        Severity::Trace
    } else {
        Severity::Info
    });

    let config = load_config(&config_path)?;
    let local_override = node.map(NodeId::parse).transpose()?;
    let local = config.local(local_override.as_ref())?;
    let peer = config.peer_of(&local.id)?;

    let exec = SshExecutor::new(local.fqdn.clone(), &config.ssh)?;
    let db = PostgresControl::new(&exec, &config);
    let services = DockerRuntime::new(&exec, &config);
    let edges = RemoteEdgeStore::new(&exec, &config.timing);
    let apps = RemoteAppControl::new(&exec, &config);
    let env = Collaborators {
        config: &config,
        db: &db,
        services: &services,
        edges: &edges,
        apps: &apps,
    };

    let output = Output { json };
    let confirm: &dyn Confirm = if yes { &AssumeYes } else { &StdinConfirm };

    match command {
        Command::EmergencyFailover { force, dry_run } => execute(
            &env,
            Protocol::EmergencyFailover { force },
            local,
            dry_run,
            confirm,
            &output,
        ),
        Command::PlannedSwitchover { dry_run } => execute(
            &env,
            Protocol::PlannedSwitchover,
            local,
            dry_run,
            confirm,
            &output,
        ),
        Command::Reinstate { primary, dry_run } => {
            let primary = NodeId::parse(primary)?;
            execute(
                &env,
                Protocol::Reinstatement { primary },
                local,
                dry_run,
                confirm,
                &output,
            )
        }
        Command::Status => status(&env, local, peer, &output),
    }
}

/// Load and validate the configuration file.
pub fn load_config(path: &Path) -> CliResult<ClusterConfig> {
    let config = ClusterConfig::load(path)?;
    let shown = path.display().to_string();
    log_event(Event::ConfigLoaded, &[("path", shown.as_str())]);
    Ok(config)
}

struct Output {
    json: bool,
}

impl Output {
    fn run(&self, record: &ProtocolRun) -> CliResult<()> {
        if self.json {
            write_json(record)
        } else {
            write_text(&record.render_summary())
        }
    }

    fn status(&self, report: &StatusReport) -> CliResult<()> {
        if self.json {
            let edges: Vec<_> = report
                .edges
                .iter()
                .map(|e| match &e.backends {
                    Ok(list) => json!({ "edge": e.edge, "backends": list }),
                    Err(reason) => json!({ "edge": e.edge, "error": reason }),
                })
                .collect();
            write_json(&json!({
                "topology": report.topology,
                "single_primary": report.exit_code() == 0,
                "edges": edges,
                "drift": report.drift(),
            }))
        } else {
            write_text(&report.render())
        }
    }
}

fn execute(
    env: &Collaborators<'_>,
    protocol: Protocol,
    local: &Node,
    dry_run: bool,
    confirm: &dyn Confirm,
    output: &Output,
) -> CliResult<i32> {
    // Read only for protocols that stream; never written anywhere.
    let credential = if protocol.needs_credential() {
        ReplicationCredential::from_env(env.config.database.replication_user.clone())
    } else {
        None
    };
    let options = RunOptions {
        credential: credential.as_ref(),
        dry_run,
        confirm,
    };
    let record = failover::run(env, &protocol, local, &options);
    Ok(finish_run(&record, |r| output.run(r)))
}

/// The run's exit status stands even when its result cannot be printed.
fn finish_run(record: &ProtocolRun, print: impl FnOnce(&ProtocolRun) -> CliResult<()>) -> i32 {
    let code = record.exit_code();
    if let Err(err) = print(record) {
        let reason = err.to_string();
        let run_id = record.id.to_string();
        log_event(
            Event::OutputFailed,
            &[("error", reason.as_str()), ("run_id", run_id.as_str())],
        );
    }
    code
}

fn status(
    env: &Collaborators<'_>,
    local: &Node,
    peer: &Node,
    output: &Output,
) -> CliResult<i32> {
    let report = failover::collect_status(env, local, peer);
    output.status(&report)?;
    Ok(report.exit_code())
}
