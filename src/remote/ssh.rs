//! ssh-backed executor
//!
//! Commands for the initiating host run locally through `sh -c`; every
//! other host is reached with `ssh` in batch mode. Each call blocks the
//! caller until the child exits or its timeout fires, in which case the
//! child is killed.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::runtime::{Builder, Runtime};

use super::command::{CommandOutput, RemoteCommand};
use super::errors::{RemoteError, RemoteResult};
use super::RemoteExecutor;
use crate::cluster::SshSettings;

/// ssh exits with this status for its own failures, but a remote
/// command may exit with it too.
const SSH_TRANSPORT_FAILURE: i32 = 255;

/// Diagnostics ssh itself prints when it cannot open a session.
const SSH_DIAGNOSTICS: &[&str] = &[
    "ssh:",
    "Connection refused",
    "Connection timed out",
    "Connection closed by",
    "Connection reset by",
    "No route to host",
    "Could not resolve hostname",
    "Host key verification failed",
    "Permission denied (",
    "kex_exchange_identification",
];

/// Status 255 with no output and an ssh diagnostic on stderr. Anything
/// else came from the remote command.
fn is_transport_failure(status: i32, stdout: &[u8], stderr: &str) -> bool {
    status == SSH_TRANSPORT_FAILURE
        && stdout.is_empty()
        && SSH_DIAGNOSTICS.iter().any(|d| stderr.contains(d))
}

pub struct SshExecutor {
    runtime: Runtime,
    local_host: String,
    user: Option<String>,
    connect_timeout_secs: u64,
}

impl SshExecutor {
    /// `local_host` is the FQDN of the node this process runs on.
    pub fn new(local_host: impl Into<String>, settings: &SshSettings) -> RemoteResult<Self> {
        let local_host = local_host.into();
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| RemoteError::Spawn {
                host: local_host.clone(),
                detail: format!("failed to create tokio runtime: {}", e),
            })?;
        Ok(Self {
            runtime,
            local_host,
            user: settings.user.clone(),
            connect_timeout_secs: settings.connect_timeout_secs,
        })
    }

    fn is_local(&self, host: &str) -> bool {
        host == self.local_host || host == "localhost"
    }

    fn build(&self, host: &str, command: &RemoteCommand) -> Command {
        let mut process = if self.is_local(host) {
            let mut p = Command::new("sh");
            p.arg("-c").arg(command.shell_line());
            p
        } else {
            let target = match &self.user {
                Some(user) => format!("{}@{}", user, host),
                None => host.to_string(),
            };
            let mut p = Command::new("ssh");
            p.args(["-o", "BatchMode=yes", "-o"])
                .arg(format!("ConnectTimeout={}", self.connect_timeout_secs))
                .arg(target)
                .arg("--")
                .arg(command.shell_line());
            p
        };
        process
            .stdin(if command.stdin().is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        process
    }

    async fn run_async(
        &self,
        host: &str,
        command: &RemoteCommand,
    ) -> RemoteResult<std::process::Output> {
        let mut child = self.build(host, command).spawn().map_err(|e| RemoteError::Spawn {
            host: host.to_string(),
            detail: e.to_string(),
        })?;

        if let (Some(input), Some(mut stdin)) = (command.stdin(), child.stdin.take()) {
            stdin
                .write_all(input.as_bytes())
                .await
                .map_err(|e| RemoteError::Spawn {
                    host: host.to_string(),
                    detail: format!("failed to write stdin: {}", e),
                })?;
            // Dropping closes the pipe so the remote side sees EOF.
            drop(stdin);
        }

        child.wait_with_output().await.map_err(|e| RemoteError::Spawn {
            host: host.to_string(),
            detail: e.to_string(),
        })
    }
}

impl RemoteExecutor for SshExecutor {
    fn run(
        &self,
        host: &str,
        command: &RemoteCommand,
        timeout: Duration,
    ) -> RemoteResult<CommandOutput> {
        let result = self
            .runtime
            .block_on(async { tokio::time::timeout(timeout, self.run_async(host, command)).await });

        let output = match result {
            Ok(output) => output?,
            Err(_) => {
                return Err(RemoteError::Timeout {
                    host: host.to_string(),
                    program: command.program().to_string(),
                    after: timeout,
                })
            }
        };

        let status = output.status.code().unwrap_or(-1);
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        if !self.is_local(host) && is_transport_failure(status, &output.stdout, &stderr) {
            return Err(RemoteError::Unreachable {
                host: host.to_string(),
                detail: stderr,
            });
        }

        Ok(CommandOutput {
            status,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local() -> SshExecutor {
        SshExecutor::new("idp1.example.org", &SshSettings::default()).unwrap()
    }

    #[test]
    fn test_local_command_runs_without_ssh() {
        let exec = local();
        let out = exec
            .run(
                "idp1.example.org",
                &RemoteCommand::new(["echo", "t"]),
                Duration::from_secs(5),
            )
            .unwrap();
        assert!(out.success());
        assert_eq!(out.stdout.trim(), "t");
    }

    #[test]
    fn test_stdin_is_delivered() {
        let exec = local();
        let cmd = RemoteCommand::shell("read -r LINE; echo \"got $LINE\"").with_stdin("secret\n");
        let out = exec.run("localhost", &cmd, Duration::from_secs(5)).unwrap();
        assert_eq!(out.stdout.trim(), "got secret");
    }

    #[test]
    fn test_nonzero_exit_is_reported_not_raised() {
        let exec = local();
        let out = exec
            .run("localhost", &RemoteCommand::shell("exit 3"), Duration::from_secs(5))
            .unwrap();
        assert_eq!(out.status, 3);
    }

    #[test]
    fn test_transport_failure_needs_ssh_diagnostic() {
        assert!(is_transport_failure(
            255,
            b"",
            "ssh: connect to host idp1.example.org port 22: Connection refused"
        ));
        assert!(is_transport_failure(
            255,
            b"",
            "Permission denied (publickey)."
        ));
        // The remote command chose 255 itself.
        assert!(!is_transport_failure(255, b"", "psql: error: fatal"));
        assert!(!is_transport_failure(255, b"partial\n", "ssh: Connection closed by"));
        assert!(!is_transport_failure(1, b"", "ssh: Connection refused"));
    }

    #[test]
    fn test_local_exit_255_is_a_command_failure() {
        let exec = local();
        let out = exec
            .run("localhost", &RemoteCommand::shell("echo 'ssh: fake' >&2; exit 255"), Duration::from_secs(5))
            .unwrap();
        assert_eq!(out.status, 255);
    }

    #[test]
    fn test_timeout_kills_child() {
        let exec = local();
        let err = exec
            .run("localhost", &RemoteCommand::new(["sleep", "5"]), Duration::from_millis(50))
            .unwrap_err();
        assert!(matches!(err, RemoteError::Timeout { .. }));
        assert!(err.is_no_answer());
    }
}
