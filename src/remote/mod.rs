//! Remote execution channel
//!
//! Every interaction with a node or an edge proxy is one synchronous
//! call with its own timeout. What a timeout means is decided by the
//! caller: a read probe treats it as Unreachable, a mutation treats it
//! as fatal.

mod command;
mod errors;
mod ssh;

use std::time::Duration;

pub use command::{shell_quote, CommandOutput, RemoteCommand};
pub use errors::{RemoteError, RemoteResult};
pub use ssh::SshExecutor;

/// Runs a command on a host and waits for it.
pub trait RemoteExecutor {
    /// Run `command` on `host`. A non-zero exit is returned as output,
    /// not as an error.
    fn run(&self, host: &str, command: &RemoteCommand, timeout: Duration)
        -> RemoteResult<CommandOutput>;

    /// Run `command` and treat a non-zero exit as `RemoteError::Failed`.
    fn run_ok(
        &self,
        host: &str,
        command: &RemoteCommand,
        timeout: Duration,
    ) -> RemoteResult<CommandOutput> {
        let output = self.run(host, command, timeout)?;
        if output.success() {
            Ok(output)
        } else {
            Err(RemoteError::Failed {
                host: host.to_string(),
                program: command.program().to_string(),
                status: output.status,
                stderr: output.stderr,
            })
        }
    }
}
