//! Application settings and readiness over the remote channel

use super::errors::RuntimeResult;
use super::AppControl;
use crate::cluster::{ClusterConfig, Node};
use crate::remote::{RemoteCommand, RemoteExecutor};

pub struct RemoteAppControl<'a> {
    exec: &'a dyn RemoteExecutor,
    config: &'a ClusterConfig,
}

impl<'a> RemoteAppControl<'a> {
    pub fn new(exec: &'a dyn RemoteExecutor, config: &'a ClusterConfig) -> Self {
        Self { exec, config }
    }
}

impl AppControl for RemoteAppControl<'_> {
    fn read_settings(&self, node: &Node) -> RuntimeResult<String> {
        let out = self.exec.run_ok(
            &node.fqdn,
            &RemoteCommand::read_file(&self.config.application.settings_path),
            self.config.timing.command_timeout(),
        )?;
        Ok(out.stdout)
    }

    fn write_settings(&self, node: &Node, contents: &str) -> RuntimeResult<()> {
        self.exec.run_ok(
            &node.fqdn,
            &RemoteCommand::write_file(&self.config.application.settings_path, contents),
            self.config.timing.command_timeout(),
        )?;
        Ok(())
    }

    fn probe_ready(&self, node: &Node) -> RuntimeResult<bool> {
        let out = self.exec.run(
            &node.fqdn,
            &RemoteCommand::new([
                "curl",
                "-fsS",
                "-o",
                "/dev/null",
                self.config.application.readiness_url.as_str(),
            ]),
            self.config.timing.probe_timeout(),
        )?;
        Ok(out.success())
    }
}
