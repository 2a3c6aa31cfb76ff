//! Container runtime over the remote channel

use super::errors::RuntimeResult;
use super::{Service, ServiceRuntime};
use crate::cluster::{ClusterConfig, Node};
use crate::remote::{RemoteCommand, RemoteError, RemoteExecutor};

pub struct DockerRuntime<'a> {
    exec: &'a dyn RemoteExecutor,
    config: &'a ClusterConfig,
}

impl<'a> DockerRuntime<'a> {
    pub fn new(exec: &'a dyn RemoteExecutor, config: &'a ClusterConfig) -> Self {
        Self { exec, config }
    }

    fn container(&self, service: Service) -> &str {
        match service {
            Service::Database => &self.config.containers.database,
            Service::Application => &self.config.containers.application,
        }
    }

    fn docker(&self, node: &Node, verb: &str, service: Service) -> RuntimeResult<()> {
        self.exec.run_ok(
            &node.fqdn,
            &RemoteCommand::new(["docker", verb, self.container(service)]),
            self.config.timing.command_timeout(),
        )?;
        Ok(())
    }
}

impl ServiceRuntime for DockerRuntime<'_> {
    fn exists(&self, node: &Node, service: Service) -> RuntimeResult<bool> {
        let command = RemoteCommand::new([
            "docker",
            "container",
            "inspect",
            "--format",
            "{{.Name}}",
            self.container(service),
        ]);
        let out = self
            .exec
            .run(&node.fqdn, &command, self.config.timing.command_timeout())?;
        match out.status {
            0 => Ok(true),
            _ if out.stderr.contains("No such") => Ok(false),
            status => Err(RemoteError::Failed {
                host: node.fqdn.clone(),
                program: "docker".to_string(),
                status,
                stderr: out.stderr,
            }
            .into()),
        }
    }

    fn start(&self, node: &Node, service: Service) -> RuntimeResult<()> {
        self.docker(node, "start", service)
    }

    fn stop(&self, node: &Node, service: Service) -> RuntimeResult<()> {
        self.docker(node, "stop", service)
    }

    fn restart(&self, node: &Node, service: Service) -> RuntimeResult<()> {
        self.docker(node, "restart", service)
    }
}
