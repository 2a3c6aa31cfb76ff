//! PostgreSQL in a container, driven over the remote channel
//!
//! The data directory lives on the host and is bind-mounted into the
//! database container, so file edits and the base backup work on host
//! paths while SQL goes through `docker exec`.

use super::credential::ReplicationCredential;
use super::errors::{RuntimeError, RuntimeResult};
use super::hba::HbaFile;
use super::settings::{KeyValueDocument, Style};
use super::DatabaseControl;
use crate::cluster::{ClusterConfig, Node};
use crate::remote::{shell_quote, RemoteCommand, RemoteExecutor};

const CONTAINER_DATA_DIR: &str = "/var/lib/postgresql/data";
const REPLICATION_AUTH_METHOD: &str = "scram-sha-256";

pub struct PostgresControl<'a> {
    exec: &'a dyn RemoteExecutor,
    config: &'a ClusterConfig,
}

impl<'a> PostgresControl<'a> {
    pub fn new(exec: &'a dyn RemoteExecutor, config: &'a ClusterConfig) -> Self {
        Self { exec, config }
    }

    fn psql(&self, sql: &str) -> RemoteCommand {
        RemoteCommand::new([
            "docker",
            "exec",
            self.config.containers.database.as_str(),
            "psql",
            "-U",
            self.config.database.superuser.as_str(),
            "-tAc",
            sql,
        ])
    }

    fn data_path(&self, file: &str) -> String {
        format!("{}/{}", self.config.database.host_data_dir.trim_end_matches('/'), file)
    }

    /// Read a file in the data directory. Only a missing file reads as
    /// empty; any other read failure is an error.
    fn read_data_file(&self, node: &Node, file: &str) -> RuntimeResult<String> {
        let path = shell_quote(&self.data_path(file));
        let script = format!("[ -e {path} ] || exit 0; cat {path}");
        let out = self.exec.run_ok(
            &node.fqdn,
            &RemoteCommand::shell(script),
            self.config.timing.command_timeout(),
        )?;
        Ok(out.stdout)
    }

    /// Replace a file in the data directory, keeping the directory's owner.
    fn write_data_file(&self, node: &Node, file: &str, contents: String) -> RuntimeResult<()> {
        let path = shell_quote(&self.data_path(file));
        let dir = shell_quote(&self.config.database.host_data_dir);
        let script = format!(
            "cat > {path}.tmp && mv {path}.tmp {path} && chown --reference={dir} {path}"
        );
        self.exec.run_ok(
            &node.fqdn,
            &RemoteCommand::shell(script).with_stdin(contents),
            self.config.timing.command_timeout(),
        )?;
        Ok(())
    }
}

impl DatabaseControl for PostgresControl<'_> {
    fn query_role(&self, node: &Node) -> RuntimeResult<String> {
        let out = self.exec.run_ok(
            &node.fqdn,
            &self.psql("SELECT pg_is_in_recovery()"),
            self.config.timing.probe_timeout(),
        )?;
        Ok(out.stdout)
    }

    fn promote(&self, node: &Node) -> RuntimeResult<()> {
        let out = self.exec.run_ok(
            &node.fqdn,
            &self.psql("SELECT pg_promote(false)"),
            self.config.timing.command_timeout(),
        )?;
        match out.stdout.trim() {
            "t" => Ok(()),
            other => Err(RuntimeError::Rejected(format!(
                "pg_promote on {} answered '{}'",
                node.id, other
            ))),
        }
    }

    fn allow_replication(&self, source: &Node, follower: &Node) -> RuntimeResult<()> {
        let mut hba = HbaFile::parse(&self.read_data_file(source, "pg_hba.conf")?);
        let changed = hba.ensure_replication(
            &self.config.database.replication_user,
            &follower.replication_address,
            REPLICATION_AUTH_METHOD,
        );
        if changed {
            self.write_data_file(source, "pg_hba.conf", hba.render())?;
            self.exec.run_ok(
                &source.fqdn,
                &self.psql("SELECT pg_reload_conf()"),
                self.config.timing.command_timeout(),
            )?;
        }
        Ok(())
    }

    fn wipe_data(&self, node: &Node) -> RuntimeResult<()> {
        let dir = self.config.database.host_data_dir.trim_end_matches('/');
        if !dir.starts_with('/') || dir.split('/').filter(|s| !s.is_empty()).count() < 2 {
            return Err(RuntimeError::Rejected(format!(
                "refusing to wipe data directory '{}'",
                self.config.database.host_data_dir
            )));
        }
        self.exec.run_ok(
            &node.fqdn,
            &RemoteCommand::new(["find", dir, "-mindepth", "1", "-delete"]),
            self.config.timing.command_timeout(),
        )?;
        Ok(())
    }

    fn stream_full_copy(
        &self,
        node: &Node,
        source: &Node,
        credential: &ReplicationCredential,
    ) -> RuntimeResult<()> {
        // The password is read from stdin inside the container and lives
        // only in that process's environment.
        let backup = format!(
            "read -r PGPASSWORD; export PGPASSWORD; exec pg_basebackup -h {} -p {} -U {} -D {} -X stream --checkpoint=fast",
            shell_quote(source.db_host()),
            source.db_port,
            shell_quote(credential.user()),
            CONTAINER_DATA_DIR,
        );
        let volume = format!("{}:{}", self.config.database.host_data_dir, CONTAINER_DATA_DIR);
        let command = RemoteCommand::new([
            "docker",
            "run",
            "--rm",
            "-i",
            "--network",
            "host",
            "--user",
            "postgres",
            "-v",
            volume.as_str(),
            self.config.database.image.as_str(),
            "sh",
            "-c",
            backup.as_str(),
        ])
        .with_stdin(format!("{}\n", credential.expose_secret()));

        self.exec
            .run_ok(&node.fqdn, &command, self.config.timing.stream_timeout())?;
        Ok(())
    }

    fn configure_follower(
        &self,
        node: &Node,
        source: &Node,
        credential: &ReplicationCredential,
    ) -> RuntimeResult<()> {
        let mut auto = KeyValueDocument::parse(
            &self.read_data_file(node, "postgresql.auto.conf")?,
            Style::Postgres,
        );
        // No password here: the follower authenticates from its own
        // provisioned passfile.
        auto.set(
            "primary_conninfo",
            &format!(
                "host={} port={} user={} application_name={}",
                source.db_host(),
                source.db_port,
                credential.user(),
                node.id
            ),
        );
        self.write_data_file(node, "postgresql.auto.conf", auto.render())?;
        self.write_data_file(node, "standby.signal", String::new())?;
        Ok(())
    }
}
