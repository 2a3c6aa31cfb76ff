//! Remote command description

use std::fmt;

/// A command to run on a target host.
///
/// `stdin` is fed to the process and then closed. Secrets travel only
/// this way, so they never appear in an argument list or on disk.
#[derive(Clone, PartialEq, Eq)]
pub struct RemoteCommand {
    argv: Vec<String>,
    stdin: Option<String>,
}

impl RemoteCommand {
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            stdin: None,
        }
    }

    /// `sh -c <script>` on the target.
    pub fn shell(script: impl Into<String>) -> Self {
        Self::new(["sh".to_string(), "-c".to_string(), script.into()])
    }

    /// Print a file on the target.
    pub fn read_file(path: &str) -> Self {
        Self::new(["cat", path])
    }

    /// Replace a file on the target with `contents`, via a temporary file
    /// and a rename so readers never see a half-written document.
    pub fn write_file(path: &str, contents: impl Into<String>) -> Self {
        let p = shell_quote(path);
        Self::shell(format!("cat > {p}.tmp && mv {p}.tmp {p}")).with_stdin(contents)
    }

    pub fn with_stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    pub fn stdin(&self) -> Option<&str> {
        self.stdin.as_deref()
    }

    /// First word, for error messages.
    pub fn program(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or("")
    }

    /// Single shell line with every argument quoted.
    pub fn shell_line(&self) -> String {
        self.argv
            .iter()
            .map(|a| shell_quote(a))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Debug for RemoteCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteCommand")
            .field("argv", &self.argv)
            .field("stdin", &self.stdin.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Quote one argument for a POSIX shell.
pub fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_@%+=:,./-".contains(c));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("docker"), "docker");
        assert_eq!(shell_quote("/srv/idp/pgdata"), "/srv/idp/pgdata");
        assert_eq!(shell_quote("SELECT 1"), "'SELECT 1'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote(""), "''");
    }

    #[test]
    fn test_shell_line() {
        let cmd = RemoteCommand::new(["psql", "-tAc", "SELECT pg_is_in_recovery()"]);
        assert_eq!(cmd.shell_line(), "psql -tAc 'SELECT pg_is_in_recovery()'");
        assert_eq!(cmd.program(), "psql");
    }

    #[test]
    fn test_write_file_uses_rename() {
        let cmd = RemoteCommand::write_file("/etc/edge/idp config.json", "{}");
        assert_eq!(cmd.argv()[0], "sh");
        assert_eq!(
            cmd.argv()[2],
            "cat > '/etc/edge/idp config.json'.tmp && mv '/etc/edge/idp config.json'.tmp '/etc/edge/idp config.json'"
        );
        assert_eq!(cmd.stdin(), Some("{}"));
    }

    #[test]
    fn test_debug_redacts_stdin() {
        let cmd = RemoteCommand::shell("read -r PGPASSWORD").with_stdin("s3cret\n");
        let debug = format!("{:?}", cmd);
        assert!(!debug.contains("s3cret"));
        assert!(debug.contains("<redacted>"));
        assert_eq!(cmd.stdin(), Some("s3cret\n"));
    }
}
