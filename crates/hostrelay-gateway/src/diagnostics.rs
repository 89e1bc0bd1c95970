//! Read-only diagnostic queries and the executor that runs them.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use hostrelay_core::config::HostConfig;
use hostrelay_core::error::{RelayError, Result};

/// A fixed, read-only query against the managed host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticQuery {
    Release,
    Uname,
    Uptime,
    Df,
    Free,
    Mpstat,
    W,
    Auths,
    Critical,
    Ps,
    Ss,
    Services,
    /// Installed packages, or one package when a name is given.
    AptList(Option<String>),
}

impl DiagnosticQuery {
    /// Map a command name (without the slash) and its arguments.
    pub fn from_command(name: &str, args: &str) -> Option<Self> {
        let query = match name {
            "get_release" => DiagnosticQuery::Release,
            "get_uname" => DiagnosticQuery::Uname,
            "get_uptime" => DiagnosticQuery::Uptime,
            "get_df" => DiagnosticQuery::Df,
            "get_free" => DiagnosticQuery::Free,
            "get_mpstat" => DiagnosticQuery::Mpstat,
            "get_w" => DiagnosticQuery::W,
            "get_auths" => DiagnosticQuery::Auths,
            "get_critical" => DiagnosticQuery::Critical,
            "get_ps" => DiagnosticQuery::Ps,
            "get_ss" => DiagnosticQuery::Ss,
            "get_services" => DiagnosticQuery::Services,
            "get_apt_list" => {
                let package = args.split_whitespace().collect::<Vec<_>>().join(" ");
                DiagnosticQuery::AptList((!package.is_empty()).then_some(package))
            }
            _ => return None,
        };
        Some(query)
    }

    pub fn command_name(&self) -> &'static str {
        match self {
            DiagnosticQuery::Release => "get_release",
            DiagnosticQuery::Uname => "get_uname",
            DiagnosticQuery::Uptime => "get_uptime",
            DiagnosticQuery::Df => "get_df",
            DiagnosticQuery::Free => "get_free",
            DiagnosticQuery::Mpstat => "get_mpstat",
            DiagnosticQuery::W => "get_w",
            DiagnosticQuery::Auths => "get_auths",
            DiagnosticQuery::Critical => "get_critical",
            DiagnosticQuery::Ps => "get_ps",
            DiagnosticQuery::Ss => "get_ss",
            DiagnosticQuery::Services => "get_services",
            DiagnosticQuery::AptList(_) => "get_apt_list",
        }
    }

    /// Shell command line run on the host. User input is quoted.
    pub fn shell_command(&self) -> String {
        let fixed = match self {
            DiagnosticQuery::Release => "lsb_release -a",
            DiagnosticQuery::Uname => "uname -a",
            DiagnosticQuery::Uptime => "uptime",
            DiagnosticQuery::Df => "df -h",
            DiagnosticQuery::Free => "free -h",
            DiagnosticQuery::Mpstat => "mpstat | head -n 5",
            DiagnosticQuery::W => "w",
            DiagnosticQuery::Auths => "last -n 10",
            DiagnosticQuery::Critical => "journalctl -p 2 -n 5",
            DiagnosticQuery::Ps => "ps aux | head -n 5",
            DiagnosticQuery::Ss => "ss -tulwn",
            DiagnosticQuery::Services => "systemctl list-units --type=service | head -n 5",
            DiagnosticQuery::AptList(Some(package)) => {
                return format!("apt list {}", shell_quote(package));
            }
            DiagnosticQuery::AptList(None) => "apt list --installed | head -n 10",
        };
        fixed.to_string()
    }
}

/// Command line for the replication log excerpt.
pub fn repl_logs_command(path: &str, lines: u32) -> String {
    format!("cat {} | grep repl | tail -n {}", shell_quote(path), lines)
}

/// Quote `s` for a POSIX shell. Strings made only of safe characters are
/// returned as-is.
pub fn shell_quote(s: &str) -> String {
    let safe = !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || "@%+=:,./-_".contains(c));
    if safe {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', "'\"'\"'"))
}

/// Captured result of one command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code; `None` when the process was killed by a signal.
    pub status: Option<i32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

/// Runs shell command lines somewhere.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn run(&self, command: &str) -> Result<CommandOutput>;
}

#[derive(Debug, Clone)]
struct SshTarget {
    target: String,
    port: u16,
}

/// Executes commands with `sh -c`, over `ssh` when a target is configured.
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    ssh: Option<SshTarget>,
    timeout: Duration,
}

impl ShellExecutor {
    /// Executor for the managed host described by `config`.
    pub fn new(config: &HostConfig) -> Self {
        Self {
            ssh: config.ssh_target.as_ref().map(|target| SshTarget {
                target: target.clone(),
                port: config.ssh_port,
            }),
            timeout: Duration::from_secs(config.command_timeout_secs),
        }
    }

    /// Executor for the relay host itself.
    pub fn local(timeout: Duration) -> Self {
        Self { ssh: None, timeout }
    }

    pub fn is_remote(&self) -> bool {
        self.ssh.is_some()
    }

    fn build(&self, command: &str) -> Command {
        let mut cmd = match &self.ssh {
            Some(ssh) => {
                let mut cmd = Command::new("ssh");
                cmd.arg("-p")
                    .arg(ssh.port.to_string())
                    .arg("-o")
                    .arg("BatchMode=yes")
                    .arg(&ssh.target)
                    .arg("--")
                    .arg(command);
                cmd
            }
            None => {
                let mut cmd = Command::new("sh");
                cmd.arg("-c").arg(command);
                cmd
            }
        };
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl CommandExecutor for ShellExecutor {
    async fn run(&self, command: &str) -> Result<CommandOutput> {
        debug!(command, remote = self.is_remote(), "Running command");

        let output = tokio::time::timeout(self.timeout, self.build(command).output())
            .await
            .map_err(|_| {
                warn!(command, timeout_secs = self.timeout.as_secs(), "Command timed out");
                RelayError::Executor(format!(
                    "command timed out after {}s",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| RelayError::Executor(format!("failed to spawn command: {}", e)))?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            status: output.status.code(),
        })
    }
}
