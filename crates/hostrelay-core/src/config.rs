use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;

/// Top-level configuration for the relay.
///
/// Loaded from `~/.hostrelay/config.toml` by default. Every section falls
/// back to its defaults when absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub host: HostConfig,
    #[serde(default)]
    pub dialogue: DialogueConfig,
}

impl RelayConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: RelayConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Full path of the SQLite database file, with `~` expanded.
    pub fn database_path(&self) -> PathBuf {
        expand_home(&self.general.data_dir).join(&self.storage.database_file)
    }
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(rest)
    } else {
        PathBuf::from(path)
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory holding the SQLite database.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.hostrelay/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Persistent store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file name, relative to `general.data_dir`.
    pub database_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_file: "hostrelay.db".to_string(),
        }
    }
}

/// Managed host configuration for diagnostic commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// `user@host` to reach over ssh. Commands run locally when unset.
    pub ssh_target: Option<String>,
    /// ssh port.
    pub ssh_port: u16,
    /// Per-command timeout in seconds.
    pub command_timeout_secs: u64,
    /// PostgreSQL log file scanned by `get_repl_logs` (read on the relay host).
    pub repl_log_path: String,
    /// Number of replication log lines returned.
    pub repl_log_lines: u32,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            ssh_target: None,
            ssh_port: 22,
            command_timeout_secs: 30,
            repl_log_path: "/var/log/postgresql/postgresql.log".to_string(),
            repl_log_lines: 15,
        }
    }
}

/// What happens when a user re-enters a workflow that is still in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReentryPolicy {
    /// Drop the running session and start over.
    #[default]
    Reset,
    /// Keep the running session and refuse the new entry.
    Reject,
}

/// Conversation workflow settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DialogueConfig {
    /// Idle seconds before an unfinished session is dropped. 0 disables expiry.
    pub session_idle_timeout_secs: u64,
    /// Re-prompts allowed at the yes/no question before the session is
    /// abandoned. 0 means unlimited.
    pub max_reprompts: u32,
    /// Behavior on re-entry into an active workflow.
    pub reentry: ReentryPolicy,
    /// Seconds between idle-session sweeps.
    pub expiry_sweep_interval_secs: u64,
}

impl Default for DialogueConfig {
    fn default() -> Self {
        Self {
            session_idle_timeout_secs: 900,
            max_reprompts: 0,
            reentry: ReentryPolicy::Reset,
            expiry_sweep_interval_secs: 60,
        }
    }
}
