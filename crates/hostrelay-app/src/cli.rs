//! CLI argument definitions for the hostrelay binary.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::Parser;
use std::path::PathBuf;

/// hostrelay: a chat-driven operator console for one managed host.
#[derive(Parser, Debug)]
#[command(name = "hostrelay", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Data directory holding the SQLite database.
    #[arg(short = 'd', long = "data-dir")]
    pub data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    /// Managed host as `user@host`; overrides `host.ssh_target`.
    #[arg(long = "ssh-target")]
    pub ssh_target: Option<String>,

    /// Identity of console input lines not addressed with `@name`.
    #[arg(short = 'u', long = "user", default_value = "operator")]
    pub user: String,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > HOSTRELAY_CONFIG env var > ~/.hostrelay/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("HOSTRELAY_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Data directory override, if given.
    pub fn resolve_data_dir(&self) -> Option<String> {
        self.data_dir
            .as_ref()
            .map(|p| p.to_string_lossy().to_string())
    }

    /// Log filter directive.
    ///
    /// Priority: --log-level flag > config file value > "info".
    pub fn resolve_log_level(&self, config_level: &str) -> String {
        if let Some(ref level) = self.log_level {
            return level.clone();
        }
        if !config_level.is_empty() {
            return config_level.to_string();
        }
        "info".to_string()
    }
}

fn default_config_path() -> PathBuf {
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".hostrelay").join("config.toml");
    }
    PathBuf::from("config.toml")
}
