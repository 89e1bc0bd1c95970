mod cli;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use hostrelay_core::channel::Channel;
use hostrelay_core::config::RelayConfig;
use hostrelay_dialogue::DialogueEngine;
use hostrelay_gateway::{ConsoleChannel, Gateway, ShellExecutor};
use hostrelay_storage::{Database, RecordRepository};

use crate::cli::CliArgs;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    // Load errors are reported once tracing is up.
    let (mut config, load_error) = if config_file.exists() {
        match RelayConfig::load(&config_file) {
            Ok(config) => (config, None),
            Err(e) => (RelayConfig::default(), Some(e)),
        }
    } else {
        (RelayConfig::default(), None)
    };
    if let Some(data_dir) = args.resolve_data_dir() {
        config.general.data_dir = data_dir;
    }
    if let Some(ref target) = args.ssh_target {
        config.host.ssh_target = Some(target.clone());
    }

    // Tracing. RUST_LOG takes precedence over everything else.
    let log_level = args.resolve_log_level(&config.general.log_level);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting hostrelay v{}", env!("CARGO_PKG_VERSION"));
    match load_error {
        Some(e) => tracing::warn!(
            path = %config_file.display(),
            error = %e,
            "Failed to load config, using defaults"
        ),
        None => tracing::info!(path = %config_file.display(), "Configuration resolved"),
    }

    // Storage.
    let db_path = config.database_path();
    let db = Arc::new(Database::new(&db_path)?);
    let store = Arc::new(RecordRepository::new(db));
    tracing::info!(path = %db_path.display(), "SQLite database opened");

    // Dialogue engine.
    let engine = Arc::new(DialogueEngine::new(store.clone(), config.dialogue.clone()));

    // Executors.
    let host_executor = Arc::new(ShellExecutor::new(&config.host));
    let local_executor = Arc::new(ShellExecutor::local(Duration::from_secs(
        config.host.command_timeout_secs,
    )));
    match config.host.ssh_target {
        Some(ref target) => {
            tracing::info!(
                ssh_target = %target,
                port = config.host.ssh_port,
                "Diagnostics run over ssh"
            )
        }
        None => tracing::info!("Diagnostics run on the local host"),
    }

    let gateway = Arc::new(Gateway::new(
        engine,
        store,
        host_executor,
        local_executor,
        config.host.clone(),
    ));

    let channel: Arc<dyn Channel> =
        Arc::new(ConsoleChannel::new(args.user.clone(), args.user.clone()));
    gateway.run(channel).await?;

    tracing::info!("hostrelay stopped");
    Ok(())
}
