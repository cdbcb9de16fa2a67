//! `tabfocus host`: the process the browser launches for native messaging
use anyhow::{Context, Result};
use std::sync::Arc;
use tabfocus_core::{config::get_data_dir, daemon, Config};
use tabfocus_storage::Database;

/// Log to `<data dir>/tabfocus.log`; stdout carries protocol frames.
pub fn setup_host_logging() -> Result<()> {
    use std::fs::{create_dir_all, OpenOptions};

    let log_path = get_data_dir()?.join("tabfocus.log");

    if let Some(parent) = log_path.parent() {
        create_dir_all(parent)?;
    }

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Pipe(Box::new(log_file)))
        .format_timestamp_secs()
        .init();

    Ok(())
}

pub async fn run_host(config: Config, headless: bool) -> Result<()> {
    let db_path = config.database_path()?;
    let socket = config.socket_path()?;
    let store = Arc::new(
        Database::new(Some(db_path.clone()))
            .with_context(|| format!("Failed to open database {}", db_path.display()))?,
    );
    log::info!("Using database {}", db_path.display());

    if headless {
        daemon::run_headless(config, store, Some(socket)).await
    } else {
        daemon::run_native(
            config,
            store,
            tokio::io::stdin(),
            tokio::io::stdout(),
            Some(socket),
        )
        .await
    }
}
