//! krakenhashes scheduler daemon — loads config, opens the Postgres pool,
//! and runs the scheduler tick, stale-task monitor, retention worker, and
//! reconnect-grace sweeper until told to shut down.

use anyhow::{Context, Result};
use kh_core::config::Config;
use kh_daemon::SchedulerDaemon;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("failed to load config ({e}), using defaults");
        Config::default()
    });

    kh_telemetry::init_logging("kh-daemon", "info");
    info!(version = env!("CARGO_PKG_VERSION"), pid = std::process::id(), "kh-daemon starting");

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await
        .with_context(|| format!("failed to connect to database at {}", config.database.url))?;

    let daemon = SchedulerDaemon::new(config, pool);
    let shutdown = daemon.shutdown_handle();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            return;
        }
        info!("ctrl-c received, initiating shutdown");
        shutdown.trigger();
    });

    daemon.run_loops().await;

    info!("kh-daemon stopped");
    Ok(())
}
