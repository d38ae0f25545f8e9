//! Monitor agent entry point: wires the store, executor registry, runner,
//! bus, scheduler, cleaner, and notifier together on the shared `tokio`
//! runtime, then waits for a shutdown signal.

use clap::Parser;
use mon_bus::Bus;
use mon_config::{Args, RuntimeConfig};
use mon_executors::ExecutorRegistry;
use mon_notifier::{LoggingSink, TelegramConfig, TelegramSink};
use mon_scheduler::{join_all_dispatches, Cleaner, ExecuteChecksHandler, Scheduler};
use mon_store::{SqliteStore, Store};
use sqlx::sqlite::SqlitePoolOptions;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info};

const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    if let Some(level) = &args.log_level {
        if std::env::var("RUST_LOG").is_err() {
            std::env::set_var("RUST_LOG", level);
        }
    }
    mon_common::logging::init_logging("monitor-agent");

    let config = match RuntimeConfig::resolve(args) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "failed to resolve configuration");
            return ExitCode::from(1);
        }
    };

    let telegram_config = if config.enable_telegram {
        match TelegramConfig::from_env() {
            Ok(telegram) => Some(telegram),
            Err(e) => {
                error!(error = %e, "--enable-telegram was set but telegram is not configured");
                return ExitCode::from(1);
            }
        }
    } else {
        None
    };

    match run(config, telegram_config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "monitor-agent exited with an error");
            ExitCode::from(2)
        }
    }
}

async fn run(config: RuntimeConfig, telegram_config: Option<TelegramConfig>) -> anyhow::Result<()> {
    info!(db = %config.db_path.display(), poll_interval = ?config.poll_interval, "starting monitor-agent");

    let db_url = format!("sqlite://{}?mode=rwc", config.db_path.display());
    let pool = SqlitePoolOptions::new().max_connections(8).connect(&db_url).await?;
    let store: Arc<dyn Store> = Arc::new(SqliteStore::new(pool));
    store.init_schema().await?;

    let reconciled = store.reconcile_startup().await?;
    if reconciled > 0 {
        info!(count = reconciled, "reconciled checks left processing by a prior run");
    }

    let bus = Bus::new();
    bus.register_listener(Arc::new(LoggingSink));
    if let Some(telegram) = telegram_config {
        bus.register_listener(Arc::new(TelegramSink::new(reqwest::Client::new(), telegram)));
        info!("telegram notifier enabled");
    }

    let registry = Arc::new(ExecutorRegistry::with_defaults());
    let handler = Arc::new(ExecuteChecksHandler::new(store.clone(), registry, config.max_concurrency));
    bus.register_command_handler(handler);

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let scheduler = Scheduler::new(store.clone(), bus.clone(), config.poll_interval);
    let dispatch_tasks = scheduler.dispatch_tasks();
    let scheduler_handle = {
        let shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move { scheduler.run(shutdown_rx).await })
    };

    let cleaner_handle = if config.disable_cleaner {
        info!("cleaner disabled via --disable-cleaner");
        None
    } else {
        let cleaner = Cleaner::new(
            store.clone(),
            config.cleanup_interval,
            config.retention_period,
            config.batch_size,
        );
        let shutdown_rx = shutdown_tx.subscribe();
        Some(tokio::spawn(async move { cleaner.run(shutdown_rx).await }))
    };

    shutdown_signal().await;
    info!("shutdown signal received, stopping scheduler and cleaner");
    let _ = shutdown_tx.send(());

    let shutdown_result = tokio::time::timeout(SHUTDOWN_GRACE_PERIOD, async {
        let _ = scheduler_handle.await;
        join_all_dispatches(dispatch_tasks).await;
        if let Some(handle) = cleaner_handle {
            let _ = handle.await;
        }
    })
    .await;

    if shutdown_result.is_err() {
        error!("graceful shutdown grace period elapsed; exiting anyway");
    }

    info!("monitor-agent shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
