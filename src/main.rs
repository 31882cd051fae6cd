use clap::Parser;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_appender::rolling;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use uptime_sentinel::alerting::{MaintenanceSuppressor, StatusResolver};
use uptime_sentinel::db::retention::{RetentionManager, RetentionMode};
use uptime_sentinel::db::{MonitorStore, SeaOrmStore};
use uptime_sentinel::monitoring::{HttpProber, MonitorScheduler};
use uptime_sentinel::notifications::NotificationService;
use uptime_sentinel::server::ServerConfig;
use uptime_sentinel::version::VERSION;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<String>,
}

fn init_logging(log_dir: &str) {
    // Log to a file: JSON format, daily rotation
    let file_appender = rolling::daily(log_dir, "sentinel.log");
    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .json();

    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sea_orm=warn,sqlx::query=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Plain version output without going through clap.
    if std::env::args().any(|arg| arg == "--version") {
        println!("uptime-sentinel version: {VERSION}");
        return Ok(());
    }

    let args = Args::parse();

    let config = match ServerConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return Err(e.into());
        }
    };

    init_logging(&config.log_dir);
    info!("Starting uptime-sentinel, version: {}", VERSION);

    let store: Arc<dyn MonitorStore> = Arc::new(SeaOrmStore::connect(&config.database_url, 10).await?);
    info!("Database connection established.");

    let prober = Arc::new(HttpProber::new(
        config.probe_timeout(),
        config.snippet_limit,
        config.user_agent.clone(),
    )?);
    let notifier = Arc::new(NotificationService::new(
        config.alert_message_template.clone(),
        config.probe_timeout(),
    )?);
    let retention = Arc::new(RetentionManager::new(store.clone(), config.retention_policy()));

    let mut resolver = StatusResolver::new(
        store.clone(),
        MaintenanceSuppressor::new(store.clone()),
        notifier,
    );
    if config.retention_mode == RetentionMode::OnWrite {
        resolver = resolver.with_retention_on_write(retention.clone());
    }

    let scheduler = Arc::new(MonitorScheduler::new(
        store.clone(),
        prober,
        Arc::new(resolver),
        config.scheduler_settings(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let mut tasks = vec![tokio::spawn(scheduler.run(shutdown_rx.clone()))];

    if config.retention_mode == RetentionMode::Scheduled {
        tasks.push(tokio::spawn(
            retention.run_periodic(config.retention_sweep_interval(), shutdown_rx),
        ));
    }

    tokio::signal::ctrl_c().await?;
    info!("Ctrl-C received, shutting down.");
    if shutdown_tx.send(()).is_err() {
        warn!("No background task was listening for shutdown.");
    }
    for task in tasks {
        if let Err(e) = task.await {
            error!(error = %e, "Background task ended abnormally.");
        }
    }

    info!("uptime-sentinel stopped.");
    Ok(())
}
