//! WinHandler GW - host-side gamepad and process-control gateway
//!
//! Serves the guest's UDP protocol and publishes controller state into the
//! shared-memory files the guest maps.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use winhandler_gw::cli;
use winhandler_gw::config::{watcher::ConfigWatcher, AppConfig};
use winhandler_gw::gateway::{Collaborators, Gateway, GatewayOptions};
use winhandler_gw::host::LoggingProcessListener;
use winhandler_gw::paths::AppPaths;

/// WinHandler GW - gamepad, gyro, rumble and process control for an emulated guest
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (defaults to the platform data directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Start an interactive prompt for host→guest commands
    #[arg(long)]
    repl: bool,

    /// Print the default configuration as YAML and exit
    #[arg(long)]
    print_default_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();

    if args.print_default_config {
        print!("{}", AppConfig::default().to_yaml()?);
        return Ok(());
    }

    let paths = AppPaths::detect();
    if let Err(e) = paths.ensure_directories() {
        eprintln!("[paths] {:#}", e);
    }

    let _log_guard = init_logging(&args.log_level, &paths.logs_dir)?;

    info!("Starting WinHandler GW...");
    info!("Base directory: {}", paths.base_dir().display());

    let config_path = args.config.clone().unwrap_or_else(|| paths.config.clone());
    ensure_config_file(&config_path).await?;
    info!("Configuration file: {}", config_path.display());

    // Load configuration with hot-reload watcher
    let (config_watcher, initial_config) = ConfigWatcher::new(config_path.clone()).await?;
    let config = (*initial_config).clone();
    info!("Configuration loaded successfully with hot-reload enabled");

    let shm_dir = config
        .shared_memory
        .directory
        .clone()
        .unwrap_or_else(|| paths.shm_dir.clone());

    let collaborators = Collaborators::from_config(&config);

    let options = GatewayOptions {
        config_path: Some(config_path),
        ..GatewayOptions::new(shm_dir)
    };

    let gateway = Gateway::start(config, collaborators, options).await?;
    gateway
        .handle()
        .set_process_listener(Some(Arc::new(LoggingProcessListener)));

    run_app(&gateway, config_watcher, args.repl).await;

    gateway.stop().await;
    info!("WinHandler GW shutdown complete");
    Ok(())
}

async fn run_app(gateway: &Gateway, mut config_watcher: ConfigWatcher, repl: bool) {
    let handle = gateway.handle();

    let repl_handle = handle.clone();
    let repl = async move {
        if repl {
            if let Err(e) = cli::run_repl(repl_handle).await {
                warn!("REPL ended with error: {:#}", e);
            }
        } else {
            std::future::pending::<()>().await;
        }
    };
    tokio::pin!(repl);

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            Some(new_config) = config_watcher.next_config() => {
                info!("Configuration file changed, reloading...");
                handle.apply_config(new_config);
            }

            _ = &mut repl => {
                info!("REPL closed, stopping");
                break;
            }

            _ = &mut shutdown => {
                info!("Shutdown signal received, stopping event loop");
                break;
            }
        }
    }
}

fn init_logging(level: &str, logs_dir: &Path) -> Result<WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("winhandler-gw")
        .filename_suffix("log")
        .build(logs_dir)
        .with_context(|| format!("Failed to open log directory {}", logs_dir.display()))?;
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(guard)
}

/// Write the default config when none exists yet
async fn ensure_config_file(path: &Path) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    tokio::fs::write(path, AppConfig::default().to_yaml()?)
        .await
        .with_context(|| format!("Failed to write default config to {}", path.display()))?;
    info!("Wrote default configuration to {}", path.display());
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for CTRL+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
