use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use aic_core::config::CoreConfig;
use aic_core::telemetry::init_logging;
use aic_core::CoreServices;

#[derive(Parser)]
#[command(name = "aic-cored", version, about = "AI request coordination daemon")]
struct Cli {
    /// Path to a TOML config file. Falls back to defaults plus env overrides.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory to also write a rolling-free log file into.
    #[arg(long)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server and background sweep loop.
    Serve,
    /// Validate configuration and exit.
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = CoreConfig::load(cli.config.as_deref())?;
    let _log_guard = init_logging(&config.log_level, cli.log_dir.as_deref())?;

    match cli.command {
        Command::CheckConfig => {
            println!("{config:#?}");
            Ok(())
        }
        Command::Serve => serve(config).await,
    }
}

async fn serve(config: CoreConfig) -> Result<()> {
    let host = config.host.clone();
    let port = config.port;
    let sweep_interval = Duration::from_secs(config.sweep_interval_seconds);

    let services = Arc::new(CoreServices::build(config).await?);

    let sweep_services = services.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        loop {
            ticker.tick().await;
            let claimed = sweep_services.scheduler.sweep(chrono::Utc::now());
            if !claimed.is_empty() {
                info!(count = claimed.len(), "sweep claimed scheduled jobs");
            }
        }
    });

    let app = aic_core::server::router(services);
    let listener = tokio::net::TcpListener::bind(format!("{host}:{port}")).await?;
    info!(%host, port, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}
