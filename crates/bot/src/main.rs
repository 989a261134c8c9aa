//! Up/Down hammer-window taker bot — entry point.

use anyhow::Result;
use clap::Parser;
use tracing::info;
use updown_bot::config::{LogFormat, RuntimeConfig};
use updown_bot::Application;

/// Up/Down hammer-window oracle/spot dislocation taker bot.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via UPDOWN_CONFIG env var).
    #[arg(short, long)]
    config: Option<String>,

    /// Force dry-run trading regardless of what the config file says.
    #[arg(long)]
    dry_run: bool,

    /// Log output format, overriding the config file's `logging.format`.
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize TLS crypto provider before any WebSocket connection is made.
    updown_ws::init_crypto();

    let args = Args::parse();

    let config_path = args
        .config
        .clone()
        .or_else(|| std::env::var("UPDOWN_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    let mut config = RuntimeConfig::from_file(&config_path)?;
    if let Some(format) = args.log_format {
        config.logging.format = format;
    }
    if args.dry_run {
        config.force_dry_run = true;
    }

    let json = matches!(config.logging.format, LogFormat::Json);
    updown_telemetry::init_logging_with_format(json)?;

    info!("starting updown-bot v{}", env!("CARGO_PKG_VERSION"));
    info!(config_path = %config_path, dry_run = config.dry_run(), "configuration loaded");

    let mut app = Application::new(config)?;

    info!("running preflight checks");
    app.run_preflight().await?;

    app.run().await?;

    Ok(())
}
