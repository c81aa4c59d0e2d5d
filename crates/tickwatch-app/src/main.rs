//! tickwatch - price threshold monitor service.

use anyhow::Result;
use clap::Parser;
use tracing::info;

/// Watches live quotes and fires alerts or orders when thresholds are crossed.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via TICKWATCH_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tickwatch_ws::init_crypto();

    let args = Args::parse();
    let (config, config_path) = tickwatch_app::AppConfig::load(args.config)?;

    tickwatch_telemetry::init_logging(&config.telemetry.log_filter)?;
    info!(
        config_path = %config_path,
        version = env!("CARGO_PKG_VERSION"),
        "Starting tickwatch"
    );

    let app = tickwatch_app::Application::new(config)?;
    app.run().await?;

    Ok(())
}
