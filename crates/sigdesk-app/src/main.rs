//! sigdesk - entry point.

use anyhow::Result;
use clap::Parser;
use tracing::info;

/// Live trading-signal desk
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via SIGDESK_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // TLS provider must be installed before any socket connects
    sigdesk_ws::init_crypto();

    let args = Args::parse();

    sigdesk_telemetry::init_logging()?;

    info!("Starting sigdesk v{}", env!("CARGO_PKG_VERSION"));

    // CLI arg > SIGDESK_CONFIG > default
    let config_path = args
        .config
        .or_else(|| std::env::var("SIGDESK_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    info!(config_path = %config_path, "Loading configuration");
    let config = sigdesk_app::AppConfig::load(&config_path)?;
    info!(
        socket_url = %config.websocket.url,
        api_base = ?config.api.base_url,
        dashboard = config.dashboard.enabled,
        "Configuration loaded"
    );

    sigdesk_app::Application::new(config).run().await?;

    Ok(())
}
