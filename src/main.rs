use anyhow::{Context, Result};
use clap::Parser;
use image_proxy::config::Config;
use image_proxy::config_validator::ConfigValidator;
use image_proxy::server::Server;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// On-demand image cache and resize proxy
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, env = "IMAGE_PROXY_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on, overrides the configuration
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// Log level used when RUST_LOG is not set
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(bind) = cli.bind {
        config.bind_addr = bind;
    }
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("image_proxy={},tower_http=debug", config.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    ConfigValidator::validate(&config).context("Invalid configuration")?;

    tracing::info!("Starting image proxy");
    tracing::info!(
        bind_addr = %config.bind_addr,
        max_image_size = config.client.max_image_size,
        max_pixels = config.image.max_pixels,
        throttling = config.throttler.is_some(),
        firewall = config.firewall.is_some(),
        "Configuration loaded"
    );

    let server = Server::new(config).context("Failed to create server")?;
    server.run().await.context("Server error")?;

    Ok(())
}
