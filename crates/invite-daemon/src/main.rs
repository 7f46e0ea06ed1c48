//! Invite Daemon - Join attribution service
//!
//! The daemon provides:
//! - Webhook ingestion of community, invite and member-join events
//! - Attribution of each join to the invite whose usage counter moved
//! - Role grants for mapped invites
//! - REST API for role mappings and cache inspection

use anyhow::Context;
use clap::Parser;
use invite_daemon::{DaemonConfig, Server};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Invite Daemon CLI
#[derive(Parser)]
#[command(name = "invited")]
#[command(about = "Invite Daemon - Join attribution service", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "INVITED_CONFIG")]
    config: Option<String>,

    /// Listen address (overrides config)
    #[arg(short, long, env = "INVITED_LISTEN_ADDR")]
    listen: Option<String>,

    /// Upstream platform API base URL (overrides config)
    #[arg(short, long, env = "INVITED_UPSTREAM_URL")]
    upstream: Option<String>,

    /// Upstream API token
    #[arg(long, env = "INVITED_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Bearer token required by the admin API
    #[arg(long, env = "INVITED_API_TOKEN", hide_env_values = true)]
    api_token: Option<String>,

    /// Log level
    #[arg(long, env = "INVITED_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "INVITED_LOG_JSON")]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = DaemonConfig::load(cli.config.as_deref())
        .context("failed to load configuration")?;

    // Override with CLI args
    if let Some(listen) = &cli.listen {
        config.server.listen_addr = listen
            .parse()
            .with_context(|| format!("invalid listen address: {}", listen))?;
    }
    if let Some(upstream) = cli.upstream {
        config.upstream.base_url = upstream;
    }
    if let Some(token) = cli.token {
        config.upstream.token = token;
    }
    if let Some(api_token) = cli.api_token {
        config.server.api_token = api_token;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    config.logging.json |= cli.json;

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into());

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        listen = %config.server.listen_addr,
        upstream = %config.upstream.base_url,
        "Starting invite daemon"
    );

    let server = Server::new(config).context("failed to start invite daemon")?;
    server.run().await?;

    Ok(())
}
