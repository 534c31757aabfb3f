//! Binary entry point: loads configuration, builds the
//! [`meridian_router::gateway::Gateway`], starts its background tasks, and
//! serves the operator HTTP surface until interrupted.

use clap::Parser;
use meridian_gateway::config::Config;
use meridian_gateway::server::create_server;
use meridian_router::gateway::Gateway;
use std::net::SocketAddr;
use std::sync::Arc;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    /// Port to bind the operator HTTP server to. Overrides the config file.
    #[arg(short, long)]
    port: Option<u16>,

    /// Host address to bind to. Overrides the config file.
    #[arg(long)]
    host: Option<String>,

    /// Logging level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt().with_env_filter(&args.log_level).init();

    let mut config = Config::load(&args.config)?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let gateway = Arc::new(Gateway::new(config.to_gateway_config()).await);
    gateway.start_background_tasks();

    let timeout = std::time::Duration::from_secs(config.gateway.timeout_secs);
    let app = create_server(gateway.clone(), timeout);

    let addr = SocketAddr::new(config.server.host.parse()?, config.server.port);
    tracing::info!(%addr, "starting operator server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    gateway.stop_background_tasks().await;
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install Ctrl+C handler");
    tracing::info!("shutdown signal received");
}
