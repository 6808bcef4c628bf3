//! shipit server binary.

use anyhow::Context;
use bollard::Docker;
use clap::Parser;
use shipit_api::{AppState, routes};
use shipit_config::load_deploy_config;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "shipit-server", about = "Continuous deployment trigger")]
struct Args {
    /// Path to the deployment configuration.
    #[arg(long, env = "SHIPIT_CONFIG", default_value = "shipit.kdl")]
    config: PathBuf,

    /// Address to listen on.
    #[arg(long, env = "SHIPIT_LISTEN", default_value = "0.0.0.0:3000")]
    listen: SocketAddr,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = load_deploy_config(&args.config)
        .with_context(|| format!("failed to load {}", args.config.display()))?;
    info!(
        deployment = %config.name,
        branch = %config.trigger.branch,
        registry = %config.registry.host,
        "Configuration loaded"
    );

    let docker =
        Docker::connect_with_local_defaults().context("failed to connect to Docker daemon")?;

    let webhook_secret = std::env::var("SHIPIT_WEBHOOK_SECRET").ok();
    if webhook_secret.is_none() {
        warn!("SHIPIT_WEBHOOK_SECRET is not set, webhook deliveries will not be verified");
    }

    let state = AppState::with_docker(config, docker, webhook_secret);

    let app = routes::router(state).layer(TraceLayer::new_for_http());

    info!(addr = %args.listen, "Starting server");
    let listener = TcpListener::bind(args.listen).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
