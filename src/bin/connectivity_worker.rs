use anyhow::{Context, Result};
use thingbridge::config::Config;
use thingbridge::httppush::ReqwestPushFactory;
use thingbridge::model::Connection;
use thingbridge::supervisor::ConnectionSupervisor;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Connectivity worker starting...");

    let config = Config::from_env()?;

    let connection_file =
        std::env::var("CONNECTION_FILE").context("CONNECTION_FILE must point to a connection definition")?;
    let connection_json =
        std::fs::read_to_string(&connection_file).context("Failed to read connection file")?;
    let connection: Connection =
        serde_json::from_str(&connection_json).context("Failed to parse connection definition")?;

    info!(connection = %connection.id, uri = %connection.uri, "Opening connection");

    let factory = ReqwestPushFactory::new(connection.uri.clone(), config.http_push.request_timeout)?;
    let supervisor = ConnectionSupervisor::open(connection, factory, &config)?;

    info!("Connectivity worker ready");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received, draining");

    supervisor.close().await;

    info!("Connectivity worker stopped");
    Ok(())
}
