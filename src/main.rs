use std::sync::Arc;

use anyhow::{Error, Result};
use notification_service::{
    api::{AppState, run_api_server},
    clients::{
        database::{DatabaseClient, NotificationStore},
        rbmq::RabbitMqClient,
    },
    config::Config,
    worker::DeliveryConsumer,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::load()?;

    let store = Arc::new(
        DatabaseClient::connect(&config.database_url, config.database_max_connections).await?,
    );
    store.ensure_schema().await?;
    info!("Database schema ready");

    let broker = Arc::new(RabbitMqClient::connect(&config).await?);
    let deliveries = broker.deliveries().await?;

    let shutdown = CancellationToken::new();

    let consumer_handle =
        DeliveryConsumer::new(store.clone(), broker.clone()).spawn(deliveries, shutdown.clone());

    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for shutdown signal");
        }
        info!("Shutdown signal received");
        signal_shutdown.cancel();
    });

    let state = Arc::new(AppState::new(store, broker));
    run_api_server(config.server_port, state, shutdown.clone()).await?;

    shutdown.cancel();
    consumer_handle.await??;

    info!("Notification service stopped");

    Ok(())
}
