use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use device_shipment_server::{
    config::Config,
    db,
    handlers,
    services::{
        device_unlock::{DeviceUnlocker, HttpDeviceUnlocker, LogDeviceUnlocker},
        notification::LogMailer,
        short_id::RandomShortIds,
    },
    state::AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "device_shipment_server=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env().context("Failed to load configuration")?;
    let pool = db::init_db_pool(&config.database_url, config.max_pool_size)
        .await
        .context("Failed to initialize database")?;

    let unlocker: Arc<dyn DeviceUnlocker> = match &config.device_unlock_url {
        Some(url) => Arc::new(
            HttpDeviceUnlocker::new(url, config.device_unlock_token.clone())
                .context("Failed to build device API client")?,
        ),
        None => {
            tracing::warn!("DEVICE_UNLOCK_URL not set, device unlocks will only be logged");
            Arc::new(LogDeviceUnlocker)
        }
    };

    let addr = config.server_addr();
    let state = AppState::new(
        config,
        pool.clone(),
        Arc::new(LogMailer),
        unlocker,
        Arc::new(RandomShortIds),
    );
    let app = handlers::router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down, closing database pool");
    pool.close().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}
