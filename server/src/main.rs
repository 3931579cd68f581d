//! KYC Registry Server

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kyc_registry::config::Config;
use kyc_registry::models::EventEnvelope;
use kyc_registry::services::clock::SystemClock;
use kyc_registry::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kyc_registry=debug,kyc_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!("Starting KYC Registry Server");
    tracing::info!("Chain: {}", config.chain_id);
    tracing::info!("Registry: {}", config.registry_address);
    tracing::info!("Owner: {}", config.owner_address);
    tracing::info!("Field mode: {}", config.field_mode);
    match &config.relayer_url {
        Some(url) => tracing::info!("Relayer: {}", url),
        None => tracing::warn!("No RELAYER_URL set, using the in-process local relayer"),
    }

    let state = AppState::new(config.clone(), Arc::new(SystemClock))?;

    // Log registry notifications as they are committed
    let mut events = state.registry.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(logged) => match serde_json::to_string(&EventEnvelope::from(&logged)) {
                    Ok(json) => tracing::info!("Registry event: {}", json),
                    Err(e) => tracing::warn!("Unserializable registry event: {}", e),
                },
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Event logger lagged, skipped {} events", skipped)
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let app = kyc_registry::app(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
