//! Genledger Service - credit ledger and generation job lifecycle.
//!
//! This is the main entry point for the genledger service.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use genledger_service::{create_router, reaper, AppState, ServiceConfig};
use genledger_store::RocksStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,genledger=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Genledger Service");

    let config = ServiceConfig::from_env()?;

    tracing::info!(
        listen_addr = %config.listen_addr,
        data_dir = %config.data_dir,
        provider_configured = %config.provider_base_url.is_some(),
        models = config.pricing.models.len(),
        signup_grant = config.signup_grant_credits,
        job_timeout_seconds = config.job_timeout_seconds,
        dispatch_budget_ms = %config.dispatch_budget().as_millis(),
        "Service configuration loaded"
    );

    if config.auth_jwt_secret.is_none() {
        tracing::warn!("AUTH_JWT_SECRET not set - all caller requests will be rejected");
    }
    tracing::info!(path = %config.data_dir, "Opening RocksDB store");
    let store = Arc::new(RocksStore::open(&config.data_dir)?);

    let state = AppState::new(store, config.clone());
    if !state.has_callback_secret() {
        tracing::warn!("CALLBACK_SECRET not set - all provider callbacks will be rejected");
    }

    let reaper_task = reaper::spawn_reaper(state.clone());
    let purge_task = reaper::spawn_cache_purge(state.clone());

    let app = create_router(state);
    tracing::info!("Router configured with all API endpoints");

    tracing::info!(listen_addr = %config.listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    reaper_task.abort();
    purge_task.abort();
    tracing::info!("Genledger Service stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
