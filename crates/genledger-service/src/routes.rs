//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{accounts, callbacks, credits, generations, health};
use crate::state::AppState;

/// Maximum concurrent requests for API endpoints.
const API_MAX_CONCURRENT_REQUESTS: usize = 50;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
/// - `GET /v1/models` - Model price list
///
/// ## Accounts (JWT auth)
/// - `POST /v1/accounts` - Open account with signup grant
/// - `GET /v1/accounts/me` - Get current user's account
///
/// ## Credits (JWT auth, admin key for `add`)
/// - `GET /v1/credits/balance` - Get current balance
/// - `GET /v1/credits/transactions` - List ledger entries
/// - `GET /v1/credits/audit` - Replay and check the ledger
/// - `POST /v1/credits/add` - Post a purchase or adjustment
///
/// ## Generations (JWT auth)
/// - `POST /v1/generations` - Admit a generation job
/// - `GET /v1/generations` - List jobs
/// - `GET /v1/generations/:request_id` - Job status
///
/// ## Webhooks (Signature verification)
/// - `POST /webhooks/provider` - Provider job outcome
pub fn create_router(state: AppState) -> Router {
    // Extract config values before moving state
    let cors_origins = state.config.cors_origins.clone();
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;

    let cors = build_cors_layer(&cors_origins);

    let state = Arc::new(state);

    let api_routes = Router::new()
        // Accounts
        .route("/accounts", post(accounts::create_account))
        .route("/accounts/me", get(accounts::get_account))
        // Credits
        .route("/credits/balance", get(credits::get_balance))
        .route("/credits/transactions", get(credits::list_transactions))
        .route("/credits/audit", get(credits::audit))
        .route("/credits/add", post(credits::admin_add_credits))
        // Generations
        .route("/models", get(generations::list_models))
        .route(
            "/generations",
            post(generations::create_generation).get(generations::list_generations),
        )
        .route(
            "/generations/:request_id",
            get(generations::get_generation_status),
        )
        .layer(ConcurrencyLimitLayer::new(API_MAX_CONCURRENT_REQUESTS));

    Router::new()
        // Health (public, no rate limit)
        .route("/health", get(health::health))
        // API v1 routes (rate limited)
        .nest("/v1", api_routes)
        // Webhooks (no rate limit - controlled by the provider)
        .route("/webhooks/provider", post(callbacks::provider_callback))
        // Global middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            request_timeout_seconds,
        )))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
