//! Genledger HTTP API service.
//!
//! This crate provides the HTTP surface of the credit ledger and generation
//! job lifecycle:
//!
//! - Accounts, balances and ledger history
//! - Admission of generation jobs (charge, then dispatch to the provider)
//! - Provider callback reconciliation with refunds on failure
//! - Job status from a short-lived cache backed by the job registry
//! - A reaper that refunds jobs the provider never reported on
//!
//! # Authentication
//!
//! 1. **JWT bearer tokens** (HS256) - For callers, resolved to an account ID
//! 2. **Admin API key** - For posting purchases and adjustments
//! 3. **HMAC signature** - For provider callbacks

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are noisy for Axum handler functions
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result
#![allow(clippy::unused_async)] // Handlers are async for the router

pub mod admission;
pub mod auth;
pub mod cache;
pub mod config;
pub mod crypto;
pub mod error;
pub mod handlers;
pub mod provider;
pub mod reaper;
pub mod reconcile;
pub mod routes;
pub mod state;
pub mod status;

pub use cache::StatusCache;
pub use config::{ConfigError, ServiceConfig};
pub use error::ApiError;
pub use provider::{DispatchReceipt, DispatchRequest, GenerationProvider, ProviderError};
pub use routes::create_router;
pub use state::AppState;
