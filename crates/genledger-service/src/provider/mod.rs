//! Generation provider integration.
//!
//! The provider is opaque: it accepts a job, answers with a tracking
//! identifier, and later reports the outcome to the callback endpoint.

pub mod client;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use genledger_core::{JobFamily, RequestId};

pub use client::HttpProvider;

/// Initial backoff duration for dispatch retries (doubles with each attempt).
const DISPATCH_INITIAL_BACKOFF_MS: u64 = 100;

/// Maximum backoff duration for dispatch retries.
const DISPATCH_MAX_BACKOFF_MS: u64 = 5000;

/// A job handed to the provider.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchRequest {
    /// Idempotency key, echoed back in the callback.
    pub request_id: RequestId,
    /// Job family.
    pub family: JobFamily,
    /// Model identifier.
    pub model: String,
    /// Caller-supplied generation input, passed through untouched.
    pub input: serde_json::Value,
    /// Where the provider should deliver the outcome.
    pub callback_url: String,
}

/// The provider's acknowledgement of a dispatched job.
#[derive(Debug, Clone, Deserialize)]
pub struct DispatchReceipt {
    /// Provider tracking identifier.
    pub task_id: String,
}

/// Error type for provider operations.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider returned an error.
    #[error("provider API error: {status} - {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message.
        message: String,
    },

    /// No provider is configured.
    #[error("generation provider not configured")]
    NotConfigured,
}

impl ProviderError {
    /// Whether another attempt could succeed: transport errors and 5xx only.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(_) => true,
            Self::Api { status, .. } => *status >= 500,
            Self::NotConfigured => false,
        }
    }
}

/// A backend that runs generation jobs.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Hand a job to the provider.
    async fn dispatch(&self, request: &DispatchRequest) -> Result<DispatchReceipt, ProviderError>;
}

/// Provider used when none is configured. Every dispatch fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unconfigured;

#[async_trait]
impl GenerationProvider for Unconfigured {
    async fn dispatch(&self, _request: &DispatchRequest) -> Result<DispatchReceipt, ProviderError> {
        Err(ProviderError::NotConfigured)
    }
}

/// Total time [`dispatch_with_retry`] sleeps between attempts when every
/// attempt fails.
#[must_use]
pub fn retry_backoff_total(max_attempts: u32) -> Duration {
    let mut total_ms = 0;
    let mut backoff_ms = DISPATCH_INITIAL_BACKOFF_MS;
    for _ in 1..max_attempts {
        total_ms += backoff_ms;
        backoff_ms = (backoff_ms * 2).min(DISPATCH_MAX_BACKOFF_MS);
    }
    Duration::from_millis(total_ms)
}

/// Dispatch with exponential backoff retry.
///
/// Makes at most `max_attempts` attempts, retrying only errors for which
/// [`ProviderError::is_retryable`] holds.
///
/// # Errors
///
/// Returns the last provider error.
pub async fn dispatch_with_retry(
    provider: &dyn GenerationProvider,
    request: &DispatchRequest,
    max_attempts: u32,
) -> Result<DispatchReceipt, ProviderError> {
    let mut attempt = 0;
    let mut backoff_ms = DISPATCH_INITIAL_BACKOFF_MS;

    loop {
        match provider.dispatch(request).await {
            Ok(receipt) => return Ok(receipt),
            Err(e) => {
                attempt += 1;

                if attempt >= max_attempts || !e.is_retryable() {
                    tracing::warn!(
                        request_id = %request.request_id,
                        attempt = %attempt,
                        error = %e,
                        "Dispatch failed, giving up"
                    );
                    return Err(e);
                }

                tracing::debug!(
                    request_id = %request.request_id,
                    attempt = %attempt,
                    backoff_ms = %backoff_ms,
                    error = %e,
                    "Dispatch failed, retrying"
                );

                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;

                // Exponential backoff with cap
                backoff_ms = (backoff_ms * 2).min(DISPATCH_MAX_BACKOFF_MS);
            }
        }
    }
}
