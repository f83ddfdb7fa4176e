//! Application state.

use std::sync::Arc;
use std::time::Duration;

use genledger_store::RocksStore;

use crate::cache::StatusCache;
use crate::config::ServiceConfig;
use crate::provider::{GenerationProvider, HttpProvider, Unconfigured};

/// Application state shared across handlers and background tasks.
#[derive(Clone)]
pub struct AppState {
    /// The storage backend.
    pub store: Arc<RocksStore>,

    /// Service configuration.
    pub config: ServiceConfig,

    /// Generation provider.
    pub provider: Arc<dyn GenerationProvider>,

    /// Job status cache.
    pub status_cache: Arc<StatusCache>,
}

impl AppState {
    /// Create a new application state, building the provider client from config.
    #[must_use]
    pub fn new(store: Arc<RocksStore>, config: ServiceConfig) -> Self {
        let provider: Arc<dyn GenerationProvider> = match config
            .provider_base_url
            .as_ref()
            .zip(config.provider_api_key.as_ref())
        {
            Some((url, key)) => match HttpProvider::new(url, key, config.provider_timeout()) {
                Ok(client) => {
                    tracing::info!(provider_url = %url, "Generation provider enabled");
                    Arc::new(client)
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to create provider client");
                    Arc::new(Unconfigured)
                }
            },
            None => {
                tracing::warn!("Provider not configured - every generation will be refunded");
                Arc::new(Unconfigured)
            }
        };

        Self::with_provider(store, config, provider)
    }

    /// Create a new application state with an explicit provider.
    #[must_use]
    pub fn with_provider(
        store: Arc<RocksStore>,
        config: ServiceConfig,
        provider: Arc<dyn GenerationProvider>,
    ) -> Self {
        let status_cache = Arc::new(StatusCache::new(Duration::from_secs(
            config.status_cache_ttl_seconds,
        )));

        Self {
            store,
            config,
            provider,
            status_cache,
        }
    }

    /// Check if callbacks can be verified.
    #[must_use]
    pub fn has_callback_secret(&self) -> bool {
        self.config.callback_secret.is_some()
    }
}
