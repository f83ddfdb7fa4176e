//! Service configuration.
//!
//! Built once at startup and carried in [`AppState`](crate::AppState).

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use genledger_core::PricingConfig;
use serde::Deserialize;

use crate::provider::retry_backoff_total;

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    pub listen_addr: String,

    /// Path to `RocksDB` data directory (default: "/data/genledger").
    pub data_dir: String,

    /// HS256 secret for caller JWTs. Without it no caller can authenticate.
    pub auth_jwt_secret: Option<String>,

    /// Expected JWT issuer (default: "genledger-auth").
    pub auth_issuer: String,

    /// Expected JWT audience (default: "genledger").
    pub auth_audience: String,

    /// Admin API key for privileged endpoints.
    pub admin_api_key: Option<String>,

    /// Shared secret for provider callback signatures.
    pub callback_secret: Option<String>,

    /// Externally reachable base URL, used to build the callback URL.
    pub public_base_url: String,

    /// Generation provider base URL (optional).
    pub provider_base_url: Option<String>,

    /// Generation provider API key (optional).
    pub provider_api_key: Option<String>,

    /// Credits granted when an account is opened.
    pub signup_grant_credits: i64,

    /// Dispatch attempts before a job is refunded.
    pub dispatch_max_attempts: u32,

    /// Timeout for one dispatch attempt.
    pub provider_timeout_seconds: u64,

    /// Age after which an unsettled job is failed and refunded.
    pub job_timeout_seconds: u64,

    /// Seconds between reaper sweeps.
    pub reaper_interval_seconds: u64,

    /// Lifetime of a status cache entry.
    pub status_cache_ttl_seconds: u64,

    /// Seconds between status cache purges.
    pub cache_purge_interval_seconds: u64,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,

    /// Model price table.
    pub pricing: PricingConfig,
}

/// Errors that prevent the service from starting.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The pricing file could not be read.
    #[error("failed to read pricing file {path}: {source}")]
    PricingIo {
        /// File path.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The pricing file is not a valid price table.
    #[error("invalid pricing file {path}: {reason}")]
    PricingInvalid {
        /// File path.
        path: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Dispatch could outlast the request that is waiting for it.
    #[error(
        "dispatch budget of {budget_ms} ms ({attempts} attempts of {provider_timeout_seconds} s) \
         does not fit in the {request_timeout_seconds} s request timeout"
    )]
    DispatchBudget {
        /// Worst-case dispatch time.
        budget_ms: u128,
        /// Configured attempts.
        attempts: u32,
        /// Configured per-attempt timeout.
        provider_timeout_seconds: u64,
        /// Configured request timeout.
        request_timeout_seconds: u64,
    },
}

/// Provider secrets file structure.
#[derive(Debug, Deserialize)]
struct ProviderSecrets {
    api_url: String,
    api_key: String,
    #[serde(default)]
    callback_secret: Option<String>,
}

impl ServiceConfig {
    /// Load configuration from environment variables and secrets files.
    ///
    /// # Errors
    ///
    /// Returns an error if `PRICING_FILE` is set but cannot be loaded.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        // Try to load provider secrets from file first, then fall back to env vars
        let (provider_base_url, provider_api_key, callback_secret) = load_provider_secrets();

        let pricing = match std::env::var("PRICING_FILE") {
            Ok(path) => load_pricing_file(&path)?,
            Err(_) => defaults.pricing,
        };

        let config = Self {
            listen_addr: std::env::var("LISTEN_ADDR").unwrap_or(defaults.listen_addr),
            data_dir: std::env::var("DATA_DIR").unwrap_or(defaults.data_dir),
            auth_jwt_secret: std::env::var("AUTH_JWT_SECRET").ok(),
            auth_issuer: std::env::var("AUTH_ISSUER").unwrap_or(defaults.auth_issuer),
            auth_audience: std::env::var("AUTH_AUDIENCE").unwrap_or(defaults.auth_audience),
            admin_api_key: std::env::var("ADMIN_API_KEY").ok(),
            callback_secret,
            public_base_url: std::env::var("PUBLIC_BASE_URL").unwrap_or(defaults.public_base_url),
            provider_base_url,
            provider_api_key,
            signup_grant_credits: env_or("SIGNUP_GRANT_CREDITS", defaults.signup_grant_credits),
            dispatch_max_attempts: env_or("DISPATCH_MAX_ATTEMPTS", defaults.dispatch_max_attempts)
                .max(1),
            provider_timeout_seconds: env_or(
                "PROVIDER_TIMEOUT_SECONDS",
                defaults.provider_timeout_seconds,
            )
            .max(1),
            job_timeout_seconds: env_or("JOB_TIMEOUT_SECONDS", defaults.job_timeout_seconds),
            reaper_interval_seconds: env_or(
                "REAPER_INTERVAL_SECONDS",
                defaults.reaper_interval_seconds,
            )
            .max(1),
            status_cache_ttl_seconds: env_or(
                "STATUS_CACHE_TTL_SECONDS",
                defaults.status_cache_ttl_seconds,
            ),
            cache_purge_interval_seconds: env_or(
                "CACHE_PURGE_INTERVAL_SECONDS",
                defaults.cache_purge_interval_seconds,
            )
            .max(1),
            cors_origins: std::env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "*".into())
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            max_body_bytes: env_or("MAX_BODY_BYTES", defaults.max_body_bytes),
            request_timeout_seconds: env_or(
                "REQUEST_TIMEOUT_SECONDS",
                defaults.request_timeout_seconds,
            ),
            pricing,
        };

        config.validate()?;
        Ok(config)
    }

    /// Check settings that depend on each other.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::DispatchBudget` if a fully failing dispatch
    /// would take longer than `request_timeout_seconds`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let budget = self.dispatch_budget();
        if budget >= Duration::from_secs(self.request_timeout_seconds) {
            return Err(ConfigError::DispatchBudget {
                budget_ms: budget.as_millis(),
                attempts: self.dispatch_max_attempts,
                provider_timeout_seconds: self.provider_timeout_seconds,
                request_timeout_seconds: self.request_timeout_seconds,
            });
        }
        Ok(())
    }

    /// Worst-case time spent dispatching one job: every attempt times out
    /// and every backoff is slept.
    #[must_use]
    pub fn dispatch_budget(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_seconds)
            .saturating_mul(self.dispatch_max_attempts)
            .saturating_add(retry_backoff_total(self.dispatch_max_attempts))
    }

    /// Per-attempt provider timeout.
    #[must_use]
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_seconds)
    }

    /// The URL the provider should deliver callbacks to.
    #[must_use]
    pub fn callback_url(&self) -> String {
        format!(
            "{}/webhooks/provider",
            self.public_base_url.trim_end_matches('/')
        )
    }
}

/// Parse an environment variable, falling back to `default` if unset or invalid.
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Load provider secrets from file or environment.
fn load_provider_secrets() -> (Option<String>, Option<String>, Option<String>) {
    let secret_paths = [".secrets/provider.json", "../.secrets/provider.json"];

    for path in &secret_paths {
        if let Ok(secrets) = load_secrets_file::<ProviderSecrets>(path) {
            tracing::info!(path = %path, "Loaded provider secrets from file");
            return (
                Some(secrets.api_url),
                Some(secrets.api_key),
                secrets
                    .callback_secret
                    .or_else(|| std::env::var("CALLBACK_SECRET").ok()),
            );
        }
    }

    tracing::debug!("Provider secrets file not found, using environment variables");
    (
        std::env::var("PROVIDER_BASE_URL").ok(),
        std::env::var("PROVIDER_API_KEY").ok(),
        std::env::var("CALLBACK_SECRET").ok(),
    )
}

/// Load secrets from a JSON file.
fn load_secrets_file<T: serde::de::DeserializeOwned>(path: &str) -> Result<T, std::io::Error> {
    let path = Path::new(path);
    if !path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Secrets file not found",
        ));
    }
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

/// Load and validate a price table.
fn load_pricing_file(path: &str) -> Result<PricingConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::PricingIo {
        path: path.to_string(),
        source,
    })?;

    let pricing: PricingConfig =
        serde_json::from_str(&contents).map_err(|e| ConfigError::PricingInvalid {
            path: path.to_string(),
            reason: e.to_string(),
        })?;

    pricing.validate().map_err(|e| ConfigError::PricingInvalid {
        path: path.to_string(),
        reason: e.to_string(),
    })?;

    tracing::info!(path = %path, models = pricing.models.len(), "Loaded pricing file");
    Ok(pricing)
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            data_dir: "/data/genledger".into(),
            auth_jwt_secret: None,
            auth_issuer: "genledger-auth".into(),
            auth_audience: "genledger".into(),
            admin_api_key: None,
            callback_secret: None,
            public_base_url: "http://localhost:8080".into(),
            provider_base_url: None,
            provider_api_key: None,
            signup_grant_credits: 10,
            dispatch_max_attempts: 3,
            provider_timeout_seconds: 8,
            job_timeout_seconds: 3600,
            reaper_interval_seconds: 60,
            status_cache_ttl_seconds: 86_400,
            cache_purge_interval_seconds: 300,
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 30,
            pricing: PricingConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callback_url_trims_trailing_slash() {
        let config = ServiceConfig {
            public_base_url: "https://api.example.com/".into(),
            ..ServiceConfig::default()
        };
        assert_eq!(
            config.callback_url(),
            "https://api.example.com/webhooks/provider"
        );
    }

    #[test]
    fn default_dispatch_budget_fits_request_timeout() {
        let config = ServiceConfig::default();
        assert_eq!(config.dispatch_budget(), Duration::from_millis(24_300));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn dispatch_budget_beyond_request_timeout_is_rejected() {
        let config = ServiceConfig {
            provider_timeout_seconds: 30,
            ..ServiceConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DispatchBudget {
                attempts: 3,
                request_timeout_seconds: 30,
                ..
            })
        ));
    }

    #[test]
    fn pricing_file_must_be_valid() {
        let dir = tempfile::TempDir::new().unwrap();

        let good = dir.path().join("good.json");
        std::fs::write(&good, r#"{"models": {"m": {"family": "text", "credits": 3}}}"#).unwrap();
        let pricing = load_pricing_file(good.to_str().unwrap()).unwrap();
        assert_eq!(pricing.models.len(), 1);

        let free = dir.path().join("free.json");
        std::fs::write(&free, r#"{"models": {"m": {"family": "text", "credits": 0}}}"#).unwrap();
        assert!(matches!(
            load_pricing_file(free.to_str().unwrap()),
            Err(ConfigError::PricingInvalid { .. })
        ));

        let garbage = dir.path().join("garbage.json");
        std::fs::write(&garbage, "not json").unwrap();
        assert!(load_pricing_file(garbage.to_str().unwrap()).is_err());

        assert!(matches!(
            load_pricing_file("/nonexistent/pricing.json"),
            Err(ConfigError::PricingIo { .. })
        ));
    }
}
