//! HTTP client for the generation provider.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{DispatchReceipt, DispatchRequest, GenerationProvider, ProviderError};

/// Provider error body, when it sends one.
#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    #[serde(alias = "message")]
    error: String,
}

/// Generation provider reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpProvider {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HttpProvider {
    /// Create a new provider client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Provider API URL (e.g., `"https://gen.example.com"`)
    /// * `api_key` - Provider API key
    /// * `timeout` - Per-attempt request timeout
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl GenerationProvider for HttpProvider {
    async fn dispatch(&self, request: &DispatchRequest) -> Result<DispatchReceipt, ProviderError> {
        let url = format!("{}/v1/generations", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let message = match response.json::<ProviderErrorBody>().await {
            Ok(body) => body.error,
            Err(_) => format!("HTTP {status}"),
        };

        Err(ProviderError::Api {
            status: status.as_u16(),
            message,
        })
    }
}
