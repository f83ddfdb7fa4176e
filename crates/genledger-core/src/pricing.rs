//! Model price table for genledger.
//!
//! Admission never takes a price from the caller: the cost of a job is always
//! quoted from this table on the server side.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{BillingError, Result};
use crate::JobFamily;

/// Fixed per-job prices for every model the service accepts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingConfig {
    /// Price by model identifier.
    pub models: HashMap<String, ModelPrice>,
}

/// Price of one job on a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelPrice {
    /// The family this model belongs to.
    pub family: JobFamily,
    /// Credits charged per job.
    pub credits: i64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        let mut models = HashMap::new();

        // Image models
        models.insert("imagen-4".to_string(), ModelPrice::new(JobFamily::Image, 2));
        models.insert("imagen-4-ultra".to_string(), ModelPrice::new(JobFamily::Image, 4));
        models.insert("flux-1.1-pro".to_string(), ModelPrice::new(JobFamily::Image, 3));
        models.insert("gpt-image-1".to_string(), ModelPrice::new(JobFamily::Image, 5));

        // Video models
        models.insert("veo-3".to_string(), ModelPrice::new(JobFamily::Video, 40));
        models.insert("veo-3-fast".to_string(), ModelPrice::new(JobFamily::Video, 20));
        models.insert("kling-2.1".to_string(), ModelPrice::new(JobFamily::Video, 30));

        // Text models
        models.insert("gemini-2.5-flash".to_string(), ModelPrice::new(JobFamily::Text, 1));
        models.insert("gpt-4o".to_string(), ModelPrice::new(JobFamily::Text, 2));

        Self { models }
    }
}

impl PricingConfig {
    /// Quote the price of one job on `model`.
    ///
    /// # Errors
    ///
    /// - `BillingError::UnknownModel` if the model is not in the table.
    /// - `BillingError::ModelFamilyMismatch` if the model produces a different family.
    pub fn quote(&self, family: JobFamily, model: &str) -> Result<i64> {
        let price = self
            .models
            .get(model)
            .ok_or_else(|| BillingError::UnknownModel {
                model: model.to_string(),
            })?;

        if price.family != family {
            return Err(BillingError::ModelFamilyMismatch {
                model: model.to_string(),
                expected: price.family,
                requested: family,
            });
        }

        Ok(price.credits)
    }

    /// Check that every price is positive.
    ///
    /// # Errors
    ///
    /// Returns `BillingError::InvalidAmount` naming the first bad model.
    pub fn validate(&self) -> Result<()> {
        match self.models.iter().find(|(_, price)| price.credits <= 0) {
            Some((model, price)) => Err(BillingError::InvalidAmount(format!(
                "model {model} has non-positive price {}",
                price.credits
            ))),
            None => Ok(()),
        }
    }

    /// All models sorted by family then name, for listing.
    #[must_use]
    pub fn sorted(&self) -> Vec<(&str, ModelPrice)> {
        let mut models: Vec<_> = self
            .models
            .iter()
            .map(|(name, price)| (name.as_str(), *price))
            .collect();
        models.sort_by(|a, b| a.1.family.as_str().cmp(b.1.family.as_str()).then(a.0.cmp(b.0)));
        models
    }
}

impl ModelPrice {
    /// Create a new model price.
    #[must_use]
    pub const fn new(family: JobFamily, credits: i64) -> Self {
        Self { family, credits }
    }
}
