//! Provider callback reconciliation.
//!
//! Applies the outcome of a job exactly once. Deliveries for unknown jobs and
//! for jobs that are already terminal are acknowledged without touching any
//! state, so providers never retry on business outcomes.

use serde::{Deserialize, Serialize};

use genledger_core::{JobOutcome, RequestId, SettlementSource, StatusSnapshot};
use genledger_store::{Settlement, Store};

use crate::error::ApiError;
use crate::state::AppState;

/// Error detail recorded when a failure callback carries none.
const DEFAULT_FAILURE_DETAIL: &str = "generation failed";

/// Completion status reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackOutcome {
    /// The job produced a result.
    Succeeded,
    /// The job failed.
    Failed,
}

/// Provider callback body.
#[derive(Debug, Clone, Deserialize)]
pub struct CallbackPayload {
    /// The job's request ID.
    #[serde(alias = "requestId")]
    pub request_id: String,
    /// Completion status.
    pub outcome: CallbackOutcome,
    /// Result location, required on success.
    #[serde(default, alias = "resultLocation")]
    pub result_location: Option<String>,
    /// Failure reason.
    #[serde(default, alias = "errorDetail")]
    pub error_detail: Option<String>,
    /// Provider-reported resource cost.
    #[serde(default, alias = "actualCost")]
    pub actual_cost: Option<i64>,
}

impl CallbackPayload {
    /// Validate the payload and split it into the job key and its outcome.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::InvalidPayload` for an unparsable request ID, a
    /// success without a result location, or a negative cost.
    pub fn into_outcome(self) -> Result<(RequestId, JobOutcome), ApiError> {
        let request_id = self
            .request_id
            .parse::<RequestId>()
            .map_err(|e| ApiError::InvalidPayload(e.to_string()))?;

        if self.actual_cost.is_some_and(|cost| cost < 0) {
            return Err(ApiError::InvalidPayload(
                "actual_cost must not be negative".into(),
            ));
        }

        let outcome = match self.outcome {
            CallbackOutcome::Succeeded => JobOutcome::Succeeded {
                result_location: self
                    .result_location
                    .filter(|location| !location.trim().is_empty())
                    .ok_or_else(|| {
                        ApiError::InvalidPayload("result_location is required on success".into())
                    })?,
                actual_credits_used: self.actual_cost,
            },
            CallbackOutcome::Failed => JobOutcome::Failed {
                error_detail: self
                    .error_detail
                    .unwrap_or_else(|| DEFAULT_FAILURE_DETAIL.to_string()),
            },
        };

        Ok((request_id, outcome))
    }
}

/// What a callback delivery did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileResult {
    /// The outcome was applied.
    Applied,
    /// No job has this request ID.
    UnknownJob,
    /// The job was already terminal.
    Duplicate,
}

/// Apply a verified callback payload.
///
/// # Errors
///
/// Returns `ApiError::InvalidPayload` for malformed payloads and
/// `ApiError::Internal` for storage failures.
pub async fn reconcile(
    state: &AppState,
    payload: CallbackPayload,
) -> Result<ReconcileResult, ApiError> {
    let (request_id, outcome) = payload.into_outcome()?;

    let settlement = state
        .store
        .settle_job(&request_id, outcome, SettlementSource::Callback)?;

    let result = match &settlement {
        Settlement::UnknownJob => {
            tracing::warn!(request_id = %request_id, "Callback for unknown job");
            ReconcileResult::UnknownJob
        }
        Settlement::AlreadySettled(job) => {
            tracing::info!(
                request_id = %request_id,
                status = job.status.as_str(),
                settled_by = ?job.settled_by,
                "Duplicate callback ignored"
            );
            ReconcileResult::Duplicate
        }
        Settlement::Completed(_) | Settlement::Failed { .. } => ReconcileResult::Applied,
    };

    // Durable write is done; refresh the cache second.
    if let Some(job) = settlement.job() {
        state.status_cache.put(StatusSnapshot::from(job)).await;
    }

    Ok(result)
}
