//! Admission: turn a generation request into a charged, dispatched job.
//!
//! The charge and the job row are committed by the store in one atomic unit.
//! Dispatch happens after that commit, outside any lock, on its own task:
//! once a job is charged, dispatch and any compensation run to completion
//! even if the request that admitted it is cancelled or times out. If
//! dispatch fails the job is settled as failed through the same refund path
//! a failure callback takes, so a provider outage never holds credits
//! hostage.

use genledger_core::{
    GenerationJob, JobFamily, JobOutcome, JobStatus, NewJob, RequestId, SettlementSource,
    StatusSnapshot, UserId,
};
use genledger_store::{Admission, Settlement, Store};

use crate::error::ApiError;
use crate::provider::{dispatch_with_retry, DispatchRequest};
use crate::state::AppState;

/// A validated generation request.
#[derive(Debug, Clone)]
pub struct AdmitRequest {
    /// Job family.
    pub family: JobFamily,
    /// Model identifier.
    pub model: String,
    /// Caller-supplied idempotency key. Generated if absent.
    pub request_id: Option<RequestId>,
    /// Generation input passed to the provider.
    pub input: serde_json::Value,
}

/// A job that was admitted, now or by an earlier request with the same ID.
#[derive(Debug, Clone)]
pub struct Admitted {
    /// The job as stored after admission and dispatch.
    pub job: GenerationJob,
    /// Account balance after the charge.
    pub balance: i64,
    /// Whether this was a retry of an existing admission.
    pub replayed: bool,
}

/// Admit, charge and dispatch a generation job.
///
/// # Errors
///
/// - `ApiError::BadRequest` for unknown models or family mismatches.
/// - `ApiError::InsufficientFunds` if the balance is below the quoted price.
/// - `ApiError::Conflict` if the request ID belongs to another account.
/// - `ApiError::GenerationFailed` if dispatch failed; the charge is already refunded.
pub async fn admit(
    state: &AppState,
    user_id: UserId,
    request: AdmitRequest,
) -> Result<Admitted, ApiError> {
    let credits = state.config.pricing.quote(request.family, &request.model)?;
    let request_id = request.request_id.unwrap_or_else(RequestId::generate);

    let admission = state.store.admit_job(NewJob {
        request_id,
        user_id,
        family: request.family,
        model: request.model.clone(),
        credits,
    })?;

    let (job, balance) = match admission {
        Admission::Replayed { job, balance } => {
            tracing::info!(
                user_id = %user_id,
                request_id = %request_id,
                status = job.status.as_str(),
                "Duplicate admission, returning existing job"
            );
            return Ok(Admitted {
                job,
                balance,
                replayed: true,
            });
        }
        Admission::Admitted { job, balance, .. } => (job, balance),
    };

    state.status_cache.put(StatusSnapshot::from(&job)).await;

    let dispatch = DispatchRequest {
        request_id,
        family: request.family,
        model: request.model,
        input: request.input,
        callback_url: state.config.callback_url(),
    };

    let task_state = state.clone();
    tokio::spawn(async move { dispatch_admitted(&task_state, job, balance, dispatch).await })
        .await
        .map_err(|e| {
            tracing::error!(request_id = %request_id, error = %e, "Dispatch task failed");
            ApiError::Internal(format!("dispatch task failed: {e}"))
        })?
}

/// Dispatch a committed job and record the outcome.
async fn dispatch_admitted(
    state: &AppState,
    job: GenerationJob,
    balance: i64,
    dispatch: DispatchRequest,
) -> Result<Admitted, ApiError> {
    let request_id = dispatch.request_id;

    match dispatch_with_retry(
        state.provider.as_ref(),
        &dispatch,
        state.config.dispatch_max_attempts,
    )
    .await
    {
        Ok(receipt) => {
            tracing::info!(
                request_id = %request_id,
                task_id = %receipt.task_id,
                "Job dispatched"
            );
            let job = state
                .store
                .mark_processing(&request_id, receipt.task_id)?
                .unwrap_or(job);
            state.status_cache.put(StatusSnapshot::from(&job)).await;

            Ok(Admitted {
                job,
                balance,
                replayed: false,
            })
        }
        Err(e) => {
            tracing::warn!(request_id = %request_id, error = %e, "Dispatch failed, refunding");
            compensate_dispatch_failure(state, request_id, balance, &e.to_string()).await
        }
    }
}

/// Settle a job whose dispatch failed and report the outcome to the caller.
async fn compensate_dispatch_failure(
    state: &AppState,
    request_id: RequestId,
    balance: i64,
    reason: &str,
) -> Result<Admitted, ApiError> {
    let settlement = state.store.settle_job(
        &request_id,
        JobOutcome::Failed {
            error_detail: format!("dispatch failed: {reason}"),
        },
        SettlementSource::DispatchFailure,
    )?;

    let job = match settlement {
        Settlement::Failed { job, .. }
        | Settlement::AlreadySettled(job)
        | Settlement::Completed(job) => job,
        Settlement::UnknownJob => {
            return Err(ApiError::Internal(format!(
                "admitted job vanished: {request_id}"
            )))
        }
    };
    state.status_cache.put(StatusSnapshot::from(&job)).await;

    // A callback may have settled the job before the dispatch error surfaced.
    if job.status == JobStatus::Completed {
        return Ok(Admitted {
            job,
            balance,
            replayed: false,
        });
    }

    Err(ApiError::GenerationFailed {
        request_id: request_id.to_string(),
        message: "The generation provider could not be reached; your credits were refunded"
            .into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use std::time::Duration;

    use crate::config::ServiceConfig;
    use crate::provider::{DispatchReceipt, GenerationProvider, ProviderError, Unconfigured};
    use genledger_store::RocksStore;
    use tempfile::TempDir;

    fn state() -> (AppState, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RocksStore::open(dir.path()).unwrap());
        let state = AppState::with_provider(store, ServiceConfig::default(), Arc::new(Unconfigured));
        (state, dir)
    }

    fn request(model: &str) -> AdmitRequest {
        AdmitRequest {
            family: JobFamily::Video,
            model: model.into(),
            request_id: None,
            input: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn dispatch_failure_refunds_and_fails_job() {
        let (state, _dir) = state();
        let user_id = UserId::generate();
        state.store.create_account(user_id, 50).unwrap();

        let err = admit(&state, user_id, request("veo-3")).await.unwrap_err();
        let ApiError::GenerationFailed { request_id, .. } = err else {
            panic!("expected generation failure");
        };

        let request_id: RequestId = request_id.parse().unwrap();
        let job = state.store.get_job(&request_id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.settled_by, Some(SettlementSource::DispatchFailure));
        assert!(!job.callback_received);
        assert_eq!(state.store.get_account(&user_id).unwrap().unwrap().balance, 50);

        let cached = state.status_cache.get(&request_id).await.unwrap();
        assert_eq!(cached.status, JobStatus::Failed);
    }

    /// Fails every dispatch after a delay.
    struct SlowFailing(Duration);

    #[async_trait::async_trait]
    impl GenerationProvider for SlowFailing {
        async fn dispatch(
            &self,
            _request: &DispatchRequest,
        ) -> Result<DispatchReceipt, ProviderError> {
            tokio::time::sleep(self.0).await;
            Err(ProviderError::Api {
                status: 503,
                message: "overloaded".into(),
            })
        }
    }

    #[tokio::test]
    async fn cancelled_admission_still_refunds() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RocksStore::open(dir.path()).unwrap());
        let config = ServiceConfig {
            dispatch_max_attempts: 1,
            ..ServiceConfig::default()
        };
        let state = AppState::with_provider(
            store,
            config,
            Arc::new(SlowFailing(Duration::from_millis(200))),
        );
        let user_id = UserId::generate();
        state.store.create_account(user_id, 50).unwrap();
        let request_id = RequestId::generate();

        let mut request = request("veo-3");
        request.request_id = Some(request_id);
        let cancelled =
            tokio::time::timeout(Duration::from_millis(20), admit(&state, user_id, request)).await;
        assert!(cancelled.is_err());
        assert_eq!(state.store.get_account(&user_id).unwrap().unwrap().balance, 10);

        tokio::time::sleep(Duration::from_millis(500)).await;

        let job = state.store.get_job(&request_id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.settled_by, Some(SettlementSource::DispatchFailure));
        assert_eq!(state.store.get_account(&user_id).unwrap().unwrap().balance, 50);
    }

    #[tokio::test]
    async fn unknown_model_is_rejected_before_charging() {
        let (state, _dir) = state();
        let user_id = UserId::generate();
        state.store.create_account(user_id, 50).unwrap();

        let err = admit(&state, user_id, request("imagen-4")).await.unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
        assert_eq!(state.store.ledger_for_user(&user_id).unwrap().len(), 1);
    }
}
