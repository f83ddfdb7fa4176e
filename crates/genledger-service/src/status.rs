//! Job status resolution: cache first, job registry on a miss.

use genledger_core::{RequestId, StatusSnapshot, UserId};
use genledger_store::Store;

use crate::error::ApiError;
use crate::state::AppState;

/// Resolve the externally visible status of a job for `caller`.
///
/// A terminal status is permanent in the registry and the cache never
/// accepts a regression, so once a caller sees a terminal state every later
/// query for the same job sees it too, whichever path serves it.
///
/// # Errors
///
/// - `ApiError::NotFound` if no job has this request ID.
/// - `ApiError::Forbidden` if the job belongs to another account.
pub async fn resolve(
    state: &AppState,
    caller: &UserId,
    request_id: &RequestId,
) -> Result<StatusSnapshot, ApiError> {
    if let Some(snapshot) = state.status_cache.get(request_id).await {
        return authorize(snapshot, caller);
    }

    let job = state
        .store
        .get_job(request_id)?
        .ok_or_else(|| ApiError::NotFound(format!("generation not found: {request_id}")))?;

    let snapshot = StatusSnapshot::from(&job);
    state.status_cache.put(snapshot.clone()).await;

    authorize(snapshot, caller)
}

fn authorize(snapshot: StatusSnapshot, caller: &UserId) -> Result<StatusSnapshot, ApiError> {
    if snapshot.user_id == *caller {
        Ok(snapshot)
    } else {
        tracing::debug!(
            request_id = %snapshot.request_id,
            caller = %caller,
            "Status query for another account's job"
        );
        Err(ApiError::Forbidden)
    }
}
