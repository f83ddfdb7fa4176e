//! Background maintenance tasks.
//!
//! The reaper fails and refunds jobs whose provider never called back. The
//! purge task drops expired status cache entries.

use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;

use genledger_core::{JobOutcome, SettlementSource, StatusSnapshot};
use genledger_store::{Settlement, Store, StoreError};

use crate::state::AppState;

/// Maximum jobs settled per sweep.
pub const REAPER_BATCH_SIZE: usize = 100;

/// Error detail recorded on timed-out jobs.
pub const TIMEOUT_ERROR_DETAIL: &str = "timed out waiting for provider callback";

/// Settle one batch of timed-out jobs as failed. Returns how many were refunded.
///
/// # Errors
///
/// Returns an error if the store fails.
pub async fn sweep(state: &AppState) -> Result<usize, StoreError> {
    let timeout = Duration::from_secs(state.config.job_timeout_seconds);
    let cutoff = chrono::Duration::from_std(timeout)
        .ok()
        .and_then(|timeout| Utc::now().checked_sub_signed(timeout))
        .unwrap_or(chrono::DateTime::<Utc>::MIN_UTC);

    let jobs = state.store.list_open_jobs(cutoff, REAPER_BATCH_SIZE)?;
    let mut reaped = 0;

    for job in jobs {
        let settlement = state.store.settle_job(
            &job.request_id,
            JobOutcome::Failed {
                error_detail: TIMEOUT_ERROR_DETAIL.into(),
            },
            SettlementSource::Timeout,
        )?;

        if let Settlement::Failed { job, balance, .. } = &settlement {
            tracing::info!(
                user_id = %job.user_id,
                request_id = %job.request_id,
                credits = job.credits_charged,
                balance = *balance,
                "Timed-out job refunded"
            );
            reaped += 1;
        }
        if let Some(job) = settlement.job() {
            state.status_cache.put(StatusSnapshot::from(job)).await;
        }
    }

    Ok(reaped)
}

/// Spawn the reaper loop.
pub fn spawn_reaper(state: AppState) -> JoinHandle<()> {
    let period = Duration::from_secs(state.config.reaper_interval_seconds.max(1));

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            match sweep(&state).await {
                Ok(0) => {}
                Ok(reaped) => tracing::info!(reaped, "Reaper sweep complete"),
                Err(e) => tracing::error!(error = %e, "Reaper sweep failed"),
            }
        }
    })
}

/// Spawn the status cache purge loop.
pub fn spawn_cache_purge(state: AppState) -> JoinHandle<()> {
    let period = Duration::from_secs(state.config.cache_purge_interval_seconds.max(1));

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            let purged = state.status_cache.purge_expired().await;
            if purged > 0 {
                tracing::debug!(purged, "Purged expired status cache entries");
            }
        }
    })
}
