//! Generation job types.
//!
//! A [`GenerationJob`] is created once at admission and then moves through a
//! small lifecycle:
//!
//! ```text
//! pending ──► processing ──► completed
//!    │             │
//!    └─────────────┴───────► failed
//! ```
//!
//! `completed` and `failed` are terminal. Nothing moves a job out of a terminal
//! state, which is what keeps status reads monotonic.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{BillingError, Result};
use crate::{EntryId, RequestId, UserId};

/// Coarse progress reported for a job that is being worked on.
pub const PROCESSING_PERCENTAGE: u8 = 50;

/// The kind of media a job produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobFamily {
    /// Still images.
    Image,
    /// Video clips.
    Video,
    /// Text.
    Text,
}

impl JobFamily {
    /// Get the family name as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Text => "text",
        }
    }
}

impl fmt::Display for JobFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a generation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Admitted and charged, not yet accepted by the provider.
    Pending,
    /// Accepted by the provider, waiting for its callback.
    Processing,
    /// Finished with a usable result.
    Completed,
    /// Finished without a result; the charge has been refunded.
    Failed,
}

impl JobStatus {
    /// Whether no further transitions are permitted.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Position in the lifecycle. Later states have a higher rank.
    #[must_use]
    pub const fn rank(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Processing => 1,
            Self::Completed | Self::Failed => 2,
        }
    }

    /// Coarse progress synthesized from the status.
    #[must_use]
    pub const fn percentage(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Processing => PROCESSING_PERCENTAGE,
            Self::Completed | Self::Failed => 100,
        }
    }

    /// Get the status name as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Who settled a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementSource {
    /// The provider delivered a completion or failure callback.
    Callback,
    /// The provider could not be reached at admission time.
    DispatchFailure,
    /// No callback arrived before the job timeout.
    Timeout,
}

/// The outcome applied when a job is settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// The provider produced a result.
    Succeeded {
        /// Where the result can be fetched.
        result_location: String,
        /// Provider-reported resource cost, if any.
        actual_credits_used: Option<i64>,
    },
    /// The job produced nothing usable.
    Failed {
        /// Human-readable reason.
        error_detail: String,
    },
}

/// The admission-time description of a job, before the store assigns its charge entry.
#[derive(Debug, Clone)]
pub struct NewJob {
    /// Idempotency key.
    pub request_id: RequestId,
    /// The account being charged.
    pub user_id: UserId,
    /// Job family.
    pub family: JobFamily,
    /// Model identifier.
    pub model: String,
    /// Price quoted from the model table.
    pub credits: i64,
}

/// One admitted generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationJob {
    /// Idempotency key, unique across the subsystem.
    pub request_id: RequestId,

    /// The account that was charged.
    pub user_id: UserId,

    /// Job family.
    pub family: JobFamily,

    /// Model identifier.
    pub model: String,

    /// Credits charged at admission. Fixed for the life of the job.
    pub credits_charged: i64,

    /// Provider-reported cost. Internal only, never shown to the account owner.
    pub actual_credits_used: Option<i64>,

    /// Lifecycle status.
    pub status: JobStatus,

    /// Provider task identifier, once dispatched.
    pub provider_task_id: Option<String>,

    /// Result location, for completed jobs.
    pub result_location: Option<String>,

    /// Failure reason, for failed jobs.
    pub error_detail: Option<String>,

    /// Whether a provider callback has been applied.
    pub callback_received: bool,

    /// Who moved the job into its terminal state.
    pub settled_by: Option<SettlementSource>,

    /// The charge entry written at admission.
    pub charge_entry_id: EntryId,

    /// The refund entry, for failed jobs.
    pub refund_entry_id: Option<EntryId>,

    /// When the job was admitted.
    pub created_at: DateTime<Utc>,

    /// When the job reached a terminal state.
    pub completed_at: Option<DateTime<Utc>>,
}

impl GenerationJob {
    /// Create a pending job from its admission description and charge entry.
    #[must_use]
    pub fn new(new_job: NewJob, charge_entry_id: EntryId, created_at: DateTime<Utc>) -> Self {
        Self {
            request_id: new_job.request_id,
            user_id: new_job.user_id,
            family: new_job.family,
            model: new_job.model,
            credits_charged: new_job.credits,
            actual_credits_used: None,
            status: JobStatus::Pending,
            provider_task_id: None,
            result_location: None,
            error_detail: None,
            callback_received: false,
            settled_by: None,
            charge_entry_id,
            refund_entry_id: None,
            created_at,
            completed_at: None,
        }
    }

    /// Record that the provider accepted the job.
    ///
    /// Returns `false` without changing anything unless the job is still pending.
    pub fn mark_processing(&mut self, provider_task_id: String) -> bool {
        if self.status != JobStatus::Pending {
            return false;
        }
        self.status = JobStatus::Processing;
        self.provider_task_id = Some(provider_task_id);
        true
    }

    /// Move the job into its terminal state.
    ///
    /// # Errors
    ///
    /// Returns `BillingError::JobAlreadySettled` if the job is already terminal.
    pub fn settle(
        &mut self,
        outcome: JobOutcome,
        source: SettlementSource,
        at: DateTime<Utc>,
    ) -> Result<()> {
        if self.status.is_terminal() {
            return Err(BillingError::JobAlreadySettled {
                request_id: self.request_id.to_string(),
            });
        }

        match outcome {
            JobOutcome::Succeeded {
                result_location,
                actual_credits_used,
            } => {
                self.status = JobStatus::Completed;
                self.result_location = Some(result_location);
                self.actual_credits_used = actual_credits_used;
            }
            JobOutcome::Failed { error_detail } => {
                self.status = JobStatus::Failed;
                self.error_detail = Some(error_detail);
            }
        }

        self.callback_received |= source == SettlementSource::Callback;
        self.settled_by = Some(source);
        self.completed_at = Some(at);
        Ok(())
    }

    /// Credits to give back when this job fails: always the full charge.
    #[must_use]
    pub const fn refund_amount(&self) -> i64 {
        self.credits_charged
    }
}

/// The externally visible projection of a job, as served by the status endpoint.
///
/// Excludes `actual_credits_used`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    /// The job's request ID.
    pub request_id: RequestId,
    /// The job owner, used for the ownership check.
    #[serde(skip_serializing)]
    pub user_id: UserId,
    /// Lifecycle status.
    pub status: JobStatus,
    /// Result location, for completed jobs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_location: Option<String>,
    /// Failure reason, for failed jobs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    /// Coarse progress.
    pub percentage: u8,
}

impl From<&GenerationJob> for StatusSnapshot {
    fn from(job: &GenerationJob) -> Self {
        Self {
            request_id: job.request_id,
            user_id: job.user_id,
            status: job.status,
            result_location: job.result_location.clone(),
            error_detail: job.error_detail.clone(),
            percentage: job.status.percentage(),
        }
    }
}
