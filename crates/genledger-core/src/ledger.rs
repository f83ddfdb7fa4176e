//! Ledger entry types for genledger.
//!
//! Every change to an account balance creates exactly one [`LedgerEntry`].
//! Entries are immutable and carry the balance immediately after the change,
//! so an account's history can be replayed and checked with [`replay`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{BillingError, Result};
use crate::{EntryId, GenerationJob, RequestId, UserId};

/// An immutable record of one balance change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Unique entry ID (ULID for time-ordering).
    pub id: EntryId,

    /// The account whose balance changed.
    pub user_id: UserId,

    /// Signed amount. Positive = credit, negative = debit.
    pub amount: i64,

    /// Account balance immediately after this entry.
    pub balance_after: i64,

    /// What caused the change.
    pub kind: EntryKind,

    /// The generation job this entry belongs to, for charges and refunds.
    pub reference_id: Option<RequestId>,

    /// Model label, for charges and refunds.
    pub model: Option<String>,

    /// Free-text note.
    pub note: String,

    /// When the entry was created.
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    fn new(user_id: UserId, kind: EntryKind, amount: i64, balance_after: i64, note: String) -> Self {
        Self {
            id: EntryId::generate(),
            user_id,
            amount,
            balance_after,
            kind,
            reference_id: None,
            model: None,
            note,
            created_at: Utc::now(),
        }
    }

    /// Create a signup grant entry.
    #[must_use]
    pub fn signup_grant(user_id: UserId, amount: i64, balance_after: i64) -> Self {
        Self::new(
            user_id,
            EntryKind::SignupGrant,
            amount,
            balance_after,
            format!("Signup grant of {amount} credits"),
        )
    }

    /// Create a purchase entry.
    #[must_use]
    pub fn purchase(user_id: UserId, amount: i64, balance_after: i64, note: String) -> Self {
        Self::new(user_id, EntryKind::Purchase, amount, balance_after, note)
    }

    /// Create an admin adjustment entry. The amount may be negative.
    #[must_use]
    pub fn admin_adjustment(user_id: UserId, amount: i64, balance_after: i64, note: String) -> Self {
        Self::new(user_id, EntryKind::AdminAdjustment, amount, balance_after, note)
    }

    /// Create the charge entry for an admitted job.
    #[must_use]
    pub fn job_charge(job: &GenerationJob, balance_after: i64) -> Self {
        let mut entry = Self::new(
            job.user_id,
            EntryKind::JobCharge,
            -job.credits_charged.abs(), // Always negative for charges
            balance_after,
            format!("{} generation with {}", job.family, job.model),
        );
        entry.reference_id = Some(job.request_id);
        entry.model = Some(job.model.clone());
        entry
    }

    /// Create the refund entry for a failed job.
    ///
    /// Refunds the full charge, regardless of any provider-reported usage.
    #[must_use]
    pub fn job_refund(job: &GenerationJob, balance_after: i64) -> Self {
        let detail = job.error_detail.as_deref().unwrap_or("generation failed");
        let mut entry = Self::new(
            job.user_id,
            EntryKind::JobRefund,
            job.refund_amount(),
            balance_after,
            format!("Refund for failed {} generation: {detail}", job.family),
        );
        entry.reference_id = Some(job.request_id);
        entry.model = Some(job.model.clone());
        entry
    }

    /// Replace the generated ID and timestamp.
    ///
    /// The store uses this to assign IDs from a monotonic generator while it
    /// holds the commit lock, so per-account key order equals commit order.
    #[must_use]
    pub fn with_id(mut self, id: EntryId, created_at: DateTime<Utc>) -> Self {
        self.id = id;
        self.created_at = created_at;
        self
    }
}

/// Kind of ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// Free credits granted when the account was opened.
    SignupGrant,

    /// Credits bought by the account owner.
    Purchase,

    /// Manual correction by an operator (either sign).
    AdminAdjustment,

    /// Credits reserved for an admitted generation job.
    JobCharge,

    /// Credits returned for a failed generation job.
    JobRefund,
}

impl EntryKind {
    /// Get the kind name as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::SignupGrant => "signup_grant",
            Self::Purchase => "purchase",
            Self::AdminAdjustment => "admin_adjustment",
            Self::JobCharge => "job_charge",
            Self::JobRefund => "job_refund",
        }
    }

    /// Check if this kind always adds credits.
    #[must_use]
    pub const fn is_credit(&self) -> bool {
        matches!(self, Self::SignupGrant | Self::Purchase | Self::JobRefund)
    }

    /// Check if this kind always removes credits.
    #[must_use]
    pub const fn is_debit(&self) -> bool {
        matches!(self, Self::JobCharge)
    }
}

/// Replay entries in creation order and return the final balance.
///
/// The opening balance is zero. Each entry must satisfy
/// `balance_after == previous balance_after + amount`.
///
/// # Errors
///
/// Returns `BillingError::LedgerInconsistent` for the first entry that breaks
/// the chain, including a running sum that overflows.
pub fn replay<'a, I>(entries: I) -> Result<i64>
where
    I: IntoIterator<Item = &'a LedgerEntry>,
{
    entries.into_iter().try_fold(0_i64, |running, entry| {
        match running.checked_add(entry.amount) {
            Some(expected) if entry.balance_after == expected => Ok(expected),
            expected => Err(BillingError::LedgerInconsistent {
                entry_id: entry.id.to_string(),
                // Saturated on overflow.
                expected: expected.unwrap_or_else(|| running.saturating_add(entry.amount)),
                actual: entry.balance_after,
            }),
        }
    })
}
