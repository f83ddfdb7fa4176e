//! `RocksDB` ledger store and job registry for genledger.
//!
//! This crate provides durable storage for accounts, ledger entries, and
//! generation jobs using `RocksDB` with column families for indexing.
//!
//! # Architecture
//!
//! The storage uses the following column families:
//!
//! - `accounts`: Account records, keyed by `user_id`
//! - `ledger`: Ledger entries, keyed by `entry_id` (ULID)
//! - `ledger_by_user`: Index for replaying an account's ledger in order
//! - `jobs`: Generation jobs, keyed by `request_id`
//! - `jobs_by_user`: Index for listing an account's jobs
//! - `open_jobs`: Jobs not yet settled, ordered by admission time
//!
//! Every operation that changes a balance writes the account row, the ledger
//! entry and any job change in one `WriteBatch` while holding the store's
//! commit lock, so check-and-decrement can never interleave.
//!
//! # Example
//!
//! ```no_run
//! use genledger_store::{RocksStore, Store};
//! use genledger_core::UserId;
//!
//! let store = RocksStore::open("/tmp/genledger-db").unwrap();
//!
//! let user_id = UserId::generate();
//! let account = store.create_account(user_id, 10).unwrap();
//! assert_eq!(account.balance, 10);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod rocks;
pub mod schema;

pub use error::{Result, StoreError};
pub use rocks::RocksStore;

use chrono::{DateTime, Utc};
use genledger_core::{
    Account, GenerationJob, JobOutcome, LedgerEntry, NewJob, RequestId, SettlementSource, UserId,
};

/// Result of an admission attempt that did not fail.
#[derive(Debug, Clone)]
pub enum Admission {
    /// A new job was created and charged.
    Admitted {
        /// The pending job.
        job: GenerationJob,
        /// The charge entry.
        charge: LedgerEntry,
        /// Balance after the charge.
        balance: i64,
    },
    /// A job with this request ID already exists for the account; nothing was written.
    Replayed {
        /// The existing job.
        job: GenerationJob,
        /// Current balance.
        balance: i64,
    },
}

impl Admission {
    /// The job, whether new or existing.
    #[must_use]
    pub fn job(&self) -> &GenerationJob {
        match self {
            Self::Admitted { job, .. } | Self::Replayed { job, .. } => job,
        }
    }

    /// The account balance after admission.
    #[must_use]
    pub fn balance(&self) -> i64 {
        match self {
            Self::Admitted { balance, .. } | Self::Replayed { balance, .. } => *balance,
        }
    }
}

/// Result of settling a job.
#[derive(Debug, Clone)]
pub enum Settlement {
    /// No job has this request ID; nothing was written.
    UnknownJob,
    /// The job was already terminal; nothing was written.
    AlreadySettled(GenerationJob),
    /// The job moved to `completed`.
    Completed(GenerationJob),
    /// The job moved to `failed` and its charge was refunded.
    Failed {
        /// The failed job.
        job: GenerationJob,
        /// The refund entry.
        refund: LedgerEntry,
        /// Balance after the refund.
        balance: i64,
    },
}

impl Settlement {
    /// The job, if one exists.
    #[must_use]
    pub fn job(&self) -> Option<&GenerationJob> {
        match self {
            Self::UnknownJob => None,
            Self::AlreadySettled(job) | Self::Completed(job) | Self::Failed { job, .. } => {
                Some(job)
            }
        }
    }
}

/// Non-job balance changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditKind {
    /// Credits bought by the account owner. Must be positive.
    Purchase,
    /// Operator correction. Either sign.
    AdminAdjustment,
}

/// The storage trait defining all database operations.
///
/// This trait abstracts the storage layer. Balances are never written
/// directly: every method that changes one also appends the matching
/// ledger entry in the same atomic write.
pub trait Store: Send + Sync {
    // =========================================================================
    // Accounts and Ledger
    // =========================================================================

    /// Open a new account, writing a signup grant entry if `signup_grant > 0`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AccountAlreadyExists` if the account exists.
    fn create_account(&self, user_id: UserId, signup_grant: i64) -> Result<Account>;

    /// Get an account by user ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_account(&self, user_id: &UserId) -> Result<Option<Account>>;

    /// Post a purchase or admin adjustment and return the new entry.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the account doesn't exist.
    /// - `StoreError::InsufficientFunds` if a negative adjustment exceeds the balance.
    /// - `StoreError::Billing` for a zero amount or a non-positive purchase.
    fn post_credit(
        &self,
        user_id: &UserId,
        kind: CreditKind,
        amount: i64,
        note: String,
    ) -> Result<LedgerEntry>;

    /// List ledger entries for an account, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_entries_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LedgerEntry>>;

    /// All ledger entries for an account, oldest first, for replay.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn ledger_for_user(&self, user_id: &UserId) -> Result<Vec<LedgerEntry>>;

    // =========================================================================
    // Job Registry
    // =========================================================================

    /// Get a job by request ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_job(&self, request_id: &RequestId) -> Result<Option<GenerationJob>>;

    /// List jobs for an account, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_jobs_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<GenerationJob>>;

    /// Unsettled jobs admitted before `created_before`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_open_jobs(
        &self,
        created_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<GenerationJob>>;

    // =========================================================================
    // Compound Operations
    // =========================================================================

    /// Admit a job: check the balance, charge it, and create the pending job atomically.
    ///
    /// If a job with the same request ID already exists for the same account,
    /// returns it unchanged as `Admission::Replayed`.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the account doesn't exist.
    /// - `StoreError::InsufficientFunds` if the balance is below the price.
    /// - `StoreError::RequestIdConflict` if another account owns the request ID.
    fn admit_job(&self, new_job: NewJob) -> Result<Admission>;

    /// Record that the provider accepted a job. Only moves `pending` jobs.
    ///
    /// Returns the job as stored afterwards, or `None` if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn mark_processing(
        &self,
        request_id: &RequestId,
        provider_task_id: String,
    ) -> Result<Option<GenerationJob>>;

    /// Settle a job, refunding its full charge on failure, atomically.
    ///
    /// At most one call per job ever changes anything: once the job is
    /// terminal, later calls return `Settlement::AlreadySettled`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn settle_job(
        &self,
        request_id: &RequestId,
        outcome: JobOutcome,
        source: SettlementSource,
    ) -> Result<Settlement>;
}
