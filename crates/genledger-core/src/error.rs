//! Error types for genledger.

use crate::ids::IdError;
use crate::job::JobFamily;

/// Result type for genledger domain operations.
pub type Result<T> = std::result::Result<T, BillingError>;

/// Errors raised by the pure domain layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BillingError {
    /// The model is not in the price table.
    #[error("unknown model: {model}")]
    UnknownModel {
        /// The requested model identifier.
        model: String,
    },

    /// The model exists but belongs to a different job family.
    #[error("model {model} is a {expected} model, not {requested}")]
    ModelFamilyMismatch {
        /// The requested model identifier.
        model: String,
        /// The family the price table lists for the model.
        expected: JobFamily,
        /// The family the caller asked for.
        requested: JobFamily,
    },

    /// Replaying the ledger found an entry whose running balance does not add up.
    #[error("ledger inconsistent at entry {entry_id}: expected balance {expected}, recorded {actual}")]
    LedgerInconsistent {
        /// The first entry that breaks the chain.
        entry_id: String,
        /// Balance implied by the previous entry plus this entry's amount.
        expected: i64,
        /// Balance recorded on the entry.
        actual: i64,
    },

    /// A lifecycle transition was attempted on a job that is already terminal.
    #[error("job already settled: {request_id}")]
    JobAlreadySettled {
        /// The job's request ID.
        request_id: String,
    },

    /// Invalid amount.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),
}
