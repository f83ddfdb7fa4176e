//! Error types for genledger storage.

use genledger_core::BillingError;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Record not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// What kind of record was looked up.
        entity: &'static str,
        /// The key that was looked up.
        id: String,
    },

    /// The account already exists.
    #[error("account already exists: {user_id}")]
    AccountAlreadyExists {
        /// The account's user ID.
        user_id: String,
    },

    /// Not enough credits for the operation. Nothing was written.
    #[error("insufficient funds: required={required}, available={available}")]
    InsufficientFunds {
        /// Credits the operation needs.
        required: i64,
        /// Credits currently on the account.
        available: i64,
    },

    /// The request ID is already used by a job of another account.
    #[error("request id already in use: {request_id}")]
    RequestIdConflict {
        /// The contested request ID.
        request_id: String,
    },

    /// A domain rule was violated.
    #[error(transparent)]
    Billing(#[from] BillingError),
}
