//! API error types and responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use genledger_core::BillingError;
use genledger_store::StoreError;

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Unauthorized - missing or invalid credentials.
    #[error("unauthorized")]
    Unauthorized,

    /// Forbidden - valid credentials but the resource belongs to someone else.
    #[error("forbidden")]
    Forbidden,

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Bad request - invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Malformed provider callback.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// Conflict - resource already exists.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Not enough credits. Nothing was charged.
    #[error("insufficient funds: required={required}, available={available}")]
    InsufficientFunds {
        /// Credits the job costs.
        required: i64,
        /// Credits on the account.
        available: i64,
    },

    /// The job could not be dispatched. The charge has already been refunded.
    #[error("generation failed: {message}")]
    GenerationFailed {
        /// The job's request ID.
        request_id: String,
        /// What went wrong.
        message: String,
    },

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                self.to_string(),
                None,
            ),
            Self::Forbidden => (StatusCode::FORBIDDEN, "forbidden", self.to_string(), None),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone(), None),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone(), None),
            Self::InvalidPayload(msg) => (
                StatusCode::BAD_REQUEST,
                "invalid_payload",
                msg.clone(),
                None,
            ),
            Self::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone(), None),
            Self::InsufficientFunds {
                required,
                available,
            } => (
                StatusCode::PAYMENT_REQUIRED,
                "insufficient_funds",
                self.to_string(),
                Some(serde_json::json!({
                    "required": required,
                    "available": available,
                    "shortfall": (required - available).max(0),
                })),
            ),
            Self::GenerationFailed {
                request_id,
                message,
            } => (
                StatusCode::BAD_GATEWAY,
                "generation_failed",
                message.clone(),
                Some(serde_json::json!({
                    "request_id": request_id,
                    "refunded": true,
                })),
            ),
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => Self::NotFound(format!("{entity} not found: {id}")),
            StoreError::AccountAlreadyExists { user_id } => {
                Self::Conflict(format!("account already exists: {user_id}"))
            }
            StoreError::InsufficientFunds {
                required,
                available,
            } => Self::InsufficientFunds {
                required,
                available,
            },
            StoreError::RequestIdConflict { request_id } => {
                Self::Conflict(format!("request id already in use: {request_id}"))
            }
            StoreError::Billing(e) => e.into(),
            StoreError::Database(msg) | StoreError::Serialization(msg) => Self::Internal(msg),
        }
    }
}

impl From<BillingError> for ApiError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::UnknownModel { .. }
            | BillingError::ModelFamilyMismatch { .. }
            | BillingError::InvalidAmount(_)
            | BillingError::InvalidId(_) => Self::BadRequest(err.to_string()),
            BillingError::JobAlreadySettled { .. } => Self::Conflict(err.to_string()),
            BillingError::LedgerInconsistent { .. } => Self::Internal(err.to_string()),
        }
    }
}
