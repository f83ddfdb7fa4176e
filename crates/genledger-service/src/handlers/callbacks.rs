//! Provider callback handler.
//!
//! The signature is checked over the raw body before anything is parsed.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::Serialize;

use crate::crypto::verify_callback_signature;
use crate::error::ApiError;
use crate::reconcile::{self, CallbackPayload, ReconcileResult};
use crate::state::AppState;

/// Header carrying the hex HMAC-SHA256 of the body.
pub const SIGNATURE_HEADER: &str = "x-provider-signature";

/// Callback acknowledgement.
#[derive(Debug, Serialize)]
pub struct CallbackAck {
    /// Always true.
    pub received: bool,
    /// What the delivery did.
    pub result: ReconcileResult,
}

/// Receive a job outcome from the generation provider.
pub async fn provider_callback(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<CallbackAck>, ApiError> {
    let Some(secret) = state.config.callback_secret.as_deref() else {
        tracing::warn!("Callback received but no callback secret is configured");
        return Err(ApiError::Unauthorized);
    };

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;

    if !verify_callback_signature(secret, &body, signature) {
        tracing::warn!("Callback signature mismatch");
        return Err(ApiError::Unauthorized);
    }

    let payload: CallbackPayload = serde_json::from_slice(&body).map_err(|e| {
        tracing::warn!(error = %e, "Malformed callback payload");
        ApiError::InvalidPayload(e.to_string())
    })?;

    let result = reconcile::reconcile(&state, payload).await?;

    Ok(Json(CallbackAck {
        received: true,
        result,
    }))
}
