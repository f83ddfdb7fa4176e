//! Account management handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use genledger_core::Account;
use genledger_store::Store;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Account response.
#[derive(Debug, Serialize)]
pub struct AccountResponse {
    /// User ID.
    pub user_id: String,
    /// Current credit balance.
    pub balance: i64,
    /// Lifetime credits granted.
    pub lifetime_granted: i64,
    /// Lifetime credits purchased.
    pub lifetime_purchased: i64,
    /// Lifetime credits charged for generations.
    pub lifetime_charged: i64,
    /// Lifetime credits refunded for failed generations.
    pub lifetime_refunded: i64,
    /// Created timestamp.
    pub created_at: String,
}

impl From<&Account> for AccountResponse {
    fn from(account: &Account) -> Self {
        Self {
            user_id: account.user_id.to_string(),
            balance: account.balance,
            lifetime_granted: account.lifetime_granted,
            lifetime_purchased: account.lifetime_purchased,
            lifetime_charged: account.lifetime_charged,
            lifetime_refunded: account.lifetime_refunded,
            created_at: account.created_at.to_rfc3339(),
        }
    }
}

/// Open an account for the caller, with the configured signup grant.
pub async fn create_account(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<AccountResponse>, ApiError> {
    let account = state
        .store
        .create_account(auth.user_id, state.config.signup_grant_credits)?;

    tracing::info!(
        user_id = %auth.user_id,
        balance = account.balance,
        "Account created"
    );

    Ok(Json(AccountResponse::from(&account)))
}

/// Get the caller's account.
pub async fn get_account(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<AccountResponse>, ApiError> {
    let account = state
        .store
        .get_account(&auth.user_id)?
        .ok_or_else(|| ApiError::NotFound("Account not found".into()))?;

    Ok(Json(AccountResponse::from(&account)))
}
