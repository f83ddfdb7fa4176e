//! Credit balance, ledger and audit handlers.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use genledger_core::{replay, LedgerEntry, UserId};
use genledger_store::{CreditKind, Store};

use crate::auth::{AdminAuth, AuthUser};
use crate::error::ApiError;
use crate::state::AppState;

/// Maximum page size for ledger listings.
const MAX_PAGE_SIZE: usize = 100;

/// Balance response.
#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    /// Current credit balance.
    pub balance: i64,
}

/// Get current credit balance.
pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<BalanceResponse>, ApiError> {
    let account = state
        .store
        .get_account(&auth.user_id)?
        .ok_or_else(|| ApiError::NotFound("Account not found".into()))?;

    Ok(Json(BalanceResponse {
        balance: account.balance,
    }))
}

/// Pagination query parameters.
#[derive(Debug, Deserialize)]
pub struct PageQuery {
    /// Maximum number of items to return (default: 50, max: 100).
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Offset for pagination (default: 0).
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    50
}

impl PageQuery {
    /// The requested limit, capped.
    #[must_use]
    pub fn capped_limit(&self) -> usize {
        self.limit.min(MAX_PAGE_SIZE)
    }
}

/// Ledger entry response.
#[derive(Debug, Serialize)]
pub struct EntryResponse {
    /// Entry ID.
    pub id: String,
    /// Signed amount (positive = credit, negative = debit).
    pub amount: i64,
    /// Entry kind.
    pub kind: String,
    /// Balance after this entry.
    pub balance_after: i64,
    /// Related generation job.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<String>,
    /// Model label.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Note.
    pub note: String,
    /// Timestamp.
    pub created_at: String,
}

impl From<&LedgerEntry> for EntryResponse {
    fn from(entry: &LedgerEntry) -> Self {
        Self {
            id: entry.id.to_string(),
            amount: entry.amount,
            kind: entry.kind.as_str().to_string(),
            balance_after: entry.balance_after,
            reference_id: entry.reference_id.map(|id| id.to_string()),
            model: entry.model.clone(),
            note: entry.note.clone(),
            created_at: entry.created_at.to_rfc3339(),
        }
    }
}

/// List transactions response.
#[derive(Debug, Serialize)]
pub struct ListTransactionsResponse {
    /// Ledger entries (newest first).
    pub transactions: Vec<EntryResponse>,
    /// Whether there are more entries.
    pub has_more: bool,
}

/// List ledger history.
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(query): Query<PageQuery>,
) -> Result<Json<ListTransactionsResponse>, ApiError> {
    state
        .store
        .get_account(&auth.user_id)?
        .ok_or_else(|| ApiError::NotFound("Account not found".into()))?;

    // Fetch one more than requested to determine has_more
    let limit = query.capped_limit();
    let entries = state
        .store
        .list_entries_by_user(&auth.user_id, limit + 1, query.offset)?;

    let has_more = entries.len() > limit;
    let transactions = entries.iter().take(limit).map(EntryResponse::from).collect();

    Ok(Json(ListTransactionsResponse {
        transactions,
        has_more,
    }))
}

/// Ledger audit response.
#[derive(Debug, Serialize)]
pub struct AuditResponse {
    /// Balance stored on the account.
    pub balance: i64,
    /// Balance obtained by replaying the ledger, if the chain is intact.
    pub replayed_balance: Option<i64>,
    /// Number of ledger entries.
    pub entry_count: usize,
    /// Whether the chain is intact and matches the stored balance.
    pub consistent: bool,
    /// First inconsistency found, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Replay the caller's ledger and compare it with the stored balance.
pub async fn audit(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<AuditResponse>, ApiError> {
    let account = state
        .store
        .get_account(&auth.user_id)?
        .ok_or_else(|| ApiError::NotFound("Account not found".into()))?;
    let entries = state.store.ledger_for_user(&auth.user_id)?;

    let (replayed_balance, error) = match replay(&entries) {
        Ok(balance) => (Some(balance), None),
        Err(e) => {
            tracing::error!(user_id = %auth.user_id, error = %e, "Ledger audit failed");
            (None, Some(e.to_string()))
        }
    };

    Ok(Json(AuditResponse {
        balance: account.balance,
        replayed_balance,
        entry_count: entries.len(),
        consistent: replayed_balance == Some(account.balance),
        error,
    }))
}

/// Admin credit request.
#[derive(Debug, Deserialize)]
pub struct AdminAddCreditsRequest {
    /// Account to credit.
    pub user_id: String,
    /// Signed amount. Purchases must be positive.
    pub amount: i64,
    /// Entry kind (default: admin adjustment).
    #[serde(default)]
    pub kind: AdminCreditKind,
    /// Reason for the entry.
    pub reason: String,
}

/// Entry kinds an admin may post.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminCreditKind {
    /// A purchase made outside the service.
    Purchase,
    /// A manual correction.
    #[default]
    AdminAdjustment,
}

impl From<AdminCreditKind> for CreditKind {
    fn from(kind: AdminCreditKind) -> Self {
        match kind {
            AdminCreditKind::Purchase => Self::Purchase,
            AdminCreditKind::AdminAdjustment => Self::AdminAdjustment,
        }
    }
}

/// Admin credit response.
#[derive(Debug, Serialize)]
pub struct AdminAddCreditsResponse {
    /// The new entry.
    pub entry: EntryResponse,
    /// Balance after the entry.
    pub balance: i64,
}

/// Admin endpoint to post a purchase or adjustment.
pub async fn admin_add_credits(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
    Json(body): Json<AdminAddCreditsRequest>,
) -> Result<Json<AdminAddCreditsResponse>, ApiError> {
    let user_id: UserId = body
        .user_id
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid user ID".into()))?;

    let entry = state
        .store
        .post_credit(&user_id, body.kind.into(), body.amount, body.reason.clone())?;

    tracing::info!(
        admin_id = %admin.admin_id,
        user_id = %user_id,
        kind = entry.kind.as_str(),
        credits = body.amount,
        reason = %body.reason,
        balance = entry.balance_after,
        "Credits posted by admin"
    );

    Ok(Json(AdminAddCreditsResponse {
        balance: entry.balance_after,
        entry: EntryResponse::from(&entry),
    }))
}
