//! Account types for genledger.
//!
//! An account carries a single integer credit balance. The balance is only
//! ever changed by the store together with exactly one [`LedgerEntry`].
//!
//! [`LedgerEntry`]: crate::LedgerEntry

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::UserId;

/// A prepaid credit account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// The account owner.
    pub user_id: UserId,

    /// Current credit balance. Never negative after a committed operation.
    pub balance: i64,

    /// Lifetime credits granted (signup grants, positive admin adjustments).
    pub lifetime_granted: i64,

    /// Lifetime credits purchased.
    pub lifetime_purchased: i64,

    /// Lifetime credits charged for generation jobs.
    pub lifetime_charged: i64,

    /// Lifetime credits refunded for failed generation jobs.
    pub lifetime_refunded: i64,

    /// When the account was created.
    pub created_at: DateTime<Utc>,

    /// When the account was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create a new account with zero balance.
    #[must_use]
    pub fn new(user_id: UserId) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            balance: 0,
            lifetime_granted: 0,
            lifetime_purchased: 0,
            lifetime_charged: 0,
            lifetime_refunded: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if the account can cover a charge of `amount` credits.
    #[must_use]
    pub fn has_sufficient_credits(&self, amount: i64) -> bool {
        self.balance >= amount
    }

    /// How many credits are missing to cover `required`, or zero.
    #[must_use]
    pub fn shortfall(&self, required: i64) -> i64 {
        (required - self.balance).max(0)
    }
}
