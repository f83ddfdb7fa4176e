//! Database schema definitions and column families.
//!
//! This module defines the column families used in `RocksDB` storage.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Primary account records, keyed by `user_id`.
    pub const ACCOUNTS: &str = "accounts";

    /// Ledger entries, keyed by `entry_id` (ULID).
    pub const LEDGER: &str = "ledger";

    /// Index: ledger entries by account, keyed by `user_id || entry_id`.
    /// Value is empty (index only).
    pub const LEDGER_BY_USER: &str = "ledger_by_user";

    /// Generation jobs, keyed by `request_id`.
    pub const JOBS: &str = "jobs";

    /// Index: jobs by account, keyed by `user_id || charge_entry_id`.
    /// Value is the `request_id`.
    pub const JOBS_BY_USER: &str = "jobs_by_user";

    /// Index: jobs not yet settled, keyed by `charge_entry_id`.
    /// Value is the `request_id`. Removed when the job is settled.
    pub const OPEN_JOBS: &str = "open_jobs";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::ACCOUNTS,
        cf::LEDGER,
        cf::LEDGER_BY_USER,
        cf::JOBS,
        cf::JOBS_BY_USER,
        cf::OPEN_JOBS,
    ]
}
