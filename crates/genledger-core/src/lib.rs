//! Core types and utilities for genledger.
//!
//! This crate provides the foundational types of the credit ledger and
//! generation job lifecycle:
//!
//! - **Identifiers**: `UserId`, `RequestId`, `EntryId`
//! - **Accounts**: `Account`
//! - **Ledger**: `LedgerEntry`, `EntryKind`, `replay`
//! - **Jobs**: `GenerationJob`, `JobStatus`, `JobOutcome`, `StatusSnapshot`
//! - **Pricing**: `PricingConfig`, `ModelPrice`
//!
//! # Credits
//!
//! Credits are whole units stored as `i64`. A job's price is fixed when it is
//! admitted; a failed job is refunded its full price.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod account;
pub mod error;
pub mod ids;
pub mod job;
pub mod ledger;
pub mod pricing;

pub use account::Account;
pub use error::{BillingError, Result};
pub use ids::{EntryId, IdError, RequestId, UserId};
pub use job::{
    GenerationJob, JobFamily, JobOutcome, JobStatus, NewJob, SettlementSource, StatusSnapshot,
    PROCESSING_PERCENTAGE,
};
pub use ledger::{replay, EntryKind, LedgerEntry};
pub use pricing::{ModelPrice, PricingConfig};
