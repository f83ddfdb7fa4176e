//! API handlers.

pub mod accounts;
pub mod callbacks;
pub mod credits;
pub mod generations;
pub mod health;
