//! Data models representing database entities.
//!
//! This module contains all data structures that map to database tables,
//! plus the request/response bodies built around them.

/// Registered user accounts
pub mod account;
/// Bonus grants
pub mod bonus;
/// Events reported by the external payment processor
pub mod external;
/// Password reset tokens
pub mod password_reset;
/// Ledger entries
pub mod transaction;
/// One wallet per account
pub mod wallet;
