//! Credential helpers used by the account service and auth middleware.

pub mod jwt;
pub mod password;
