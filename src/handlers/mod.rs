//! HTTP request handlers (route handlers).
//!
//! Each handler is an async function that:
//! 1. Receives HTTP request data (JSON body, URL params, auth context)
//! 2. Validates input and calls a service
//! 3. Returns a `{ "success": true, ... }` JSON body, or an `AppError`

/// Registration, login and password reset
pub mod auth;
pub mod bonus;
pub mod health;
pub mod transactions;
pub mod users;
pub mod wallet;
