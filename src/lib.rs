//! Custodial wallet service.
//!
//! A REST API where users register, hold a single-currency wallet, transfer
//! money to each other by username, import deposits and withdrawals from an
//! external payment processor, and spin a wheel of fortune for bonuses once
//! they have made a large enough withdrawal.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **Database**: PostgreSQL with sqlx (async queries, row locks)
//! - **Authentication**: HS256 bearer tokens
//! - **Ledger**: immutable transaction rows; balances change only alongside them
//! - **Format**: JSON requests/responses

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod utils;
