//! # food-gateway
//!
//! Backend proxy between a nutrition-tracking client and the FatSecret
//! Platform API. Owns the OAuth client-credentials token lifecycle, wraps
//! every upstream call with retry/backoff and transparent
//! re-authentication, and persists user-entered nutrition logs.
//!
//! Modules:
//! - `auth` — token manager: acquisition, caching, proactive renewal
//! - `upstream` — resilient call wrapper around proxied API operations
//! - `routes` — thin HTTP layer over the wrapper and the store
//! - `store` — SQLite persistence for profiles, day logs and food cache
//! - `barcode` — UPC-E to GTIN-13 normalization

pub mod auth;
pub mod barcode;
pub mod config;
pub mod error;
pub mod observability;
pub mod resilience;
pub mod routes;
pub mod server;
pub mod store;
pub mod upstream;
pub mod utils;

#[cfg(test)]
pub mod tests;

pub use crate::error::{GatewayError, Result};
