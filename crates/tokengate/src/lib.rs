//! tokengate - bearer-token authentication gateway.
//!
//! Issues HMAC-signed access tokens for username/password credentials and
//! forwards authenticated requests to a single backend service, streaming
//! bodies in both directions.

pub mod api;
pub mod auth;
pub mod config;
pub mod user;
