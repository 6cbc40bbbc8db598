//! Reverse proxy to the backend service.

mod error;
mod forwarder;

pub use error::ProxyError;
pub use forwarder::{DEFAULT_IDLE_TIMEOUT, DEFAULT_TIMEOUT, HttpClient, ProxyForwarder};
