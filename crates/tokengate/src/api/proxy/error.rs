//! Forwarding errors.

use std::time::Duration;

use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::api::ApiError;

#[derive(Debug, Error)]
pub enum ProxyError {
    /// The connection to the backend could not be established.
    #[error("backend unreachable: {0}")]
    Unreachable(String),

    /// No response head arrived within the bound.
    #[error("backend did not respond within {0:?}")]
    Timeout(Duration),

    /// Anything else that went wrong before a response was available.
    #[error("forwarding failed: {0}")]
    Internal(String),
}

impl From<ProxyError> for ApiError {
    fn from(err: ProxyError) -> Self {
        match err {
            ProxyError::Unreachable(msg) => ApiError::BackendUnreachable(msg),
            ProxyError::Timeout(after) => ApiError::BackendTimeout(after),
            ProxyError::Internal(msg) => ApiError::Internal(msg),
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}
