//! Gateway error taxonomy and its HTTP mapping.
//!
//! Every rejection the gateway produces ends up here. Each variant maps to
//! exactly one status code and one fixed, generic message; the detail carried
//! by a variant is logged and never sent to the caller.

use std::time::Duration;

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::WWW_AUTHENTICATE},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, warn};

/// Gateway-facing error.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("user not found")]
    UserNotFound,

    #[error("backend unreachable: {0}")]
    BackendUnreachable(String),

    #[error("backend timed out after {0:?}")]
    BackendTimeout(Duration),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidCredentials | Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::UserNotFound => StatusCode::NOT_FOUND,
            Self::BackendUnreachable(_) => StatusCode::BAD_GATEWAY,
            Self::BackendTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "invalid_credentials",
            Self::Unauthenticated(_) => "unauthenticated",
            Self::UserNotFound => "user_not_found",
            Self::BackendUnreachable(_) => "backend_unreachable",
            Self::BackendTimeout(_) => "backend_timeout",
            Self::Internal(_) => "internal_error",
        }
    }

    /// The message shown to callers.
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "Incorrect username or password",
            Self::Unauthenticated(_) => "Invalid authentication credentials",
            Self::UserNotFound => "User not found",
            Self::BackendUnreachable(_) => "Backend service unreachable",
            Self::BackendTimeout(_) => "Backend service timed out",
            Self::Internal(_) => "Internal server error",
        }
    }
}

/// Structured error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
    pub code: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();

        match &self {
            ApiError::Internal(msg) => {
                error!(error_code = code, message = %msg, "gateway error");
            }
            ApiError::BackendUnreachable(_) | ApiError::BackendTimeout(_) => {
                warn!(error_code = code, message = %self, "backend failure");
            }
            _ => {
                debug!(error_code = code, message = %self, "request rejected");
            }
        }

        let body = ErrorResponse {
            error: self.public_message(),
            code,
        };

        let mut response = (status, Json(body)).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;
