//! Authentication errors.

use axum::response::{IntoResponse, Response};
use thiserror::Error;

use super::TokenRejection;
use crate::api::ApiError;
use crate::user::StoreError;

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Missing authorization header.
    #[error("missing authorization header")]
    MissingAuthHeader,

    /// Invalid authorization header format.
    #[error("invalid authorization header format")]
    InvalidAuthHeader,

    /// Token failed verification.
    #[error("invalid token: {0}")]
    InvalidToken(#[from] TokenRejection),

    /// Token is valid but names no known user.
    #[error("user not found")]
    UserNotFound,

    /// Unknown user or wrong password on login.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Internal error.
    #[error("internal auth error: {0}")]
    Internal(String),
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        AuthError::Internal(format!("user store: {err}"))
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingAuthHeader
            | AuthError::InvalidAuthHeader
            | AuthError::InvalidToken(_) => ApiError::Unauthenticated(err.to_string()),
            AuthError::UserNotFound => ApiError::UserNotFound,
            AuthError::InvalidCredentials => ApiError::InvalidCredentials,
            AuthError::Internal(msg) => ApiError::Internal(msg),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}
