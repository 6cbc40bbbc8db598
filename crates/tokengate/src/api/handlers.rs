//! HTTP request handlers.

use axum::{
    Form, Json,
    extract::{FromRequest, Request, State},
    http::{StatusCode, header::CONTENT_TYPE},
    response::Response,
};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::error::{ApiError, ApiResult};
use super::state::AppState;
use crate::auth::Principal;
use crate::user::UserProfile;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Login credentials, accepted as an OAuth2 password-grant form or as JSON.
///
/// Extra form fields such as `grant_type` and `scope` are ignored.
#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

impl<S> FromRequest<S> for LoginRequest
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_json = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| {
                ct.trim_start()
                    .to_ascii_lowercase()
                    .starts_with("application/json")
            });

        let parsed = if is_json {
            Json::<LoginRequest>::from_request(req, state)
                .await
                .map(|Json(body)| body)
                .map_err(|e| e.body_text())
        } else {
            Form::<LoginRequest>::from_request(req, state)
                .await
                .map(|Form(body)| body)
                .map_err(|e| e.body_text())
        };

        parsed.map_err(|reason| {
            debug!("Unreadable login request: {reason}");
            ApiError::InvalidCredentials
        })
    }
}

/// Token endpoint response.
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// Exchange username/password for a bearer token.
pub async fn issue_token(
    State(state): State<AppState>,
    credentials: LoginRequest,
) -> ApiResult<Json<TokenResponse>> {
    let token = state
        .login
        .issue_token(&credentials.username, &credentials.password)
        .await?;

    Ok(Json(TokenResponse {
        access_token: token.into_string(),
        token_type: "bearer".to_string(),
        expires_in: state.tokens.default_ttl().num_seconds(),
    }))
}

/// The authenticated user's profile.
pub async fn me(principal: Principal) -> Json<UserProfile> {
    Json(principal.user().profile())
}

/// Paths under `/auth/` that no handler claims.
pub async fn reserved() -> StatusCode {
    StatusCode::NOT_FOUND
}

/// Forward an authenticated request to the backend.
pub async fn proxy(
    State(state): State<AppState>,
    principal: Principal,
    req: Request,
) -> ApiResult<Response> {
    info!(
        "Forwarding {} {} for {}",
        req.method(),
        req.uri().path(),
        principal.username()
    );
    Ok(state.forwarder.forward(req).await?)
}
