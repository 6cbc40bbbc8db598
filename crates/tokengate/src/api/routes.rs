//! API route definitions.

use axum::http::{HeaderValue, Method};
use axum::{
    Router, middleware,
    routing::{any, get, post},
};
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::auth::auth_middleware;

use super::handlers;
use super::state::AppState;

/// Create the application router.
///
/// `/auth/*` belongs to the gateway. Everything else is authenticated and
/// forwarded to the backend.
pub fn create_router(state: AppState) -> Router {
    let cors = build_cors_layer(&state.allowed_origins);

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::DEBUG))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    let guard = state.guard.clone();

    // Public routes (no authentication)
    let public_routes = Router::new()
        .route("/auth/token", post(handlers::issue_token))
        .route("/auth/health", get(handlers::health))
        .route("/auth/{*rest}", any(handlers::reserved));

    // Protected routes (require a bearer token)
    let protected_routes = Router::new()
        .route("/auth/me", get(handlers::me))
        .fallback(handlers::proxy)
        .layer(middleware::from_fn_with_state(guard, auth_middleware));

    // CORS sits outside the auth layer so preflights never need a token.
    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(cors)
        .layer(trace_layer)
        .with_state(state)
}

/// Build the CORS layer from the configured origins.
///
/// `"*"` reflects the caller's origin (credentials stay allowed, which a
/// literal wildcard would forbid). An empty or fully invalid list denies all
/// cross-origin requests.
fn build_cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let methods = [
        Method::GET,
        Method::HEAD,
        Method::POST,
        Method::PUT,
        Method::DELETE,
        Method::PATCH,
        Method::OPTIONS,
    ];

    if allowed_origins.iter().any(|o| o.trim() == "*") {
        tracing::info!("CORS: Allowing any origin");
        return CorsLayer::new()
            .allow_origin(AllowOrigin::mirror_request())
            .allow_methods(methods)
            .allow_headers(AllowHeaders::mirror_request())
            .allow_credentials(true);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| {
            origin.trim().parse::<HeaderValue>().ok().or_else(|| {
                tracing::warn!("CORS: Invalid origin in config: {}", origin);
                None
            })
        })
        .collect();

    if origins.is_empty() {
        tracing::warn!("CORS: No usable origins configured, denying all cross-origin requests");
        return CorsLayer::new().allow_origin(AllowOrigin::exact(HeaderValue::from_static("null")));
    }

    tracing::info!("CORS: Allowing {} origin(s)", origins.len());
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(methods)
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}
