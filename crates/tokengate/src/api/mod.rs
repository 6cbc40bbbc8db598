//! HTTP API module.
//!
//! The gateway's own endpoints under `/auth/` and the authenticated
//! pass-through for everything else.

mod error;
mod handlers;
pub mod proxy;
mod routes;
mod state;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use handlers::{HealthResponse, LoginRequest, TokenResponse};
pub use routes::create_router;
pub use state::AppState;
