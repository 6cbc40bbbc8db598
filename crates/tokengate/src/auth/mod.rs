//! Authentication module.
//!
//! Provides:
//! - HMAC-signed, time-bounded bearer tokens
//! - the guard middleware that resolves a bearer token to a user
//! - the password login that issues tokens

mod claims;
mod error;
mod guard;
mod login;
mod password;
mod token;

pub use claims::Claims;
pub use error::AuthError;
pub use guard::{AuthGuard, Principal, auth_middleware};
pub use login::LoginService;
pub use password::{PasswordVerifier, hash_password};
pub use token::{
    MAX_LEEWAY_SECS, SignedToken, TokenError, TokenRejection, TokenService, TokenSettings,
    is_hmac,
};
