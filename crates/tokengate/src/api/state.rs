//! Application state shared across handlers.

use std::sync::Arc;

use anyhow::{Context, Result};

use super::proxy::ProxyForwarder;
use crate::auth::{AuthGuard, LoginService, PasswordVerifier, TokenService};
use crate::config::AppConfig;
use crate::user::{FileUserStore, UserStore};

/// Application state shared across all handlers.
///
/// Everything in here is immutable once built; cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    /// Token issuer/verifier.
    pub tokens: Arc<TokenService>,
    /// Bearer token guard for protected routes.
    pub guard: AuthGuard,
    /// Credential exchange for `POST /auth/token`.
    pub login: LoginService,
    /// Pass-through to the backend.
    pub forwarder: ProxyForwarder,
    /// Cross-origin allow list (`"*"` reflects any origin).
    pub allowed_origins: Vec<String>,
}

impl AppState {
    pub fn new(
        tokens: Arc<TokenService>,
        users: Arc<dyn UserStore>,
        passwords: PasswordVerifier,
        forwarder: ProxyForwarder,
    ) -> Self {
        let guard = AuthGuard::new(Arc::clone(&tokens), Arc::clone(&users));
        let login = LoginService::new(users, passwords, Arc::clone(&tokens));
        Self {
            tokens,
            guard,
            login,
            forwarder,
            allowed_origins: vec!["*".to_string()],
        }
    }

    /// Replace the cross-origin allow list.
    pub fn with_allowed_origins(mut self, origins: Vec<String>) -> Self {
        self.allowed_origins = origins;
        self
    }

    /// Build the state from validated configuration.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let settings = config
            .auth
            .token_settings()
            .context("invalid auth configuration")?;
        let cost = config.auth.validate_bcrypt_cost()?;
        let passwords = PasswordVerifier::new(cost).context("preparing password verifier")?;

        let forwarder = ProxyForwarder::new(
            config.backend.base_uri()?,
            config.backend.timeout()?,
            config.backend.idle_timeout()?,
        );
        let users: Arc<dyn UserStore> = Arc::new(FileUserStore::new(config.users.path.clone()));

        Ok(Self::new(
            Arc::new(TokenService::new(settings)),
            users,
            passwords,
            forwarder,
        )
        .with_allowed_origins(config.server.allowed_origins.clone()))
    }
}
