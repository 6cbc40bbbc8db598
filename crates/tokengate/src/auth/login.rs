//! Username/password login producing bearer tokens.

use std::sync::Arc;

use log::{debug, info};

use super::{AuthError, PasswordVerifier, SignedToken, TokenService};
use crate::user::UserStore;

/// Exchanges credentials for a signed token.
#[derive(Clone)]
pub struct LoginService {
    users: Arc<dyn UserStore>,
    passwords: PasswordVerifier,
    tokens: Arc<TokenService>,
}

impl LoginService {
    pub fn new(
        users: Arc<dyn UserStore>,
        passwords: PasswordVerifier,
        tokens: Arc<TokenService>,
    ) -> Self {
        Self {
            users,
            passwords,
            tokens,
        }
    }

    /// Verify `username`/`password` and issue a token for the user.
    ///
    /// An unknown user and a wrong password both yield
    /// [`AuthError::InvalidCredentials`].
    pub async fn issue_token(&self, username: &str, password: &str) -> Result<SignedToken, AuthError> {
        let user = self
            .users
            .lookup(username)
            .await?
            .filter(|u| !u.username.is_empty());

        let hash = user.as_ref().map(|u| u.password_hash.as_str());
        if !self.passwords.verify(password, hash).await? {
            debug!("login rejected for {username} (known={})", user.is_some());
            return Err(AuthError::InvalidCredentials);
        }

        let token = self
            .tokens
            .issue(username)
            .map_err(|e| AuthError::Internal(e.to_string()))?;
        info!("issued access token for {username}");
        Ok(token)
    }
}
