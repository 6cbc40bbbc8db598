//! Bcrypt password hashing and verification.

use std::sync::Arc;

use log::warn;

use super::AuthError;

/// Hash a password with bcrypt at `cost`.
pub fn hash_password(password: &str, cost: u32) -> Result<String, bcrypt::BcryptError> {
    bcrypt::hash(password, cost)
}

/// Verifies passwords off the async runtime.
///
/// Holds a hash of a throwaway password at the configured cost so that a
/// login for an unknown user does the same amount of work as one for a known
/// user with a wrong password.
#[derive(Clone)]
pub struct PasswordVerifier {
    dummy_hash: Arc<str>,
}

impl PasswordVerifier {
    pub fn new(cost: u32) -> Result<Self, bcrypt::BcryptError> {
        let dummy = hash_password("tokengate-placeholder-password", cost)?;
        Ok(Self {
            dummy_hash: Arc::from(dummy),
        })
    }

    /// Check `password` against `hash`. With no hash the dummy is checked and
    /// the result is always `false`.
    pub async fn verify(&self, password: &str, hash: Option<&str>) -> Result<bool, AuthError> {
        let known = hash.is_some();
        let hash = match hash {
            Some(h) => h.to_string(),
            None => self.dummy_hash.to_string(),
        };
        let password = password.to_string();

        let matched = tokio::task::spawn_blocking(move || {
            bcrypt::verify(&password, &hash).unwrap_or_else(|e| {
                warn!("stored password hash is unusable: {e}");
                false
            })
        })
        .await
        .map_err(|e| AuthError::Internal(format!("password check aborted: {e}")))?;

        Ok(known && matched)
    }
}

impl std::fmt::Debug for PasswordVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordVerifier").finish_non_exhaustive()
    }
}
