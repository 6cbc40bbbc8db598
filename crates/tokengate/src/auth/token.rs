//! Token issuance and verification.
//!
//! Tokens are compact HMAC-signed JWTs carrying `sub`, `exp` and `iat`.
//! Verification is a pure function of the token, the current time and the
//! configured secret, so a single [`TokenService`] can be shared by every
//! request handler without synchronization.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use log::debug;
use thiserror::Error;

use super::Claims;

/// Upper bound on the clock-skew leeway accepted at verification.
pub const MAX_LEEWAY_SECS: u64 = 60;

/// Why a token was rejected.
///
/// These reasons are for logs only. Callers facing the network collapse them
/// into a single unauthenticated response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenRejection {
    /// Signature or algorithm did not match.
    #[error("bad signature")]
    BadSignature,

    /// The `exp` claim is not in the future.
    #[error("token expired")]
    Expired,

    /// The token or its claims could not be decoded, or the subject is empty.
    #[error("malformed claims")]
    MalformedClaims,
}

/// Signing failure. HMAC signing over our own claims does not fail in
/// practice; the variant exists because the encoder is fallible.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("failed to sign token: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
}

/// An encoded, signed token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedToken(String);

impl SignedToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl AsRef<str> for SignedToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Immutable settings for a [`TokenService`].
#[derive(Clone)]
pub struct TokenSettings {
    /// Shared HMAC secret (already resolved).
    pub secret: String,
    /// Signing algorithm. Must be one of the HMAC family.
    pub algorithm: Algorithm,
    /// Lifetime used by [`TokenService::issue`].
    pub default_ttl: Duration,
    /// Clock-skew allowance applied to `exp`, at most [`MAX_LEEWAY_SECS`].
    pub leeway_secs: u64,
}

impl std::fmt::Debug for TokenSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSettings")
            .field("secret", &"<redacted>")
            .field("algorithm", &self.algorithm)
            .field("default_ttl", &self.default_ttl)
            .field("leeway_secs", &self.leeway_secs)
            .finish()
    }
}

/// Whether an algorithm belongs to the HMAC-SHA family.
pub fn is_hmac(algorithm: Algorithm) -> bool {
    matches!(
        algorithm,
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
    )
}

/// Issues and verifies signed, time-bounded tokens.
#[derive(Clone)]
pub struct TokenService {
    header: Header,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    default_ttl: Duration,
    leeway_secs: u64,
}

impl TokenService {
    pub fn new(settings: TokenSettings) -> Self {
        let secret = settings.secret.as_bytes();

        let mut validation = Validation::new(settings.algorithm);
        // Expiry and subject are checked here against an explicit clock.
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        Self {
            header: Header::new(settings.algorithm),
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            default_ttl: settings.default_ttl,
            leeway_secs: settings.leeway_secs.min(MAX_LEEWAY_SECS),
        }
    }

    /// Lifetime applied by [`issue`](Self::issue).
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Issue a token for `subject` with the default lifetime.
    pub fn issue(&self, subject: &str) -> Result<SignedToken, TokenError> {
        self.issue_at(subject, self.default_ttl, Utc::now())
    }

    /// Issue a token for `subject` with an explicit lifetime.
    pub fn issue_with_ttl(&self, subject: &str, ttl: Duration) -> Result<SignedToken, TokenError> {
        self.issue_at(subject, ttl, Utc::now())
    }

    /// Issue a token as if the current time were `now`.
    pub fn issue_at(
        &self,
        subject: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<SignedToken, TokenError> {
        let expires_at = now
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let claims = Claims {
            sub: subject.to_string(),
            exp: expires_at.timestamp(),
            iat: Some(now.timestamp()),
        };

        let token = encode(&self.header, &claims, &self.encoding_key)?;
        Ok(SignedToken(token))
    }

    /// Verify a token and return its subject.
    pub fn verify(&self, token: &str) -> Result<String, TokenRejection> {
        self.verify_at(token, Utc::now())
    }

    /// Verify a token as if the current time were `now`.
    ///
    /// Checks run in order: signature, claim structure, expiry, subject.
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<String, TokenRejection> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            let rejection = classify(e.kind());
            debug!("token rejected ({rejection}): {e}");
            rejection
        })?;

        let claims = data.claims;
        if !claims.is_live_at(now.timestamp(), self.leeway_secs) {
            return Err(TokenRejection::Expired);
        }

        claims
            .subject()
            .map(str::to_owned)
            .ok_or(TokenRejection::MalformedClaims)
    }
}

fn classify(kind: &ErrorKind) -> TokenRejection {
    match kind {
        ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => TokenRejection::BadSignature,
        ErrorKind::ExpiredSignature => TokenRejection::Expired,
        _ => TokenRejection::MalformedClaims,
    }
}
