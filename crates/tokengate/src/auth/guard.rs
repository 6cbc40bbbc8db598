//! Authentication middleware.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{HeaderMap, Request, header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use log::{debug, warn};

use super::{AuthError, TokenService};
use crate::user::{UserRecord, UserStore};

/// Extract a Bearer token from an Authorization header value.
fn bearer_token_from_header(header_value: &str) -> Result<&str, AuthError> {
    let mut parts = header_value.split_whitespace();
    let scheme = parts.next().ok_or(AuthError::InvalidAuthHeader)?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::InvalidAuthHeader);
    }

    let token = parts.next().ok_or(AuthError::InvalidAuthHeader)?;
    if token.is_empty() {
        return Err(AuthError::InvalidAuthHeader);
    }

    if parts.next().is_some() {
        return Err(AuthError::InvalidAuthHeader);
    }

    Ok(token)
}

/// The user an authenticated request acts as.
///
/// Lives in request extensions for the duration of one request.
#[derive(Debug, Clone)]
pub struct Principal {
    user: UserRecord,
}

impl Principal {
    pub fn username(&self) -> &str {
        &self.user.username
    }

    pub fn user(&self) -> &UserRecord {
        &self.user
    }
}

impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .ok_or(AuthError::MissingAuthHeader)
    }
}

/// Resolves bearer credentials to a [`Principal`].
#[derive(Clone)]
pub struct AuthGuard {
    tokens: Arc<TokenService>,
    users: Arc<dyn UserStore>,
}

impl AuthGuard {
    pub fn new(tokens: Arc<TokenService>, users: Arc<dyn UserStore>) -> Self {
        Self { tokens, users }
    }

    /// Authenticate a request from its headers.
    ///
    /// The token service is not consulted unless a well-formed bearer
    /// credential is present.
    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<Principal, AuthError> {
        let header = headers
            .get(AUTHORIZATION)
            .ok_or(AuthError::MissingAuthHeader)?
            .to_str()
            .map_err(|_| AuthError::InvalidAuthHeader)?;
        let token = bearer_token_from_header(header)?;

        let subject = self.tokens.verify(token).map_err(|reason| {
            warn!("bearer token rejected: {reason}");
            AuthError::InvalidToken(reason)
        })?;

        let user = self.users.lookup(&subject).await?.ok_or_else(|| {
            warn!("token subject {subject} has no user record");
            AuthError::UserNotFound
        })?;

        Ok(Principal { user })
    }
}

/// Authentication middleware.
///
/// Validates the bearer token and injects the [`Principal`] into request
/// extensions.
pub async fn auth_middleware(
    State(guard): State<AuthGuard>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    let principal = guard.authenticate(req.headers()).await?;
    debug!(
        "authenticated {} for {} {}",
        principal.username(),
        req.method(),
        req.uri().path()
    );

    req.extensions_mut().insert(principal);
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{TokenRejection, TokenSettings};
    use crate::user::{MemoryUserStore, StoreError};
    use async_trait::async_trait;
    use axum::http::HeaderValue;
    use chrono::Duration;
    use jsonwebtoken::Algorithm;

    fn tokens() -> Arc<TokenService> {
        Arc::new(TokenService::new(TokenSettings {
            secret: "test-secret-for-unit-tests-minimum-32-chars-long".to_string(),
            algorithm: Algorithm::HS256,
            default_ttl: Duration::minutes(30),
            leeway_secs: 0,
        }))
    }

    fn guard() -> AuthGuard {
        let users = MemoryUserStore::new([
            UserRecord::new("alice", "$2b$04$unused").with_attribute("email", "alice@x.io")
        ]);
        AuthGuard::new(tokens(), Arc::new(users))
    }

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    struct FailingStore;

    #[async_trait]
    impl UserStore for FailingStore {
        async fn lookup(&self, _username: &str) -> Result<Option<UserRecord>, StoreError> {
            Err(StoreError::Corrupt("truncated".into()))
        }
    }

    #[test]
    fn test_bearer_token_from_header_valid() {
        assert_eq!(
            bearer_token_from_header("Bearer abc.def.ghi").unwrap(),
            "abc.def.ghi"
        );
        assert_eq!(
            bearer_token_from_header("bearer   token123").unwrap(),
            "token123"
        );
        assert_eq!(
            bearer_token_from_header("   Bearer\tmixed-case ").unwrap(),
            "mixed-case"
        );
    }

    #[test]
    fn test_bearer_token_from_header_invalid() {
        let cases = [
            "",
            "Bearer",
            "Bearer ",
            "Token something",
            "Basic dXNlcjpwYXNz",
            "Bearer token extra",
            "bear token",
        ];

        for case in cases {
            assert!(
                bearer_token_from_header(case).is_err(),
                "{case} should fail"
            );
        }
    }

    #[tokio::test]
    async fn test_authenticate_resolves_principal() {
        let token = tokens().issue("alice").unwrap();
        let principal = guard()
            .authenticate(&headers_with(&format!("Bearer {}", token.as_str())))
            .await
            .unwrap();
        assert_eq!(principal.username(), "alice");
        assert_eq!(principal.user().attributes["email"], "alice@x.io");
    }

    #[tokio::test]
    async fn test_missing_header() {
        let err = guard().authenticate(&HeaderMap::new()).await.unwrap_err();
        assert!(matches!(err, AuthError::MissingAuthHeader));
    }

    #[tokio::test]
    async fn test_malformed_header() {
        let err = guard()
            .authenticate(&headers_with("Basic abc"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidAuthHeader));
    }

    #[tokio::test]
    async fn test_expired_token() {
        let token = tokens().issue_with_ttl("alice", Duration::zero()).unwrap();
        let err = guard()
            .authenticate(&headers_with(&format!("Bearer {}", token.as_str())))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AuthError::InvalidToken(TokenRejection::Expired)
        ));
    }

    #[tokio::test]
    async fn test_unknown_subject() {
        let token = tokens().issue("bob").unwrap();
        let err = guard()
            .authenticate(&headers_with(&format!("Bearer {}", token.as_str())))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::UserNotFound));
    }

    #[tokio::test]
    async fn test_store_failure_is_internal() {
        let guard = AuthGuard::new(tokens(), Arc::new(FailingStore));
        let token = tokens().issue("alice").unwrap();
        let err = guard
            .authenticate(&headers_with(&format!("Bearer {}", token.as_str())))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Internal(_)));
    }
}
