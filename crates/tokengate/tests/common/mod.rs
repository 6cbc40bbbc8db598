//! Test utilities and common setup.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response};
use jsonwebtoken::Algorithm;
use serde_json::Value;
use tempfile::TempDir;
use tokengate::api::proxy::ProxyForwarder;
use tokengate::api::{AppState, create_router};
use tokengate::auth::{PasswordVerifier, TokenService, TokenSettings, hash_password};
use tokengate::user::{FileUserStore, UserRecord, UsersFile};
use tower::ServiceExt;

pub const SECRET: &str = "test-secret-for-integration-tests-minimum-32-chars";
pub const PASSWORD: &str = "wonderland";
pub const COST: u32 = 4;

/// A gateway wired to a throwaway on-disk user store holding `alice`.
pub struct Gateway {
    pub app: Router,
    pub tokens: Arc<TokenService>,
    pub users_path: PathBuf,
    _dir: TempDir,
}

impl Gateway {
    pub async fn send(&self, req: Request<Body>) -> Response<Body> {
        self.app.clone().oneshot(req).await.unwrap()
    }

    pub fn bearer(&self, username: &str) -> String {
        format!("Bearer {}", self.tokens.issue(username).unwrap().as_str())
    }

    pub fn remove_user(&self, username: &str) {
        let mut users = UsersFile::load(&self.users_path).unwrap();
        users.remove(username).unwrap();
        users.save(&self.users_path).unwrap();
    }
}

pub fn token_settings() -> TokenSettings {
    TokenSettings {
        secret: SECRET.to_string(),
        algorithm: Algorithm::HS256,
        default_ttl: chrono::Duration::minutes(30),
        leeway_secs: 0,
    }
}

/// Gateway forwarding to `backend` with generous timeouts.
pub fn gateway(backend: &str) -> Gateway {
    gateway_with_timeouts(backend, Duration::from_secs(5), Duration::from_secs(5))
}

pub fn gateway_with_timeouts(backend: &str, timeout: Duration, idle: Duration) -> Gateway {
    build_gateway(backend, timeout, idle, &["*"])
}

/// Gateway with an explicit cross-origin allow list.
pub fn gateway_with_origins(backend: &str, origins: &[&str]) -> Gateway {
    build_gateway(
        backend,
        Duration::from_secs(5),
        Duration::from_secs(5),
        origins,
    )
}

fn build_gateway(backend: &str, timeout: Duration, idle: Duration, origins: &[&str]) -> Gateway {
    let dir = TempDir::new().unwrap();
    let users_path = dir.path().join("users.json");

    let mut users = UsersFile::default();
    users
        .insert(
            UserRecord::new("alice", hash_password(PASSWORD, COST).unwrap())
                .with_attribute("email", "alice@example.com"),
        )
        .unwrap();
    users.save(&users_path).unwrap();

    let tokens = Arc::new(TokenService::new(token_settings()));
    let forwarder = ProxyForwarder::new(backend.parse().unwrap(), timeout, idle);
    let state = AppState::new(
        Arc::clone(&tokens),
        Arc::new(FileUserStore::new(users_path.clone())),
        PasswordVerifier::new(COST).unwrap(),
        forwarder,
    )
    .with_allowed_origins(origins.iter().map(|o| o.to_string()).collect());

    Gateway {
        app: create_router(state),
        tokens,
        users_path,
        _dir: dir,
    }
}

/// An address nothing is listening on.
pub fn closed_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// Serve `router` on an ephemeral local port.
pub async fn spawn_backend(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}
