//! Gateway configuration.
//!
//! Loaded once at startup from built-in defaults, an optional TOML file and
//! `TOKENGATE__SECTION__KEY` environment variables, validated, and then
//! treated as immutable for the life of the process.

use std::path::{Path, PathBuf};
use std::time::Duration;

use axum::http::Uri;
use config::{Config, Environment, File, FileFormat};
use jsonwebtoken::Algorithm;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::api::proxy::{DEFAULT_IDLE_TIMEOUT, DEFAULT_TIMEOUT};
use crate::auth::{MAX_LEEWAY_SECS, TokenSettings, is_hmac};

pub const APP_NAME: &str = "tokengate";

/// Minimum accepted length of the signing secret, in bytes.
pub const MIN_SECRET_LEN: usize = 32;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error(
        "JWT secret is required. Set TOKENGATE__AUTH__JWT_SECRET or auth.jwt_secret in the config file"
    )]
    MissingJwtSecret,

    #[error("JWT secret must be at least 32 bytes long")]
    JwtSecretTooShort,

    #[error("environment variable '{0}' not found (referenced via env:{0} in config)")]
    EnvVarNotFound(String),

    #[error("environment variable '{0}' is empty (referenced via env:{0} in config)")]
    EnvVarEmpty(String),

    #[error("unsupported signing algorithm '{0}', expected HS256, HS384 or HS512")]
    UnsupportedAlgorithm(String),

    #[error("token leeway of {0}s exceeds the 60s maximum")]
    LeewayTooLarge(u64),

    #[error("token lifetime must be positive and representable")]
    InvalidTokenTtl,

    #[error("bcrypt cost {0} is outside 4..=31")]
    InvalidBcryptCost(u32),

    #[error("invalid backend URL '{0}'")]
    InvalidBackendUrl(String),

    #[error("backend URL must use http, got '{0}'")]
    UnsupportedBackendScheme(String),

    #[error("backend timeout must be positive")]
    InvalidBackendTimeout,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub backend: BackendConfig,
    pub users: UsersConfig,
    pub logging: LoggingConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,

    /// Origins allowed to make cross-origin requests. `"*"` reflects any
    /// origin; an empty list disables cross-origin access.
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            allowed_origins: vec!["*".to_string()],
        }
    }
}

/// Token and password configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC secret, or `env:VAR_NAME` to read it from the environment.
    pub jwt_secret: Option<String>,

    /// Signing algorithm (HS256, HS384 or HS512).
    pub algorithm: String,

    /// Default token lifetime.
    pub token_ttl_minutes: i64,

    /// Clock-skew allowance on `exp`.
    pub leeway_secs: u64,

    /// Bcrypt cost for new hashes and for the timing placeholder.
    pub bcrypt_cost: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            // No default secret - must be explicitly configured
            jwt_secret: None,
            algorithm: "HS256".to_string(),
            token_ttl_minutes: 30,
            leeway_secs: 0,
            bcrypt_cost: bcrypt::DEFAULT_COST,
        }
    }
}

impl AuthConfig {
    /// Resolve the JWT secret, expanding `env:VAR_NAME` syntax.
    /// Returns the resolved secret or None if not configured.
    pub fn resolve_jwt_secret(&self) -> Result<Option<String>, ConfigError> {
        match &self.jwt_secret {
            None => Ok(None),
            Some(value) => {
                if let Some(var_name) = value.strip_prefix("env:") {
                    match std::env::var(var_name) {
                        Ok(secret) if !secret.is_empty() => Ok(Some(secret)),
                        Ok(_) => Err(ConfigError::EnvVarEmpty(var_name.to_string())),
                        Err(_) => Err(ConfigError::EnvVarNotFound(var_name.to_string())),
                    }
                } else {
                    Ok(Some(value.clone()))
                }
            }
        }
    }

    pub fn algorithm(&self) -> Result<Algorithm, ConfigError> {
        let unsupported = || ConfigError::UnsupportedAlgorithm(self.algorithm.clone());
        let algorithm: Algorithm = self
            .algorithm
            .trim()
            .to_ascii_uppercase()
            .parse()
            .map_err(|_| unsupported())?;
        if !is_hmac(algorithm) {
            return Err(unsupported());
        }
        Ok(algorithm)
    }

    /// Validate and build the immutable token settings.
    pub fn token_settings(&self) -> Result<TokenSettings, ConfigError> {
        let secret = self
            .resolve_jwt_secret()?
            .ok_or(ConfigError::MissingJwtSecret)?;
        if secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::JwtSecretTooShort);
        }
        if self.token_ttl_minutes <= 0 {
            return Err(ConfigError::InvalidTokenTtl);
        }
        let default_ttl =
            chrono::TimeDelta::try_minutes(self.token_ttl_minutes).ok_or(ConfigError::InvalidTokenTtl)?;
        if self.leeway_secs > MAX_LEEWAY_SECS {
            return Err(ConfigError::LeewayTooLarge(self.leeway_secs));
        }

        Ok(TokenSettings {
            secret,
            algorithm: self.algorithm()?,
            default_ttl,
            leeway_secs: self.leeway_secs,
        })
    }

    pub fn validate_bcrypt_cost(&self) -> Result<u32, ConfigError> {
        if (4..=31).contains(&self.bcrypt_cost) {
            Ok(self.bcrypt_cost)
        } else {
            Err(ConfigError::InvalidBcryptCost(self.bcrypt_cost))
        }
    }

    /// Generate a random 64-character secret suitable for `jwt_secret`.
    pub fn generate_jwt_secret() -> String {
        use rand::Rng;

        const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
        const SECRET_LENGTH: usize = 64;

        let mut rng = rand::rng();
        (0..SECRET_LENGTH)
            .map(|_| {
                let idx = rng.random_range(0..CHARSET.len());
                CHARSET[idx] as char
            })
            .collect()
    }
}

/// Upstream service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL requests are forwarded to. May carry a path prefix.
    pub url: String,

    /// Upper bound on waiting for the backend's response head.
    pub timeout_secs: u64,

    /// Upper bound on silence between response body frames.
    pub idle_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:9000".to_string(),
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT.as_secs(),
        }
    }
}

impl BackendConfig {
    pub fn base_uri(&self) -> Result<Uri, ConfigError> {
        let uri: Uri = self
            .url
            .parse()
            .map_err(|_| ConfigError::InvalidBackendUrl(self.url.clone()))?;

        match uri.scheme_str() {
            Some("http") => {}
            Some(other) => return Err(ConfigError::UnsupportedBackendScheme(other.to_string())),
            None => return Err(ConfigError::InvalidBackendUrl(self.url.clone())),
        }
        if uri.authority().is_none() {
            return Err(ConfigError::InvalidBackendUrl(self.url.clone()));
        }
        Ok(uri)
    }

    pub fn timeout(&self) -> Result<Duration, ConfigError> {
        if self.timeout_secs == 0 {
            return Err(ConfigError::InvalidBackendTimeout);
        }
        Ok(Duration::from_secs(self.timeout_secs))
    }

    pub fn idle_timeout(&self) -> Result<Duration, ConfigError> {
        if self.idle_timeout_secs == 0 {
            return Err(ConfigError::InvalidBackendTimeout);
        }
        Ok(Duration::from_secs(self.idle_timeout_secs))
    }
}

/// User store location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UsersConfig {
    pub path: PathBuf,
}

impl Default for UsersConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("users.json"),
        }
    }
}

/// Log output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load defaults, then `path` (if it exists), then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(false));
        }
        let built = builder
            .add_source(
                Environment::with_prefix(&env_prefix())
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("server.allowed_origins"),
            )
            .build()?;

        Ok(built.try_deserialize()?)
    }

    /// Check every section that the server depends on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.auth.token_settings()?;
        self.auth.validate_bcrypt_cost()?;
        self.backend.base_uri()?;
        self.backend.timeout()?;
        self.backend.idle_timeout()?;
        Ok(())
    }

    /// Copy safe to print: a literal secret is masked, `env:` references are kept.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if let Some(secret) = &copy.auth.jwt_secret {
            if !secret.starts_with("env:") {
                copy.auth.jwt_secret = Some("<redacted>".to_string());
            }
        }
        copy
    }
}

pub fn env_prefix() -> String {
    APP_NAME.to_ascii_uppercase()
}

/// `$XDG_CONFIG_HOME/tokengate/config.toml` or the platform equivalent.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_NAME).join("config.toml"))
}
