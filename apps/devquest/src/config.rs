//! # Configuration
//!
//! Settings are layered: defaults, then an optional TOML file (`--config`),
//! then environment variables, then CLI flags (applied by the CLI module).
//!
//! ## Environment Variables
//!
//! - `DEVQUEST_DATABASE`: path of the redb database file
//! - `DEVQUEST_BACKEND`: `redb` or `memory`
//! - `DEVQUEST_CORS_ORIGINS`: comma-separated origins, or `*` for all
//! - `DEVQUEST_RATE_LIMIT`: requests per second (0 disables)
//! - `FIREBASE_API_KEY`: selects the Firebase identity backend
//! - `DEVQUEST_LOCAL_SECRET`: signing secret of the local identity backend
//! - `DEVQUEST_TOKEN_TTL_SECS`: lifetime of local tokens
//! - `DEVQUEST_IDENTITY_TIMEOUT_SECS`: request timeout towards Firebase
//! - `DEVQUEST_STORE_RETRIES`: attempts per store call

use devquest_core::RetryPolicy;
use devquest_core::primitives::{DEFAULT_RETRY_BACKOFF_MS, DEFAULT_STORE_ATTEMPTS};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Secret used by the local identity backend when none is configured.
pub const DEVELOPMENT_SECRET: &str = "devquest-local-development-secret";

/// Errors raised while assembling the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config file {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("Invalid config file: {0}")]
    Parse(String),

    #[error("Invalid value for {key}: '{value}'")]
    InvalidValue { key: &'static str, value: String },
}

// =============================================================================
// STORE BACKEND
// =============================================================================

/// Which document store the server runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Persistent redb database file.
    #[default]
    Redb,
    /// Volatile in-process maps.
    Memory,
}

impl FromStr for Backend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redb" => Ok(Backend::Redb),
            "memory" => Ok(Backend::Memory),
            _ => Err(ConfigError::InvalidValue {
                key: "backend",
                value: s.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::Redb => f.write_str("redb"),
            Backend::Memory => f.write_str("memory"),
        }
    }
}

// =============================================================================
// SETTINGS
// =============================================================================

/// Identity provider settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IdentityConfig {
    /// Firebase Web API key; when set, Firebase issues and verifies tokens.
    pub firebase_api_key: Option<String>,
    /// Signing secret of the local backend.
    pub local_secret: String,
    /// Lifetime of local tokens, in seconds.
    pub token_ttl_secs: u64,
    /// Whole-request timeout towards the remote provider, in seconds.
    pub request_timeout_secs: u64,
}

impl IdentityConfig {
    /// Request timeout towards the remote provider, never zero.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            firebase_api_key: None,
            local_secret: DEVELOPMENT_SECRET.to_string(),
            token_ttl_secs: 3600,
            request_timeout_secs: 10,
        }
    }
}

/// Complete server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub database: PathBuf,
    pub backend: Backend,
    pub host: String,
    pub port: u16,
    /// Allowed CORS origins; `["*"]` allows all.
    pub cors_origins: Vec<String>,
    /// Global requests per second, 0 disables limiting.
    pub rate_limit: u32,
    /// Attempts per store call, first try included.
    pub store_retries: u32,
    pub identity: IdentityConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: PathBuf::from("devquest.redb"),
            backend: Backend::Redb,
            host: "127.0.0.1".to_string(),
            port: 8000,
            cors_origins: default_cors_origins(),
            rate_limit: 100,
            store_retries: DEFAULT_STORE_ATTEMPTS,
            identity: IdentityConfig::default(),
        }
    }
}

/// Origins of the local dev servers and the production game client.
pub fn default_cors_origins() -> Vec<String> {
    [
        "http://localhost:8000",
        "http://localhost:3000",
        "http://127.0.0.1:8000",
        "http://127.0.0.1:3000",
        "https://www.devquestgame.app",
    ]
    .iter()
    .map(|s| (*s).to_string())
    .collect()
}

fn parse_number<T: FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    })
}

impl Config {
    /// Parse a TOML document; missing keys keep their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load the optional file, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let content =
                    std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
                        path: path.to_path_buf(),
                        reason: e.to_string(),
                    })?;
                Self::from_toml_str(&content)?
            }
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup (the process environment in production).
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(database) = var("DEVQUEST_DATABASE") {
            self.database = PathBuf::from(database);
        }
        if let Some(backend) = var("DEVQUEST_BACKEND") {
            self.backend = backend.parse()?;
        }
        if let Some(origins) = var("DEVQUEST_CORS_ORIGINS") {
            self.cors_origins = origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(rate) = var("DEVQUEST_RATE_LIMIT") {
            self.rate_limit = parse_number("DEVQUEST_RATE_LIMIT", &rate)?;
        }
        if let Some(key) = var("FIREBASE_API_KEY") {
            self.identity.firebase_api_key = Some(key);
        }
        if let Some(secret) = var("DEVQUEST_LOCAL_SECRET") {
            self.identity.local_secret = secret;
        }
        if let Some(ttl) = var("DEVQUEST_TOKEN_TTL_SECS") {
            self.identity.token_ttl_secs = parse_number("DEVQUEST_TOKEN_TTL_SECS", &ttl)?;
        }
        if let Some(timeout) = var("DEVQUEST_IDENTITY_TIMEOUT_SECS") {
            self.identity.request_timeout_secs =
                parse_number("DEVQUEST_IDENTITY_TIMEOUT_SECS", &timeout)?;
        }
        if let Some(retries) = var("DEVQUEST_STORE_RETRIES") {
            self.store_retries = parse_number("DEVQUEST_STORE_RETRIES", &retries)?;
        }
        Ok(())
    }

    /// Retry policy for store calls.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.store_retries,
            Duration::from_millis(DEFAULT_RETRY_BACKOFF_MS),
        )
    }

    /// `host:port` to bind.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// =============================================================================
// TESTS
// =============================================================================
