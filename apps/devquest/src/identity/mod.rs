//! # Identity Providers
//!
//! The external service that issues and verifies player credentials.
//!
//! ## Backends
//!
//! - [`FirebaseIdentity`]: Firebase Identity Toolkit REST API (production)
//! - [`LocalIdentity`]: in-process accounts with BLAKE3-signed tokens
//!   (development and tests)
//!
//! The backend is picked from the configuration: a Firebase API key selects
//! Firebase, anything else falls back to the local provider.

mod firebase;
mod local;

pub use firebase::{FIREBASE_BASE_URL, FirebaseIdentity};
pub use local::LocalIdentity;

use crate::config::IdentityConfig;
use thiserror::Error;

/// Verified identity of a request's bearer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claims {
    pub uid: String,
    pub email: String,
}

/// A signed-in account and its bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSession {
    pub uid: String,
    pub email: String,
    pub token: String,
}

/// Identity provider failures.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// The bearer token is malformed, forged or expired.
    #[error("Token inválido: {0}")]
    InvalidToken(String),

    /// Sign-in with wrong email or password.
    #[error("Credenciales inválidas")]
    InvalidCredentials,

    /// The provider refused to create the account.
    #[error("Error al crear usuario: {0}")]
    Rejected(String),

    /// The provider could not be reached or failed internally.
    #[error("Identity provider unavailable: {0}")]
    Unavailable(String),
}

/// The configured identity backend.
#[derive(Debug)]
pub enum IdentityProvider {
    Firebase(FirebaseIdentity),
    Local(LocalIdentity),
}

impl IdentityProvider {
    /// Select the backend for a configuration.
    pub fn from_config(config: &IdentityConfig) -> Result<Self, IdentityError> {
        Ok(match &config.firebase_api_key {
            Some(key) => IdentityProvider::Firebase(FirebaseIdentity::new(
                key.clone(),
                FIREBASE_BASE_URL.to_string(),
                config.request_timeout(),
            )?),
            None => IdentityProvider::Local(LocalIdentity::new(
                &config.local_secret,
                config.token_ttl_secs,
            )),
        })
    }

    /// Backend name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            IdentityProvider::Firebase(_) => "firebase",
            IdentityProvider::Local(_) => "local",
        }
    }

    /// Verify a bearer token.
    pub async fn verify_token(&self, token: &str) -> Result<Claims, IdentityError> {
        match self {
            IdentityProvider::Firebase(firebase) => firebase.lookup(token).await,
            IdentityProvider::Local(local) => local.verify_token(token, chrono::Utc::now()),
        }
    }

    /// Create an account and sign it in.
    pub async fn create_user(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<AuthSession, IdentityError> {
        match self {
            IdentityProvider::Firebase(firebase) => {
                firebase.sign_up(email, password, display_name).await
            }
            IdentityProvider::Local(local) => {
                local.create_user(email, password, chrono::Utc::now())
            }
        }
    }

    /// Exchange credentials for a token.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, IdentityError> {
        match self {
            IdentityProvider::Firebase(firebase) => firebase.sign_in(email, password).await,
            IdentityProvider::Local(local) => local.sign_in(email, password, chrono::Utc::now()),
        }
    }
}
