//! # Authentication Module
//!
//! Bearer-token authentication for the player routes.
//!
//! ```text
//! Authorization: Bearer <id-token>
//! ```
//!
//! The token is verified by the configured identity provider; on success
//! the resulting [`Claims`] are stored in the request extensions for the
//! handlers to extract.

use super::{AppState, error::ApiError};
use crate::identity::{Claims, IdentityError};
use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request, header},
    middleware::Next,
    response::Response,
};

const MISSING_TOKEN: &str = "Token no proporcionado o formato incorrecto";

/// Token of an `Authorization: Bearer <token>` header, if well-formed.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Verify the bearer token and attach its claims to the request.
pub async fn require_bearer(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(token) = bearer_token(request.headers()) else {
        tracing::warn!(
            event = "auth_failure",
            reason = "missing_bearer",
            path = %request.uri().path(),
            "Missing or malformed Authorization header"
        );
        return Err(ApiError::Unauthorized(MISSING_TOKEN.to_string()));
    };

    match state.identity.verify_token(token).await {
        Ok(claims) => {
            request.extensions_mut().insert::<Claims>(claims);
            Ok(next.run(request).await)
        }
        Err(IdentityError::Unavailable(reason)) => {
            Err(ApiError::Identity(IdentityError::Unavailable(reason)))
        }
        Err(e) => {
            tracing::warn!(
                event = "auth_failure",
                reason = "invalid_token",
                error = %e,
                "Bearer token rejected"
            );
            Err(ApiError::Unauthorized(e.to_string()))
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
