//! # API Errors
//!
//! Every failure leaves the API as `{"detail": "..."}` with a status code
//! chosen from the error kind.
//!
//! | Error | Status |
//! |-------|--------|
//! | missing/invalid bearer token | 401 + `WWW-Authenticate: Bearer` |
//! | level or user not found | 404 |
//! | forbidden, locked level | 403 |
//! | invalid payload | 422 (or the extractor's own status) |
//! | write conflict | 409 |
//! | identity: bad credentials / rejected sign-up | 401 / 400 |
//! | identity provider unreachable | 502 |
//! | store failure | 500 (logged) |

use super::types::DetailResponse;
use crate::identity::IdentityError;
use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use devquest_core::DevQuestError;
use thiserror::Error;

/// Failure of an API request.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing, malformed or rejected bearer token.
    #[error("{0}")]
    Unauthorized(String),

    /// The request body or path could not be extracted.
    #[error("{detail}")]
    Payload { status: StatusCode, detail: String },

    #[error(transparent)]
    Core(#[from] DevQuestError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    /// A blocking task panicked or was cancelled.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Payload {
            status: rejection.status(),
            detail: rejection.body_text(),
        }
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::Payload {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            detail: rejection.body_text(),
        }
    }
}

impl ApiError {
    /// Status code and player-facing detail.
    pub fn status_and_detail(&self) -> (StatusCode, String) {
        match self {
            ApiError::Unauthorized(detail) => (StatusCode::UNAUTHORIZED, detail.clone()),
            ApiError::Payload { status, detail } => (*status, detail.clone()),
            ApiError::Core(e) => match e {
                DevQuestError::LevelNotFound(_) => {
                    (StatusCode::NOT_FOUND, "Nivel no encontrado".to_string())
                }
                DevQuestError::UserNotFound(_) => (
                    StatusCode::NOT_FOUND,
                    "Usuario no encontrado en la base de datos".to_string(),
                ),
                DevQuestError::LevelLocked { level, .. } => (
                    StatusCode::FORBIDDEN,
                    format!("El nivel {} todavía está bloqueado", level),
                ),
                DevQuestError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
                DevQuestError::InvalidInput(msg) => {
                    (StatusCode::UNPROCESSABLE_ENTITY, msg.clone())
                }
                DevQuestError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
                DevQuestError::StoreFailure { .. } => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Error interno del servidor".to_string(),
                ),
            },
            ApiError::Identity(e) => match e {
                IdentityError::InvalidToken(_) | IdentityError::InvalidCredentials => {
                    (StatusCode::UNAUTHORIZED, e.to_string())
                }
                IdentityError::Rejected(_) => (StatusCode::BAD_REQUEST, e.to_string()),
                IdentityError::Unavailable(_) => (
                    StatusCode::BAD_GATEWAY,
                    "Servicio de autenticación no disponible".to_string(),
                ),
            },
            ApiError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error interno del servidor".to_string(),
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = self.status_and_detail();

        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "Request failed");
        }

        let mut response = (status, Json(DetailResponse::new(detail))).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use devquest_core::{LevelId, StoreError};

    #[test]
    fn core_errors_map_to_status_codes() {
        let cases = [
            (DevQuestError::LevelNotFound(LevelId(9)), StatusCode::NOT_FOUND),
            (DevQuestError::UserNotFound("u".into()), StatusCode::NOT_FOUND),
            (
                DevQuestError::LevelLocked {
                    uid: "u".into(),
                    level: LevelId(2),
                },
                StatusCode::FORBIDDEN,
            ),
            (DevQuestError::Forbidden("no".into()), StatusCode::FORBIDDEN),
            (
                DevQuestError::InvalidInput("bad".into()),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (DevQuestError::Conflict("race".into()), StatusCode::CONFLICT),
            (
                DevQuestError::StoreFailure {
                    attempts: 3,
                    source: StoreError::Unavailable("down".into()),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (error, expected) in cases {
            assert_eq!(ApiError::from(error).status_and_detail().0, expected);
        }
    }

    #[test]
    fn identity_errors_map_to_status_codes() {
        let (status, detail) = ApiError::from(IdentityError::InvalidCredentials).status_and_detail();
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(detail, "Credenciales inválidas");

        let (status, _) =
            ApiError::from(IdentityError::Rejected("EMAIL_EXISTS".into())).status_and_detail();
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) =
            ApiError::from(IdentityError::Unavailable("timeout".into())).status_and_detail();
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn store_details_are_not_leaked() {
        let error = ApiError::from(DevQuestError::StoreFailure {
            attempts: 1,
            source: StoreError::Io("/var/lib/devquest.redb: disk full".into()),
        });
        let (_, detail) = error.status_and_detail();
        assert!(!detail.contains("disk"));
    }

    #[test]
    fn unauthorized_sets_challenge_header() {
        let response = ApiError::Unauthorized("Token no proporcionado".into()).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(header::WWW_AUTHENTICATE),
            Some(&HeaderValue::from_static("Bearer"))
        );
    }
}
