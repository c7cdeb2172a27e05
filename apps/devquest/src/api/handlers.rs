//! # API Endpoint Handlers
//!
//! Handlers validate the request, run the game operation on the blocking
//! pool (store calls are synchronous) and shape the response.

use super::{
    AppState,
    error::ApiError,
    extract::{ApiJson, ApiPath},
    types::{
        AuthResponse, CommandLevelRequest, CommandLevelResponse, DetailResponse, HealthResponse,
        LevelResponse, LevelStateRequest, LevelStatisticsResponse, LoginRequest,
        PotionLevelRequest, PotionLevelResponse, ProgressCreate, RegisterRequest, RootResponse,
        VerifyTokenResponse,
    },
};
use crate::identity::{Claims, IdentityError};
use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use devquest_core::{
    DevQuestError, GameService, Level, LevelDraft, LevelId, LevelState, ProgressRecord,
};

/// Run a synchronous game operation off the async runtime.
async fn blocking<T, F>(service: &GameService, op: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(GameService) -> Result<T, DevQuestError> + Send + 'static,
{
    let service = service.clone();
    tokio::task::spawn_blocking(move || op(service))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(ApiError::from)
}

// =============================================================================
// GENERAL
// =============================================================================

pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

pub async fn root_handler() -> impl IntoResponse {
    Json(RootResponse::default())
}

// =============================================================================
// AUTH
// =============================================================================

/// Create the identity account, then the user document.
///
/// An email that already has a user document is refused before the identity
/// provider is asked, so a second account can never take over its uid.
pub async fn register_handler(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    request.validate()?;
    let email = request.email.trim().to_ascii_lowercase();
    let taken = blocking(&state.service, move |service| service.email_registered(&email)).await?;
    if taken {
        tracing::warn!(event = "register_refused", reason = "email_exists", "Registration refused");
        return Err(IdentityError::Rejected("EMAIL_EXISTS".to_string()).into());
    }

    let session = state
        .identity
        .create_user(&request.email, &request.password, &request.username)
        .await?;

    let uid = session.uid.clone();
    let email = session.email.trim().to_ascii_lowercase();
    let username = request.username.trim().to_string();
    let user = blocking(&state.service, move |service| {
        service.register_user(&uid, &email, &username, Utc::now())
    })
    .await?;

    tracing::info!(uid = %user.uid, "User registered");
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse::new(session.token, user, Vec::new())),
    ))
}

pub async fn login_handler(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    request.validate()?;
    let session = state
        .identity
        .sign_in(&request.email, &request.password)
        .await?;

    let uid = session.uid.clone();
    let (user, completed) =
        blocking(&state.service, move |service| service.login(&uid, Utc::now())).await?;
    Ok(Json(AuthResponse::new(session.token, user, completed)))
}

pub async fn verify_token_handler(Extension(claims): Extension<Claims>) -> impl IntoResponse {
    Json(VerifyTokenResponse {
        valid: true,
        uid: claims.uid,
        email: claims.email,
    })
}

// =============================================================================
// LEVELS
// =============================================================================

pub async fn list_levels_handler(
    State(state): State<AppState>,
) -> Result<Json<Vec<Level>>, ApiError> {
    let levels = blocking(&state.service, |service| service.list_levels()).await?;
    Ok(Json(levels))
}

pub async fn get_level_handler(
    State(state): State<AppState>,
    ApiPath(level_id): ApiPath<u32>,
) -> Result<Json<LevelResponse>, ApiError> {
    let level = blocking(&state.service, move |service| {
        service.get_level(LevelId(level_id))
    })
    .await?;
    Ok(Json(LevelResponse::from(level)))
}

pub async fn create_level_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(draft): ApiJson<LevelDraft>,
) -> Result<(StatusCode, Json<Level>), ApiError> {
    let level = blocking(&state.service, move |service| {
        service.create_level(&claims.uid, draft)
    })
    .await?;
    tracing::info!(level_id = %level.level_id, name = %level.draft.name, "Level created");
    Ok((StatusCode::CREATED, Json(level)))
}

// =============================================================================
// PROGRESS
// =============================================================================

pub async fn list_progress_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<ProgressRecord>>, ApiError> {
    let progress = blocking(&state.service, move |service| service.progress(&claims.uid)).await?;
    Ok(Json(progress))
}

/// Record a score reported by the client; returns the stored record.
pub async fn create_progress_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(request): ApiJson<ProgressCreate>,
) -> Result<(StatusCode, Json<ProgressRecord>), ApiError> {
    let settlement = blocking(&state.service, move |service| {
        service.record_score(&claims.uid, LevelId(request.level_id), request.score, Utc::now())
    })
    .await?;
    Ok((StatusCode::CREATED, Json(settlement.upsert.record)))
}

// =============================================================================
// GAME
// =============================================================================

pub async fn validate_commands_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(request): ApiJson<CommandLevelRequest>,
) -> Result<Json<CommandLevelResponse>, ApiError> {
    request.validate()?;
    let level_id = LevelId(request.level_id);
    let result = blocking(&state.service, move |service| {
        service.validate_commands(
            &claims.uid,
            level_id,
            &request.list_commands,
            Utc::now(),
        )
    })
    .await?;
    tracing::debug!(
        level_id = %level_id,
        stars = result.grade.stars.value(),
        "Commands graded"
    );
    Ok(Json(CommandLevelResponse::from(result)))
}

pub async fn validate_potions_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(request): ApiJson<PotionLevelRequest>,
) -> Result<Json<PotionLevelResponse>, ApiError> {
    request.validate()?;
    let level_id = LevelId(request.level_id);
    let result = blocking(&state.service, move |service| {
        service.validate_potions(
            &claims.uid,
            level_id,
            &request.potions,
            &request.bloques_utilizados,
            Utc::now(),
        )
    })
    .await?;
    tracing::debug!(
        level_id = %level_id,
        stars = result.grade.stars.value(),
        "Potions graded"
    );
    Ok(Json(PotionLevelResponse::from(result)))
}

pub async fn save_level_state_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(request): ApiJson<LevelStateRequest>,
) -> Result<Json<DetailResponse>, ApiError> {
    blocking(&state.service, move |service| {
        service.save_level_state(
            &claims.uid,
            LevelId(request.level_id),
            request.state,
            Utc::now(),
        )
    })
    .await?;
    Ok(Json(DetailResponse::new(
        "Estado del nivel guardado correctamente",
    )))
}

/// The state last saved for a level, 404 when nothing was saved.
pub async fn get_level_state_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(level_id): ApiPath<u32>,
) -> Result<Json<LevelState>, ApiError> {
    let saved = blocking(&state.service, move |service| {
        service.level_state(&claims.uid, LevelId(level_id))
    })
    .await?;
    saved.map(Json).ok_or_else(|| ApiError::Payload {
        status: StatusCode::NOT_FOUND,
        detail: "No hay estado guardado para este nivel".to_string(),
    })
}

pub async fn exit_game_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<DetailResponse>, ApiError> {
    blocking(&state.service, move |service| {
        service.exit_game(&claims.uid, Utc::now())
    })
    .await?;
    Ok(Json(DetailResponse::new("Salida del juego registrada")))
}

pub async fn level_statistics_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(level_id): ApiPath<u32>,
) -> Result<Json<LevelStatisticsResponse>, ApiError> {
    let report = blocking(&state.service, move |service| {
        service.level_statistics(&claims.uid, LevelId(level_id))
    })
    .await?;
    Ok(Json(LevelStatisticsResponse::from(report)))
}
