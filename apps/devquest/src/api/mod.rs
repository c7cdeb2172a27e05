//! # DevQuest HTTP API Module
//!
//! The HTTP REST API server, built on axum.
//!
//! ## Endpoints
//!
//! Public:
//! - `GET /health` - Health check
//! - `GET /api` - Welcome message
//! - `POST /api/auth/register` - Create an account (201)
//! - `POST /api/auth/login` - Sign in
//! - `GET /api/levels/` - All levels, in play order
//!
//! Bearer token required:
//! - `POST /api/auth/verify-token` - Resolve the caller's token
//! - `GET /api/levels/{level_id}` - One level with its command palette
//! - `POST /api/levels/` - Create a level (admins only, 201)
//! - `GET /api/progress/` - The caller's progress records
//! - `POST /api/progress/` - Record a manual score (201)
//! - `POST /api/game/validate-commands` - Grade a command solution
//! - `POST /api/game/validate-potion-level` - Grade a potion solution
//! - `POST /api/game/save-level-state` - Save in-level state
//! - `GET /api/game/level-state/{level_id}` - Load the saved in-level state
//! - `POST /api/game/exit` - Record leaving the game
//! - `GET /api/game/level-statistics/{level_id}` - Aggregated level results

mod auth;
mod error;
mod extract;
mod handlers;
mod middleware;
mod types;

pub use auth::bearer_token;
pub use error::ApiError;
pub use middleware::{GlobalRateLimiter, create_rate_limiter};
pub use types::{
    AuthResponse, CommandLevelRequest, CommandLevelResponse, DetailResponse, HealthResponse,
    LevelResponse, LevelStateRequest, LevelStatisticsResponse, LoginRequest, PotionLevelRequest,
    PotionLevelResponse, ProgressCreate, RegisterRequest, RootResponse, VerifyTokenResponse,
};

use crate::config::Config;
use crate::identity::IdentityProvider;
use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware as axum_middleware,
    routing::{get, post},
};
use devquest_core::GameService;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Largest accepted request body.
const BODY_LIMIT_BYTES: usize = 2 * 1024 * 1024;

// =============================================================================
// SERVER STATE
// =============================================================================

/// Shared server state: the game service, the identity provider and the
/// settings the router is built from.
#[derive(Clone)]
pub struct AppState {
    pub service: GameService,
    pub identity: Arc<IdentityProvider>,
    pub config: Arc<Config>,
}

impl AppState {
    #[must_use]
    pub fn new(service: GameService, identity: IdentityProvider, config: Config) -> Self {
        Self {
            service,
            identity: Arc::new(identity),
            config: Arc::new(config),
        }
    }
}

// =============================================================================
// CORS CONFIGURATION
// =============================================================================

/// Build the CORS layer for the configured origins.
///
/// `["*"]` allows every origin; invalid entries are skipped with a warning.
/// An empty result falls back to the default origins.
pub fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        tracing::warn!("CORS: Allowing ALL origins. This is insecure for production!");
        return CorsLayer::permissive();
    }

    let parse = |origins: &[String]| -> Vec<HeaderValue> {
        origins
            .iter()
            .filter_map(|origin| match origin.trim().parse::<HeaderValue>() {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::warn!("CORS: Invalid origin '{}': {}", origin, e);
                    None
                }
            })
            .collect()
    };

    let mut allowed = parse(origins);
    if allowed.is_empty() {
        tracing::warn!("CORS: No valid origins configured, using defaults");
        allowed = parse(&crate::config::default_cors_origins());
    }
    tracing::info!(origins = allowed.len(), "CORS configured");

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}

// =============================================================================
// ROUTER CREATION
// =============================================================================

/// Create the axum router with all endpoints and middleware.
///
/// Middleware stack (outer to inner):
/// 1. Tracing - logs all requests
/// 2. CORS - handles preflight requests
/// 3. Body limit
/// 4. Rate limiting (if enabled)
/// 5. Bearer authentication (protected routes only)
pub fn create_router(state: AppState) -> Router {
    let config = Arc::clone(&state.config);
    let cors = build_cors_layer(&config.cors_origins);

    let public = Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/api", get(handlers::root_handler))
        .route("/api/", get(handlers::root_handler))
        .route("/api/auth/register", post(handlers::register_handler))
        .route("/api/auth/login", post(handlers::login_handler))
        .route("/api/levels", get(handlers::list_levels_handler))
        .route("/api/levels/", get(handlers::list_levels_handler));

    let protected = Router::new()
        .route("/api/auth/verify-token", post(handlers::verify_token_handler))
        .route("/api/levels", post(handlers::create_level_handler))
        .route("/api/levels/", post(handlers::create_level_handler))
        .route("/api/levels/{level_id}", get(handlers::get_level_handler))
        .route(
            "/api/progress",
            get(handlers::list_progress_handler).post(handlers::create_progress_handler),
        )
        .route(
            "/api/progress/",
            get(handlers::list_progress_handler).post(handlers::create_progress_handler),
        )
        .route(
            "/api/game/validate-commands",
            post(handlers::validate_commands_handler),
        )
        .route(
            "/api/game/validate-potion-level",
            post(handlers::validate_potions_handler),
        )
        .route(
            "/api/game/save-level-state",
            post(handlers::save_level_state_handler),
        )
        .route(
            "/api/game/level-state/{level_id}",
            get(handlers::get_level_state_handler),
        )
        .route("/api/game/exit", post(handlers::exit_game_handler))
        .route(
            "/api/game/level-statistics/{level_id}",
            get(handlers::level_statistics_handler),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer,
        ));

    let mut router = public.merge(protected);

    if config.rate_limit > 0 {
        tracing::info!("Rate limiting enabled: {} requests/second", config.rate_limit);
        router = router.layer(axum_middleware::from_fn_with_state(
            create_rate_limiter(config.rate_limit),
            middleware::rate_limit_middleware,
        ));
    } else {
        tracing::info!("Rate limiting disabled");
    }

    router
        .layer(axum::extract::DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

/// Bind `addr` and serve the API until the process stops.
pub async fn run_server(addr: &str, state: AppState) -> std::io::Result<()> {
    tracing::info!(
        identity = state.identity.name(),
        backend = %state.config.backend,
        "Starting DevQuest API"
    );
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("DevQuest HTTP server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Cannot listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

// =============================================================================
// TESTS
// =============================================================================
