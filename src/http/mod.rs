//! HTTP and WebSocket surface.

use std::sync::Arc;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tracing::{error, warn};

use crate::auth::{ParentAuth, RateLimiter};
use crate::error::HabitError;
use crate::game::GameService;
use crate::points::PointsBoard;

mod game;
mod parent;
mod points;
mod ws;

/// Login attempts allowed per IP per window
const LOGIN_MAX_ATTEMPTS: u32 = 10;
const LOGIN_WINDOW_SECS: u64 = 60;

// ============================================================================
// App State
// ============================================================================

#[derive(Clone)]
pub struct AppState {
    pub game: Arc<GameService>,
    pub points: Arc<PointsBoard>,
    pub parent_auth: ParentAuth,
    pub login_limiter: RateLimiter,
}

impl AppState {
    pub fn new(game: Arc<GameService>, points: Arc<PointsBoard>, parent_auth: ParentAuth) -> Self {
        Self {
            game,
            points,
            parent_auth,
            login_limiter: RateLimiter::new(LOGIN_MAX_ATTEMPTS, LOGIN_WINDOW_SECS),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Parent session
        .route("/api/parent/login", post(parent::login))
        // Game
        .route("/api/game/state", get(game::get_state))
        .route("/api/game/dashboard", get(game::get_dashboard))
        .route("/api/game/capacity", get(game::get_capacity))
        .route("/api/game/rooms", get(game::list_rooms))
        .route("/api/game/quests", post(game::create_quest))
        .route("/api/game/quests/:id", delete(game::delete_quest))
        .route("/api/game/quests/:id/accept", post(game::accept_quest))
        .route("/api/game/quests/:id/complete", post(game::complete_quest))
        .route("/api/game/objects/:object_id/quest", post(game::offer_object_quest))
        .route("/api/game/objects/:object_id/cooldown", get(game::object_cooldown))
        .route("/api/game/rewards", post(game::create_reward))
        .route("/api/game/rewards/:id", delete(game::delete_reward))
        .route("/api/game/rewards/:id/claim", post(game::claim_reward))
        .route("/api/game/pet", put(game::set_pet_name))
        .route("/api/game/room", put(game::change_room))
        // Points board
        .route("/api/quests", get(points::list_quests).post(points::create_quest))
        .route("/api/quests/:id", delete(points::delete_quest))
        .route("/api/quests/:id/complete", put(points::complete_quest))
        .route("/api/quests/:id/uncomplete", put(points::uncomplete_quest))
        .route("/api/settings/total_points", get(points::total_points))
        // WebSocket
        .route("/ws", get(ws::ws_handler))
        .layer(
            CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods([
                    axum::http::Method::GET,
                    axum::http::Method::POST,
                    axum::http::Method::PUT,
                    axum::http::Method::DELETE,
                    axum::http::Method::OPTIONS,
                ])
                .allow_headers([
                    axum::http::header::CONTENT_TYPE,
                    axum::http::header::AUTHORIZATION,
                ]),
        )
        .with_state(state)
}

async fn health_check() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    Game(HabitError),
    Unauthorized,
    RateLimited,
}

impl From<HabitError> for ApiError {
    fn from(e: HabitError) -> Self {
        ApiError::Game(e)
    }
}

fn status_for(e: &HabitError) -> StatusCode {
    match e {
        HabitError::Validation(_) => StatusCode::BAD_REQUEST,
        HabitError::NotFound { .. } => StatusCode::NOT_FOUND,
        HabitError::NotAccepted
        | HabitError::AlreadyAccepted
        | HabitError::AlreadyCompleted
        | HabitError::DailyQuestProtected
        | HabitError::Locked
        | HabitError::AlreadyClaimed
        | HabitError::CoolingDown { .. }
        | HabitError::ObjectBusy => StatusCode::CONFLICT,
        HabitError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, code) = match &self {
            ApiError::Game(e) => {
                let status = status_for(e);
                if status.is_server_error() {
                    error!("Request failed: {}", e);
                } else {
                    warn!("Request rejected: {}", e);
                }
                (status, e.to_string(), e.code())
            }
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "Parent login required".to_string(),
                "unauthorized",
            ),
            ApiError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "Too many login attempts. Please try again later.".to_string(),
                "rate_limited",
            ),
        };

        (status, Json(json!({ "error": message, "code": code }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

// ============================================================================
// Parent Session Extractor
// ============================================================================

/// Present on a handler's arguments when the route needs a parent token
pub struct ParentSession;

#[async_trait]
impl FromRequestParts<AppState> for ParentSession {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or(ApiError::Unauthorized)?;

        if state.parent_auth.authorize(token) {
            Ok(ParentSession)
        } else {
            warn!("Rejected parent request with invalid token");
            Err(ApiError::Unauthorized)
        }
    }
}
