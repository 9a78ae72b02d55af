use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use super::{ApiError, ApiResult, AppState};

#[derive(Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    password: String,
}

pub async fn login(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    let ip = addr.ip().to_string();
    if !state.login_limiter.check(&ip) {
        warn!("Rate limited parent login from {}", ip);
        return Err(ApiError::RateLimited);
    }

    match state.parent_auth.login(&req.password) {
        Some(token) => {
            info!("Parent session opened from {}", ip);
            Ok(Json(json!({
                "token": token,
                "expiresIn": state.parent_auth.session_secs(),
            })))
        }
        None => {
            state.login_limiter.record_failure(&ip);
            warn!("Failed parent login from {}", ip);
            Err(ApiError::Unauthorized)
        }
    }
}
