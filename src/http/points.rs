use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;

use super::{ApiResult, AppState};
use crate::points::NewPointsQuest;

pub async fn list_quests(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.points.list().await?))
}

pub async fn create_quest(
    State(state): State<AppState>,
    Json(new): Json<NewPointsQuest>,
) -> ApiResult<impl IntoResponse> {
    let quest = state.points.create(new).await?;
    Ok((StatusCode::CREATED, Json(quest)))
}

pub async fn complete_quest(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.points.complete(id).await?.quest))
}

pub async fn uncomplete_quest(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.points.uncomplete(id).await?.quest))
}

pub async fn delete_quest(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    state.points.delete(id).await?;
    Ok(Json(json!({ "message": "Quest deleted successfully" })))
}

pub async fn total_points(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let total = state.points.total_points().await?;
    Ok(Json(json!({ "totalPoints": total })))
}
