use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;

use super::{ApiResult, AppState, ParentSession};
use crate::progression::RoomId;
use crate::quest::NewQuest;

pub async fn get_state(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.game.snapshot().await?))
}

pub async fn get_dashboard(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.game.dashboard().await?))
}

pub async fn list_rooms(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.game.rooms().await)
}

#[derive(Deserialize)]
pub struct CapacityQuery {
    level: Option<u32>,
    count: Option<usize>,
}

/// Capacity for `count` more quests at `level` (defaults: the player's level, one quest)
pub async fn get_capacity(
    State(state): State<AppState>,
    Query(query): Query<CapacityQuery>,
) -> ApiResult<impl IntoResponse> {
    let count = query.count.unwrap_or(1);
    Ok(Json(state.game.capacity(query.level, count).await?))
}

pub async fn create_quest(
    _parent: ParentSession,
    State(state): State<AppState>,
    Json(new_quest): Json<NewQuest>,
) -> ApiResult<impl IntoResponse> {
    let created = state.game.create_quest(new_quest).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn accept_quest(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.game.accept_quest(&id).await?))
}

pub async fn complete_quest(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.game.complete_quest(&id).await?))
}

pub async fn delete_quest(
    _parent: ParentSession,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let quest = state.game.delete_quest(&id).await?;
    Ok(Json(json!({ "deleted": quest.id })))
}

pub async fn object_cooldown(
    State(state): State<AppState>,
    Path(object_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.game.object_cooldown(&object_id).await?))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectQuestRequest {
    room: RoomId,
    object_type: String,
}

pub async fn offer_object_quest(
    State(state): State<AppState>,
    Path(object_id): Path<String>,
    Json(req): Json<ObjectQuestRequest>,
) -> ApiResult<impl IntoResponse> {
    let quest = state
        .game
        .offer_object_quest(&object_id, &req.room, &req.object_type)
        .await?;
    Ok((StatusCode::CREATED, Json(quest)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRewardRequest {
    #[serde(default)]
    name: String,
    #[serde(default)]
    gem_cost: u64,
}

pub async fn create_reward(
    _parent: ParentSession,
    State(state): State<AppState>,
    Json(req): Json<CreateRewardRequest>,
) -> ApiResult<impl IntoResponse> {
    let reward = state.game.create_reward(&req.name, req.gem_cost).await?;
    Ok((StatusCode::CREATED, Json(reward)))
}

pub async fn claim_reward(
    _parent: ParentSession,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.game.claim_reward(&id).await?))
}

pub async fn delete_reward(
    _parent: ParentSession,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let reward = state.game.delete_reward(&id).await?;
    Ok(Json(json!({ "deleted": reward.id })))
}

#[derive(Deserialize)]
pub struct PetRequest {
    #[serde(default)]
    name: String,
}

pub async fn set_pet_name(
    State(state): State<AppState>,
    Json(req): Json<PetRequest>,
) -> ApiResult<impl IntoResponse> {
    let name = state.game.set_pet_name(&req.name).await?;
    Ok(Json(json!({ "petName": name })))
}

#[derive(Deserialize)]
pub struct RoomRequest {
    room: RoomId,
}

pub async fn change_room(
    State(state): State<AppState>,
    Json(req): Json<RoomRequest>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.game.change_room(&req.room).await?))
}
