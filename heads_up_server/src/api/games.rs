use super::{ApiError, AppState};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use heads_up_core::{
    ActionRequest, Card, CreateGameRequest, EvaluateRequest, GameError, GameId, GameSnapshot, GameState,
    HandEvalResult, PlayerId, ReconnectRequest, TableRules, TokenRequest, create_game_with_rules, evaluate,
    execute_player_action,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::reconnect::{PersistReceipt, ReconnectionToken};

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SeatInfo {
    pub id: PlayerId,
    pub name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CreateGameResponse {
    pub game_id: GameId,
    pub players: Vec<SeatInfo>,
    pub state: GameSnapshot,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ViewerQuery {
    pub player_id: Option<PlayerId>,
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({ "status": "ok", "games": state.games.len() }))
}

pub async fn create_game(
    State(state): State<AppState>,
    Json(request): Json<CreateGameRequest>,
) -> Result<(StatusCode, Json<CreateGameResponse>), ApiError> {
    let names = request.player_names.each_ref().map(|name| name.trim());
    if names.iter().any(|name| name.is_empty()) {
        return Err(GameError::InvalidAction("玩家名字不能为空".to_string()).into());
    }

    let rules = request.starting_stack.map_or_else(TableRules::default, TableRules::with_starting_stack);
    let game_id = Uuid::new_v4();
    let game = state.games.insert(create_game_with_rules(game_id, names, rules)?)?;
    state.spawn_persist(game_id);
    info!(%game_id, "创建了新游戏");

    let players = game.players.iter().map(|p| SeatInfo { id: p.id, name: p.name.clone() }).collect();
    Ok((StatusCode::CREATED, Json(CreateGameResponse { game_id, players, state: game.public_snapshot() })))
}

pub async fn get_game(
    State(state): State<AppState>,
    Path(game_id): Path<GameId>,
    Query(viewer): Query<ViewerQuery>,
) -> Result<Json<GameSnapshot>, ApiError> {
    let game = state.games.get(game_id).ok_or(GameError::GameNotFound(game_id))?;
    Ok(Json(view_for(&game, viewer.player_id)))
}

pub async fn deal(State(state): State<AppState>, Path(game_id): Path<GameId>) -> Result<Json<GameSnapshot>, ApiError> {
    Ok(Json(state.deal(game_id)?.public_snapshot()))
}

pub async fn next_hand(
    State(state): State<AppState>,
    Path(game_id): Path<GameId>,
) -> Result<Json<GameSnapshot>, ApiError> {
    Ok(Json(state.next_hand(game_id)?.public_snapshot()))
}

/// 玩家动作：请求在这里校验成 `PlayerAction`，返回该玩家视角的快照
pub async fn act(
    State(state): State<AppState>,
    Path(game_id): Path<GameId>,
    Json(request): Json<ActionRequest>,
) -> Result<Json<GameSnapshot>, ApiError> {
    let action = request.into_action()?;
    let game = state.apply(game_id, |game| execute_player_action(game, request.player_id, action))?;
    Ok(Json(game.snapshot_for(request.player_id)))
}

pub async fn issue_token(
    State(state): State<AppState>,
    Path(game_id): Path<GameId>,
    Json(request): Json<TokenRequest>,
) -> Result<Json<ReconnectionToken>, ApiError> {
    Ok(Json(state.reconnect.issue_token(game_id, request.player_id).await?))
}

pub async fn persist(
    State(state): State<AppState>,
    Path(game_id): Path<GameId>,
) -> Result<Json<PersistReceipt>, ApiError> {
    let game = state.games.get(game_id).ok_or(GameError::GameNotFound(game_id))?;
    Ok(Json(state.reconnect.persist_game(game_id, &game).await?))
}

/// 删除游戏：先从内存移除并断开订阅者，再删除持久化的快照和令牌
pub async fn delete_game(State(state): State<AppState>, Path(game_id): Path<GameId>) -> Result<StatusCode, ApiError> {
    let removed = state.games.remove(game_id).is_some();
    let closed = state.broadcaster.close_game(game_id);
    state.reconnect.cleanup_game(game_id).await?;
    if !removed {
        return Err(GameError::GameNotFound(game_id).into());
    }
    info!(%game_id, closed, "游戏已删除");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn reconnect(
    State(state): State<AppState>,
    Json(request): Json<ReconnectRequest>,
) -> Result<Json<GameSnapshot>, ApiError> {
    let game = state
        .reconnect
        .handle_reconnection(request.game_id, request.player_id, &request.reconnect_token)
        .await?;
    Ok(Json(game.snapshot_for(request.player_id)))
}

pub async fn evaluate_hand(Json(request): Json<EvaluateRequest>) -> Result<Json<HandEvalResult>, ApiError> {
    let cards = request.cards.iter().map(|token| token.parse::<Card>()).collect::<Result<Vec<_>, _>>()?;
    Ok(Json(evaluate(&cards)?))
}

fn view_for(game: &GameState, viewer: Option<PlayerId>) -> GameSnapshot {
    match viewer {
        Some(player_id) => game.snapshot_for(player_id),
        None => game.public_snapshot(),
    }
}
