//! HTTP/WebSocket 接口
//!
//! 这里只是核心逻辑外面的一层薄胶水：读取请求，调用状态机，
//! 把结果写回游戏存储并交给广播器。
//!
//! # 路由
//!
//! - `POST /games` 创建游戏
//! - `GET /games/{id}` 读取快照，带 `?playerId=` 时包含该玩家的底牌
//! - `POST /games/{id}/deal` 发第一手牌
//! - `POST /games/{id}/next-hand` 开始下一手
//! - `POST /games/{id}/actions` 玩家动作
//! - `POST /games/{id}/tokens` 签发重连令牌
//! - `POST /games/{id}/persist` 立即持久化
//! - `DELETE /games/{id}` 删除游戏及其快照
//! - `GET /games/{id}/ws` 订阅事件流
//! - `POST /reconnect` 断线重连
//! - `POST /evaluate` 牌型评估
//! - `GET /health` 健康检查

pub mod games;
pub mod ws;

use crate::broadcaster::{Broadcaster, Subscription};
use crate::config::ServerConfig;
use crate::reconnect::{
    FileSnapshotStore, MemorySnapshotStore, PersistenceError, ReconnectError, ReconnectionService, SnapshotStore,
};
use axum::{
    Json, Router,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use heads_up_core::{
    ConnectionId, DeckError, ErrorBody, ErrorKind, EvalError, GameError, GameId, GameState, GameStore, ServerEvent,
    deal_new_hand, start_new_hand,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// 所有处理函数和 WebSocket 连接共享的状态，克隆开销很小
#[derive(Clone)]
pub struct AppState {
    pub games: Arc<GameStore>,
    pub broadcaster: Arc<Broadcaster>,
    pub reconnect: Arc<ReconnectionService>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(config: ServerConfig, snapshots: Arc<dyn SnapshotStore>) -> Self {
        let games = Arc::new(GameStore::new());
        AppState {
            reconnect: Arc::new(ReconnectionService::new(snapshots, games.clone(), config.token_ttl)),
            broadcaster: Arc::new(Broadcaster::new(config.subscriber_buffer)),
            games,
            config: Arc::new(config),
        }
    }

    /// 根据配置选择快照后端：设置了 `SNAPSHOT_DIR` 时写文件，否则放在内存里
    pub fn from_config(config: ServerConfig) -> Self {
        let snapshots: Arc<dyn SnapshotStore> = match &config.snapshot_dir {
            Some(dir) => Arc::new(FileSnapshotStore::new(dir)),
            None => Arc::new(MemorySnapshotStore::new()),
        };
        Self::new(config, snapshots)
    }

    /// 执行一次状态转换
    ///
    /// 成功时在游戏写锁内广播新的公开快照，所以订阅者看到的顺序和转换顺序一致；
    /// 之后在后台持久化。被拒绝的转换不会写入，也不会广播。
    pub fn apply<T>(&self, game_id: GameId, transition: T) -> Result<Arc<GameState>, GameError>
    where
        T: FnOnce(&GameState) -> Result<GameState, GameError>,
    {
        let broadcaster = &self.broadcaster;
        let result = self.games.update(game_id, transition, |state| {
            broadcaster.broadcast(game_id, &ServerEvent::state_update(state.public_snapshot()));
        });
        match &result {
            Ok(_) => self.spawn_persist(game_id),
            Err(e) => debug!(%game_id, kind = %e.kind(), "操作被拒绝: {}", e),
        }
        result
    }

    pub fn deal(&self, game_id: GameId) -> Result<Arc<GameState>, GameError> {
        let seed = rand::random();
        self.apply(game_id, |state| deal_new_hand(state, seed))
    }

    pub fn next_hand(&self, game_id: GameId) -> Result<Arc<GameState>, GameError> {
        let seed = rand::random();
        self.apply(game_id, |state| start_new_hand(state, seed))
    }

    /// 新连接加入一局游戏的事件流
    ///
    /// 订阅和排队 `connected`、当前快照都在游戏写锁内完成，
    /// 所以之后的任何更新都排在这份快照后面。
    pub fn join(&self, game_id: GameId, connection_id: ConnectionId) -> Result<Subscription, GameError> {
        let broadcaster = &self.broadcaster;
        self.games.with_current(game_id, |game| {
            let subscription = broadcaster.subscribe(game_id, connection_id);
            broadcaster.send_to(game_id, connection_id, &ServerEvent::connected(connection_id, game_id));
            broadcaster.send_to(game_id, connection_id, &ServerEvent::state_update(game.public_snapshot()));
            subscription
        })
    }

    /// 后台持久化最新状态，失败只记录日志，牌局照常进行
    pub fn spawn_persist(&self, game_id: GameId) {
        if !self.config.persist_on_update {
            return;
        }
        let reconnect = self.reconnect.clone();
        tokio::spawn(async move {
            if let Err(e) = reconnect.persist_latest(game_id).await {
                warn!(%game_id, "自动持久化失败: {}", e);
            }
        });
    }
}

/// 创建包含所有路由的 Router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(games::health))
        .route("/games", post(games::create_game))
        .route("/games/{id}", get(games::get_game).delete(games::delete_game))
        .route("/games/{id}/deal", post(games::deal))
        .route("/games/{id}/next-hand", post(games::next_hand))
        .route("/games/{id}/actions", post(games::act))
        .route("/games/{id}/tokens", post(games::issue_token))
        .route("/games/{id}/persist", post(games::persist))
        .route("/games/{id}/ws", get(ws::websocket_handler))
        .route("/reconnect", post(games::reconnect))
        .route("/evaluate", post(games::evaluate_hand))
        .with_state(state)
}

// --- 错误响应 ---

/// 接口层统一的错误：分类决定状态码，文字原因原样返回给客户端
#[derive(Debug)]
pub struct ApiError {
    pub kind: ErrorKind,
    pub reason: String,
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::State => StatusCode::CONFLICT,
        ErrorKind::Authorization => StatusCode::FORBIDDEN,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Expired => StatusCode::GONE,
        ErrorKind::Persistence => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody { error: self.kind, reason: self.reason };
        (status_for(self.kind), Json(body)).into_response()
    }
}

macro_rules! impl_from_error {
    ($($err:ty),*) => {
        $(
            impl From<$err> for ApiError {
                fn from(err: $err) -> Self {
                    ApiError { kind: err.kind(), reason: err.to_string() }
                }
            }
        )*
    };
}

impl_from_error!(GameError, ReconnectError, PersistenceError, EvalError, DeckError);
