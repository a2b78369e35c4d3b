use crate::error::{ErrorKind, GameError};
use crate::state::{GameId, GameSnapshot, PlayerAction, PlayerId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type ConnectionId = Uuid;

// --- 客户端 -> 服务器 的消息 ---
// 这些是客户端可以发送给服务器的请求或动作。

/// 玩家动作请求 `{playerId, action, amount?}`
///
/// 原始请求里的 `action` 是任意字符串，`into_action` 在边界处把它
/// 校验成封闭的 [`PlayerAction`]，状态机只接触校验后的结果。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ActionRequest {
    pub player_id: PlayerId,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<u32>,
}

impl ActionRequest {
    pub fn into_action(&self) -> Result<PlayerAction, GameError> {
        match (self.action.as_str(), self.amount) {
            ("fold", None) => Ok(PlayerAction::Fold),
            ("call", None) => Ok(PlayerAction::Call),
            ("fold" | "call", Some(_)) => Err(GameError::UnexpectedAmount),
            ("raise", None) => Err(GameError::MissingAmount),
            ("raise", Some(0)) => Err(GameError::InvalidAmount { amount: 0, current_bet: 0, max: 0 }),
            ("raise", Some(amount)) => Ok(PlayerAction::Raise(amount)),
            (other, _) => Err(GameError::InvalidAction(other.to_string())),
        }
    }
}

/// 牌型评估请求，每张牌是 "As" / "10h" 这样的记号
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct EvaluateRequest {
    pub cards: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreateGameRequest {
    pub player_names: [String; 2],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starting_stack: Option<u32>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TokenRequest {
    pub player_id: PlayerId,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReconnectRequest {
    pub game_id: GameId,
    pub player_id: PlayerId,
    pub reconnect_token: String,
}

/// 通过 WebSocket 发来的指令
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// 玩家在轮到自己时执行的游戏动作
    Act(ActionRequest),
    /// 发第一手牌
    Deal,
    /// 上一手结束后开始下一手
    NextHand,
}

// --- 服务器 -> 客户端 的消息 ---
// 这些是服务器推送给订阅者的事件，每个事件都带服务器时间戳。

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerEvent {
    /// 状态机产生新状态后，广播给这局游戏的所有订阅者
    #[serde(rename_all = "camelCase")]
    GameStateUpdate { data: GameSnapshot, timestamp: DateTime<Utc> },
    /// 订阅成功后私密地发给该连接
    #[serde(rename_all = "camelCase")]
    Connected { connection_id: ConnectionId, game_id: GameId, timestamp: DateTime<Utc> },
    /// 定时心跳
    KeepAlive { timestamp: DateTime<Utc> },
    /// 只发给出错的那个连接
    Error { kind: ErrorKind, reason: String, timestamp: DateTime<Utc> },
}

impl ServerEvent {
    pub fn state_update(data: GameSnapshot) -> Self {
        ServerEvent::GameStateUpdate { data, timestamp: Utc::now() }
    }

    pub fn connected(connection_id: ConnectionId, game_id: GameId) -> Self {
        ServerEvent::Connected { connection_id, game_id, timestamp: Utc::now() }
    }

    pub fn keep_alive() -> Self {
        ServerEvent::KeepAlive { timestamp: Utc::now() }
    }

    pub fn error(kind: ErrorKind, reason: impl Into<String>) -> Self {
        ServerEvent::Error { kind, reason: reason.into(), timestamp: Utc::now() }
    }
}

impl From<&GameError> for ServerEvent {
    fn from(err: &GameError) -> Self {
        ServerEvent::error(err.kind(), err.to_string())
    }
}

/// HTTP 错误响应体 `{error, reason}`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: ErrorKind,
    pub reason: String,
}
