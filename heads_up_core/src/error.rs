use crate::card::DeckError;
use crate::eval::EvalError;
use crate::state::{GameId, PlayerId};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// 错误分类
///
/// 每个具体的错误枚举都通过 `kind()` 归入这里的某一类，
/// 上层（HTTP / WebSocket）只根据分类决定状态码，不需要解析内部错误码。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    /// 输入格式错误：牌数不对、动作类型非法、缺少金额等
    Validation,
    /// 当前阶段不允许该操作：牌局进行中发新牌、牌局已结束仍然行动
    State,
    /// 不是你的回合，或者你不是这局游戏的玩家
    Authorization,
    /// 游戏 / 玩家 / 令牌不存在
    NotFound,
    /// 重连令牌已过期
    Expired,
    /// 持久化存储读写失败
    Persistence,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::State => "state",
            ErrorKind::Authorization => "authorization",
            ErrorKind::NotFound => "notFound",
            ErrorKind::Expired => "expired",
            ErrorKind::Persistence => "persistence",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 状态机、动作解析和游戏存储的错误
///
/// 所有拒绝都不会修改输入状态，调用者不能把被拒绝的结果写回存储。
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GameError {
    #[error("游戏 {0} 不存在")]
    GameNotFound(GameId),
    #[error("游戏 {0} 已经存在")]
    GameAlreadyExists(GameId),
    #[error("当前牌局尚未结束")]
    HandNotComplete,
    #[error("还没有发过第一手牌")]
    NoHandDealt,
    #[error("当前没有进行中的牌局")]
    NoHandInProgress,
    #[error("本局已经结束")]
    HandAlreadyComplete,
    #[error("{name} 的筹码已经输光，无法开始新的一局")]
    PlayerBusted { name: String },
    #[error("玩家 {0} 不在这局游戏中")]
    NotAParticipant(PlayerId),
    #[error("还没轮到你行动")]
    NotYourTurn,
    #[error("无效的动作: {0:?}")]
    InvalidAction(String),
    #[error("加注必须提供金额")]
    MissingAmount,
    #[error("只有加注可以带金额")]
    UnexpectedAmount,
    #[error("牌桌规则无效: {0}")]
    InvalidRules(String),
    #[error("加注金额 {amount} 无效：必须大于 {current_bet} 且不超过 {max}")]
    InvalidAmount { amount: u32, current_bet: u32, max: u32 },
    #[error("发牌失败: {0}")]
    Deck(#[from] DeckError),
    #[error("摊牌评估失败: {0}")]
    Evaluation(#[from] EvalError),
}

impl GameError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GameError::GameNotFound(_) => ErrorKind::NotFound,
            GameError::NotAParticipant(_) | GameError::NotYourTurn => ErrorKind::Authorization,
            GameError::InvalidAction(_)
            | GameError::MissingAmount
            | GameError::UnexpectedAmount
            | GameError::InvalidRules(_)
            | GameError::InvalidAmount { .. } => ErrorKind::Validation,
            GameError::GameAlreadyExists(_)
            | GameError::HandNotComplete
            | GameError::NoHandDealt
            | GameError::NoHandInProgress
            | GameError::HandAlreadyComplete
            | GameError::PlayerBusted { .. } => ErrorKind::State,
            GameError::Deck(e) => e.kind(),
            GameError::Evaluation(_) => ErrorKind::State,
        }
    }
}
