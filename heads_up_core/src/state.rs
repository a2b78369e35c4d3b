use crate::card::{Card, Deck};
use crate::error::GameError;
use crate::eval::HandEvalResult;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type GameId = Uuid;
pub type PlayerId = Uuid;

/// 单挑牌桌固定两个座位
pub const SEATS: usize = 2;

/// 起始筹码上限：两人筹码之和必须放得进 `u32`，奖池和赢家筹码才不会溢出
pub const MAX_STARTING_STACK: u32 = u32::MAX / SEATS as u32;

/// 牌桌规则：起始筹码和盲注
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableRules {
    pub starting_stack: u32,
    pub small_blind: u32,
    pub big_blind: u32,
}

impl Default for TableRules {
    fn default() -> Self {
        TableRules { starting_stack: 1000, small_blind: 10, big_blind: 20 }
    }
}

impl TableRules {
    pub fn with_starting_stack(starting_stack: u32) -> Self {
        TableRules { starting_stack, ..Self::default() }
    }

    /// 检查规则是否合法
    ///
    /// 桌上的筹码总量是 `SEATS * starting_stack`，之后所有的加减都不会超过它。
    pub fn validate(&self) -> Result<(), GameError> {
        if self.starting_stack == 0 || self.starting_stack > MAX_STARTING_STACK {
            return Err(GameError::InvalidRules(format!(
                "起始筹码必须在 1 到 {MAX_STARTING_STACK} 之间，收到 {}",
                self.starting_stack
            )));
        }
        if self.small_blind == 0 || self.big_blind < self.small_blind {
            return Err(GameError::InvalidRules(format!(
                "盲注 {}/{} 无效：小盲必须大于 0 且不超过大盲",
                self.small_blind, self.big_blind
            )));
        }
        Ok(())
    }
}

/// 服务端持有的完整游戏状态
///
/// 这是权威状态，也是持久化的格式（包含未发出的牌堆）。
/// 发给客户端的一律是 [`GameSnapshot`]。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    pub game_id: GameId,
    pub players: [Player; SEATS],
    // 尚未发出的牌
    pub deck: Deck,
    pub community_cards: Vec<Card>,
    pub pot: u32,  // 总奖池金额
    pub current_bet: u32, // 当前街的最高下注额
    pub dealer_index: usize,
    pub active_player_index: Option<usize>, // 当前应该行动的玩家座位
    pub phase: GamePhase,
    pub hand_number: u64,
    pub winner: Option<usize>,
    pub winner_reason: Option<WinnerReason>,
    // 摊牌结果，只有以摊牌结束的牌局才有
    #[serde(default)]
    pub showdown: Vec<ShowdownResult>,
    pub rules: TableRules,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub chips: u32,  // 剩余筹码
    pub hole_cards: Vec<Card>,
    pub current_bet: u32, // 本街已下注
    pub folded: bool,
    pub all_in: bool,
    // 本街是否已经主动行动过（盲注不算）
    pub has_acted: bool,
    // 本局累计投入底池的筹码
    pub contributed: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum GamePhase {
    Waiting,
    Preflop,
    Flop,
    Turn,
    River,
    Complete, // 一局结束，结算完成
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WinnerReason {
    Fold,
    Showdown,
}

/// 玩家动作，在边界处由请求解析成这个封闭枚举
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "action", content = "amount", rename_all = "lowercase")]
pub enum PlayerAction {
    Fold,      // 弃牌
    Call,      // 跟注，无需跟注时即过牌
    Raise(u32), // 加注，金额为加注后本街的总下注额
}

/// 摊牌时单个玩家的结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShowdownResult {
    pub player_index: usize,
    pub hand: HandEvalResult,
    /// 该玩家赢得的筹码数量
    pub winnings: u32,
}

// --- 发给客户端的快照 ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
    pub game_id: GameId,
    pub hand_number: u64,
    pub phase: GamePhase,
    pub pot: u32,
    pub current_bet: u32,
    pub dealer_index: usize,
    pub active_player_index: Option<usize>,
    pub community_cards: Vec<Card>,
    pub players: Vec<PlayerView>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub winner: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub winner_reason: Option<WinnerReason>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub showdown: Vec<ShowdownResult>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    pub id: PlayerId,
    pub name: String,
    pub chips: u32,
    pub current_bet: u32,
    pub folded: bool,
    pub all_in: bool,
    pub hole_cards: Vec<Card>,
}

// --- Player 的实现方法 ---

impl Player {
    pub fn new(name: impl Into<String>, chips: u32) -> Self {
        Player {
            id: Uuid::new_v4(),
            name: name.into(),
            chips,
            hole_cards: vec![],
            current_bet: 0,
            folded: false,
            all_in: false,
            has_acted: false,
            contributed: 0,
        }
    }

    /// 还在牌局中并且还能做决定
    pub fn can_act(&self) -> bool {
        !self.folded && !self.all_in
    }

    /// 把 `amount` 筹码从玩家面前移到底池，返回实际移动的数量
    pub(crate) fn commit(&mut self, amount: u32) -> u32 {
        let amount = amount.min(self.chips);
        self.chips -= amount;
        self.current_bet += amount;
        self.contributed += amount;
        if self.chips == 0 {
            self.all_in = true;
        }
        amount
    }

    fn view(&self, reveal: bool) -> PlayerView {
        PlayerView {
            id: self.id,
            name: self.name.clone(),
            chips: self.chips,
            current_bet: self.current_bet,
            folded: self.folded,
            all_in: self.all_in,
            hole_cards: if reveal { self.hole_cards.clone() } else { vec![] },
        }
    }
}

// --- GameState 的实现方法 ---

impl GameState {
    pub fn new(game_id: GameId, names: [&str; SEATS], rules: TableRules) -> Self {
        GameState {
            game_id,
            players: names.map(|name| Player::new(name, rules.starting_stack)),
            deck: Deck::default(),
            community_cards: vec![],
            pot: 0,
            current_bet: 0,
            dealer_index: 0,
            active_player_index: None,
            phase: GamePhase::Waiting,
            hand_number: 0,
            winner: None,
            winner_reason: None,
            showdown: vec![],
            rules,
        }
    }

    pub fn player_index(&self, player_id: PlayerId) -> Option<usize> {
        self.players.iter().position(|p| p.id == player_id)
    }

    /// 获取当前行动的玩家ID (如果存在)
    pub fn current_player_id(&self) -> Option<PlayerId> {
        self.active_player_index.map(|idx| self.players[idx].id)
    }

    pub fn is_hand_in_progress(&self) -> bool {
        !matches!(self.phase, GamePhase::Waiting | GamePhase::Complete)
    }

    /// 牌堆、公共牌、底牌的总数。发过牌之后恒为 52。
    pub fn cards_accounted(&self) -> usize {
        self.deck.len()
            + self.community_cards.len()
            + self.players.iter().map(|p| p.hole_cards.len()).sum::<usize>()
    }

    /// 底池加上所有玩家筹码，恒等于起始筹码之和
    pub fn chips_in_play(&self) -> u32 {
        self.pot + self.players.iter().map(|p| p.chips).sum::<u32>()
    }

    /// 所有订阅者看到的同一份快照：以摊牌结束时才公开底牌
    pub fn public_snapshot(&self) -> GameSnapshot {
        self.snapshot(|_| false)
    }

    /// 某个玩家视角的快照：额外包含他自己的底牌
    pub fn snapshot_for(&self, viewer: PlayerId) -> GameSnapshot {
        self.snapshot(|player| player.id == viewer)
    }

    fn snapshot(&self, is_viewer: impl Fn(&Player) -> bool) -> GameSnapshot {
        let revealed = self.winner_reason == Some(WinnerReason::Showdown);
        GameSnapshot {
            game_id: self.game_id,
            hand_number: self.hand_number,
            phase: self.phase,
            pot: self.pot,
            current_bet: self.current_bet,
            dealer_index: self.dealer_index,
            active_player_index: self.active_player_index,
            community_cards: self.community_cards.clone(),
            players: self
                .players
                .iter()
                .map(|p| p.view(is_viewer(p) || (revealed && !p.folded)))
                .collect(),
            winner: self.winner,
            winner_reason: self.winner_reason,
            showdown: self.showdown.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_game_is_waiting() {
        let state = GameState::new(Uuid::new_v4(), ["alice", "bob"], TableRules::default());
        assert_eq!(state.phase, GamePhase::Waiting);
        assert_eq!(state.players[0].chips, 1000);
        assert_eq!(state.players[1].name, "bob");
        assert_ne!(state.players[0].id, state.players[1].id);
        assert_eq!(state.cards_accounted(), 0);
        assert_eq!(state.chips_in_play(), 2000);
        assert_eq!(state.current_player_id(), None);
    }

    #[test]
    fn test_snapshot_hides_deck_and_foreign_cards() {
        let mut state = GameState::new(Uuid::new_v4(), ["alice", "bob"], TableRules::default());
        let (hands, rest) = Deck::new().draw(4).unwrap();
        state.players[0].hole_cards = hands[..2].to_vec();
        state.players[1].hole_cards = hands[2..].to_vec();
        state.deck = rest;
        state.phase = GamePhase::Preflop;

        let public = state.public_snapshot();
        assert!(public.players.iter().all(|p| p.hole_cards.is_empty()));

        let alice = state.snapshot_for(state.players[0].id);
        assert_eq!(alice.players[0].hole_cards.len(), 2);
        assert!(alice.players[1].hole_cards.is_empty());

        let json = serde_json::to_value(&public).unwrap();
        assert!(json.get("deck").is_none());
        assert!(json.get("winner").is_none());
        assert_eq!(json["phase"], "preflop");
        assert_eq!(json["players"][0]["allIn"], false);
    }

    #[test]
    fn test_action_wire_shape() {
        let raise = serde_json::to_value(PlayerAction::Raise(60)).unwrap();
        assert_eq!(raise, serde_json::json!({ "action": "raise", "amount": 60 }));
        let fold: PlayerAction = serde_json::from_value(serde_json::json!({ "action": "fold" })).unwrap();
        assert_eq!(fold, PlayerAction::Fold);
    }
}
