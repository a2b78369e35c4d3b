use crate::card::{Card, Deck};
use crate::error::GameError;
use crate::eval::evaluate;
use crate::state::*;
use tracing::debug;

// --- 核心游戏流程函数 ---
//
// 所有转换都是纯函数：读入一个状态，返回新状态或拒绝原因，输入本身从不被修改。

/// 创建一局新的单挑游戏，使用默认规则（起始 1000 筹码，盲注 10/20）
pub fn create_game(game_id: GameId, names: [&str; SEATS]) -> GameState {
    GameState::new(game_id, names, TableRules::default())
}

/// 按指定规则创建游戏，规则不合法时拒绝
pub fn create_game_with_rules(
    game_id: GameId,
    names: [&str; SEATS],
    rules: TableRules,
) -> Result<GameState, GameError> {
    rules.validate()?;
    Ok(GameState::new(game_id, names, rules))
}

/// 发一手新牌
///
/// 只能在没有进行中的牌局时调用（刚创建，或上一手已经结束）。
pub fn deal_new_hand(state: &GameState, seed: u64) -> Result<GameState, GameError> {
    if state.is_hand_in_progress() {
        return Err(GameError::HandNotComplete);
    }
    begin_hand(state, seed)
}

/// 上一手结束后开始下一手
pub fn start_new_hand(state: &GameState, seed: u64) -> Result<GameState, GameError> {
    match state.phase {
        GamePhase::Complete => begin_hand(state, seed),
        GamePhase::Waiting => Err(GameError::NoHandDealt),
        _ => Err(GameError::HandNotComplete),
    }
}

/// 开始新的一局游戏
///
/// - 轮换庄家位置。
/// - 重置奖池、公共牌等。
/// - 用种子洗牌，给每个玩家发两张底牌。
/// - 处理大小盲注：单挑时庄家下小盲，翻牌前先行动。
fn begin_hand(state: &GameState, seed: u64) -> Result<GameState, GameError> {
    if let Some(busted) = state.players.iter().find(|p| p.chips == 0) {
        return Err(GameError::PlayerBusted { name: busted.name.clone() });
    }

    let mut next = state.clone();

    // 1. 轮换庄家位置，第一手由 0 号座位做庄
    if next.hand_number > 0 {
        next.dealer_index = other(next.dealer_index);
    }
    next.hand_number += 1;
    let dealer = next.dealer_index;
    let big_blind = other(dealer);

    // 2. 重置游戏状态
    next.pot = 0;
    next.current_bet = 0;
    next.community_cards.clear();
    next.winner = None;
    next.winner_reason = None;
    next.showdown.clear();
    for player in next.players.iter_mut() {
        player.hole_cards.clear();
        player.current_bet = 0;
        player.folded = false;
        player.all_in = false;
        player.has_acted = false;
        player.contributed = 0;
    }

    // 3. 洗牌，从大盲开始每人一张，发两轮
    let mut deck = Deck::new().shuffle(seed);
    for _ in 0..2 {
        for seat in [big_blind, dealer] {
            let (cards, rest) = deck.draw(1)?;
            next.players[seat].hole_cards.extend(cards);
            deck = rest;
        }
    }
    next.deck = deck;

    // 4. 盲注，筹码不够时全下
    let (small, big) = (next.rules.small_blind, next.rules.big_blind);
    next.pot += next.players[dealer].commit(small);
    next.pot += next.players[big_blind].commit(big);
    next.current_bet = next.players.iter().map(|p| p.current_bet).max().unwrap_or(0);

    // 5. 设置游戏阶段和第一个行动者
    next.phase = GamePhase::Preflop;
    next.active_player_index = Some(if next.players[dealer].can_act() { dealer } else { big_blind });

    // 盲注就把人打成全下时，这一轮可能已经不需要任何决定
    if betting_round_over(&next) {
        close_street(&mut next)?;
    }

    debug!(game_id = %next.game_id, hand = next.hand_number, dealer, "新的一手牌开始");
    Ok(next)
}

/// 处理单个玩家的动作
///
/// 按顺序校验：牌局在进行中、玩家属于这局游戏、轮到该玩家、加注金额合法。
/// 任何一步失败都返回错误，输入状态保持不变。
///
/// 在处理完动作后，它会检查当前下注轮是否结束。
/// 如果是，则推进到下一个游戏阶段 (e.g., Flop -> Turn)。
/// 如果否，则将行动权转移给对手。
pub fn execute_player_action(
    state: &GameState,
    player_id: PlayerId,
    action: PlayerAction,
) -> Result<GameState, GameError> {
    match state.phase {
        GamePhase::Complete => return Err(GameError::HandAlreadyComplete),
        GamePhase::Waiting => return Err(GameError::NoHandInProgress),
        _ => {}
    }

    let seat = state.player_index(player_id).ok_or(GameError::NotAParticipant(player_id))?;
    if state.active_player_index != Some(seat) {
        return Err(GameError::NotYourTurn);
    }

    if let PlayerAction::Raise(amount) = action {
        let player = &state.players[seat];
        // 全下封顶：最多把自己面前所有筹码推进去
        let max = player.chips + player.current_bet;
        if amount <= state.current_bet || amount > max {
            return Err(GameError::InvalidAmount { amount, current_bet: state.current_bet, max });
        }
    }

    let mut next = state.clone();
    apply_action(&mut next, seat, action)?;
    Ok(next)
}

// --- 辅助逻辑函数 ---

fn other(seat: usize) -> usize {
    (seat + 1) % SEATS
}

fn apply_action(state: &mut GameState, seat: usize, action: PlayerAction) -> Result<(), GameError> {
    let opponent = other(seat);

    match action {
        PlayerAction::Fold => {
            state.players[seat].folded = true;
            state.players[seat].has_acted = true;
            award_uncontested(state, opponent);
            return Ok(());
        }
        PlayerAction::Call => {
            let to_call = state.current_bet.saturating_sub(state.players[seat].current_bet);
            state.pot += state.players[seat].commit(to_call);
        }
        PlayerAction::Raise(amount) => {
            let to_add = amount - state.players[seat].current_bet;
            state.pot += state.players[seat].commit(to_add);
            state.current_bet = amount;
            // 被加注的一方需要重新表态
            state.players[opponent].has_acted = false;
        }
    }
    state.players[seat].has_acted = true;

    if betting_round_over(state) {
        close_street(state)?;
    } else {
        state.active_player_index = Some(opponent);
    }
    Ok(())
}

/// 检查当前下注轮是否结束
///
/// 两人都还能行动时，必须双方都表过态且下注额相等；
/// 只剩一人能行动（对手已全下）时，他的下注额不低于对手即可。
fn betting_round_over(state: &GameState) -> bool {
    let live: Vec<&Player> = state.players.iter().filter(|p| !p.folded).collect();
    let top = live.iter().map(|p| p.current_bet).max().unwrap_or(0);
    let actors: Vec<&Player> = live.into_iter().filter(|p| p.can_act()).collect();

    match actors.as_slice() {
        [] => true,
        [only] => only.current_bet >= top,
        _ => actors.iter().all(|p| p.has_acted && p.current_bet == top),
    }
}

/// 推进到下一个游戏阶段
///
/// 在一轮下注结束后调用。
/// - 退还没有被跟注的部分。
/// - 根据当前阶段，发出公共牌 (Flop 3 张, Turn 1 张, River 1 张)。
/// - 重置新一轮的下注状态，翻牌后由大盲位先行动。
/// - 不足两人能行动时直接发完公共牌；River 结束后进入摊牌。
fn close_street(state: &mut GameState) -> Result<(), GameError> {
    return_uncalled_bet(state);

    loop {
        for player in state.players.iter_mut() {
            player.current_bet = 0;
            player.has_acted = false;
        }
        state.current_bet = 0;

        let (phase, count) = match state.phase {
            GamePhase::Preflop => (GamePhase::Flop, 3),
            GamePhase::Flop => (GamePhase::Turn, 1),
            GamePhase::Turn => (GamePhase::River, 1),
            GamePhase::River => return showdown(state),
            GamePhase::Waiting | GamePhase::Complete => return Ok(()),
        };

        let (cards, rest) = state.deck.draw(count)?;
        state.community_cards.extend(cards);
        state.deck = rest;
        state.phase = phase;

        if state.players.iter().all(Player::can_act) {
            state.active_player_index = Some(other(state.dealer_index));
            return Ok(());
        }
        state.active_player_index = None;
    }
}

/// 对手全下的金额比自己少时，多出来的下注没人能跟，退回给下注者
fn return_uncalled_bet(state: &mut GameState) {
    let (high, low) = if state.players[0].current_bet >= state.players[1].current_bet { (0, 1) } else { (1, 0) };
    if state.players[low].folded {
        return;
    }
    let excess = state.players[high].current_bet - state.players[low].current_bet;
    if excess == 0 {
        return;
    }

    let player = &mut state.players[high];
    player.chips += excess;
    player.current_bet -= excess;
    player.contributed -= excess;
    if player.chips > 0 {
        player.all_in = false;
    }
    state.pot -= excess;
    debug!(game_id = %state.game_id, seat = high, excess, "退还未被跟注的筹码");
}

/// 对手弃牌，底池全部归剩下的玩家
fn award_uncontested(state: &mut GameState, winner: usize) {
    state.players[winner].chips += state.pot;
    state.pot = 0;
    finish_hand(state, Some(winner), WinnerReason::Fold);
}

/// 处理摊牌逻辑
///
/// - 为每个未弃牌的玩家评估两张底牌加五张公共牌的最佳牌型。
/// - strength 小的一方赢；相等则平分，零头给庄家左手边的玩家。
fn showdown(state: &mut GameState) -> Result<(), GameError> {
    let mut results = Vec::with_capacity(SEATS);
    for (seat, player) in state.players.iter().enumerate().filter(|(_, p)| !p.folded) {
        let cards: Vec<Card> = player.hole_cards.iter().chain(&state.community_cards).copied().collect();
        results.push(ShowdownResult { player_index: seat, hand: evaluate(&cards)?, winnings: 0 });
    }

    let best = results.iter().map(|r| r.hand.strength).min();
    let winners: Vec<usize> = results
        .iter()
        .filter(|r| Some(r.hand.strength) == best)
        .map(|r| r.player_index)
        .collect();
    if winners.is_empty() {
        return Ok(());
    }

    let share = state.pot / winners.len() as u32;
    let remainder = state.pot % winners.len() as u32;
    let non_dealer = other(state.dealer_index);
    let odd_chip_seat = if winners.contains(&non_dealer) { non_dealer } else { winners[0] };

    for result in results.iter_mut().filter(|r| winners.contains(&r.player_index)) {
        result.winnings = share + if result.player_index == odd_chip_seat { remainder } else { 0 };
        state.players[result.player_index].chips += result.winnings;
    }
    state.pot = 0;
    state.showdown = results;

    let winner = if winners.len() == 1 { Some(winners[0]) } else { None };
    finish_hand(state, winner, WinnerReason::Showdown);
    Ok(())
}

fn finish_hand(state: &mut GameState, winner: Option<usize>, reason: WinnerReason) {
    state.phase = GamePhase::Complete;
    state.active_player_index = None;
    state.current_bet = 0;
    state.winner = winner;
    state.winner_reason = Some(reason);
    debug!(game_id = %state.game_id, hand = state.hand_number, ?winner, ?reason, "本手牌结束");
}

// --- 单元测试 ---
