use crate::card::{Card, Rank, Suit};
use crate::error::ErrorKind;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::LazyLock;
use thiserror::Error;

/// 牌型类别 (HandCategory)
/// 变体的顺序从小到大排列，可以直接利用 `Ord` 比较类别高低。
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HandCategory {
    HighCard,      // 高牌
    OnePair,       // 一对
    TwoPair,       // 两对
    ThreeOfAKind,  // 三条
    Straight,      // 顺子
    Flush,         // 同花
    FullHouse,     // 葫芦
    FourOfAKind,   // 四条
    StraightFlush, // 同花顺
    RoyalFlush,    // 皇家同花顺
}

/// 牌力评估结果
///
/// `strength` 越小牌越大：1 是皇家同花顺，7462 是 7-5-4-3-2 杂色高牌。
/// 两手牌 `strength` 相等当且仅当它们平分底池。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandEvalResult {
    pub category: HandCategory,
    pub strength: u16,
    /// 同一牌型内决定胜负的点数，重要的在前
    ///
    /// 有成组牌的牌型（四条、三条、两对、一对）只列组外的踢脚牌；
    /// 没有踢脚牌的牌型列出比大小用的点数：顺子和同花顺是最大的一张，
    /// 葫芦是三条和对子，同花和高牌是全部五张。
    pub kickers: Vec<Rank>,
    /// 组成最佳牌型的 5 张牌，按贡献排序
    pub contributing_cards: Vec<Card>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EvalError {
    #[error("评估需要 5 到 7 张牌，实际收到 {0} 张")]
    InvalidCardCount(usize),
    #[error("出现重复的牌: {0}")]
    DuplicateCards(Card),
}

impl EvalError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Validation
    }
}

/// 所有牌型等价类的数量
pub const HAND_CLASS_COUNT: u16 = 7462;

impl fmt::Display for HandCategory {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", match self {
            HandCategory::HighCard => "高牌",
            HandCategory::OnePair => "一对",
            HandCategory::TwoPair => "两对",
            HandCategory::ThreeOfAKind => "三条",
            HandCategory::Straight => "顺子",
            HandCategory::Flush => "同花",
            HandCategory::FullHouse => "葫芦",
            HandCategory::FourOfAKind => "四条",
            HandCategory::StraightFlush => "同花顺",
            HandCategory::RoyalFlush => "皇家同花顺",
        })
    }
}

impl HandCategory {
    /// 比较用的类别槽位，0 最大。皇家同花顺只是 A 开头的同花顺，所以共用一个槽位。
    fn slot(self) -> u32 {
        match self {
            HandCategory::RoyalFlush | HandCategory::StraightFlush => 0,
            HandCategory::FourOfAKind => 1,
            HandCategory::FullHouse => 2,
            HandCategory::Flush => 3,
            HandCategory::Straight => 4,
            HandCategory::ThreeOfAKind => 5,
            HandCategory::TwoPair => 6,
            HandCategory::OnePair => 7,
            HandCategory::HighCard => 8,
        }
    }
}

// --- 牌型评估逻辑 ---

/// 从 5 到 7 张牌中找出最优的 5 张牌组合并给出牌力
///
/// 按优先级依次检查同花顺、四条、葫芦、同花、顺子、三条、两对、一对、高牌，
/// 直接在点数/花色统计上完成 6~7 张牌到最佳 5 张的约简。
pub fn evaluate(cards: &[Card]) -> Result<HandEvalResult, EvalError> {
    validate(cards)?;
    Ok(classify(cards).into_result())
}

/// 穷举所有 5 张组合取最大值的参考实现，比 `evaluate` 慢，结果必须一致
pub fn evaluate_by_combinations(cards: &[Card]) -> Result<HandEvalResult, EvalError> {
    validate(cards)?;
    get_combinations(cards, 5)
        .into_iter()
        .map(|hand| classify(&hand))
        .min_by_key(MadeHand::key)
        .map(MadeHand::into_result)
        .ok_or(EvalError::InvalidCardCount(cards.len()))
}

fn validate(cards: &[Card]) -> Result<(), EvalError> {
    if !(5..=7).contains(&cards.len()) {
        return Err(EvalError::InvalidCardCount(cards.len()));
    }
    let mut seen = HashSet::with_capacity(cards.len());
    for card in cards {
        if !seen.insert(*card) {
            return Err(EvalError::DuplicateCards(*card));
        }
    }
    Ok(())
}

/// 分类后的中间结果
struct MadeHand {
    category: HandCategory,
    /// 决定胜负的点数序列，重要的在前
    ranks: Vec<Rank>,
    kickers: Vec<Rank>,
    cards: Vec<Card>,
}

impl MadeHand {
    fn key(&self) -> u32 {
        hand_key(self.category, &self.ranks)
    }

    fn into_result(self) -> HandEvalResult {
        HandEvalResult {
            category: self.category,
            strength: strength_of(self.key()),
            kickers: self.kickers,
            contributing_cards: self.cards,
        }
    }
}

fn classify(cards: &[Card]) -> MadeHand {
    let mut sorted = cards.to_vec();
    // 从大到小排序，方便处理
    sorted.sort_by(|a, b| b.rank.cmp(&a.rank).then(a.suit.cmp(&b.suit)));

    // 1. 同花和同花顺 (7 张牌最多只可能有一种花色达到 5 张)
    let flush_cards = Suit::ALL
        .iter()
        .map(|suit| sorted.iter().filter(|c| c.suit == *suit).copied().collect::<Vec<_>>())
        .find(|suited| suited.len() >= 5);

    if let Some(straight) = flush_cards.as_deref().and_then(find_straight) {
        let high = straight[0].rank;
        let category = if high == Rank::Ace { HandCategory::RoyalFlush } else { HandCategory::StraightFlush };
        return MadeHand { category, ranks: vec![high], kickers: vec![high], cards: straight };
    }

    // 2. 按点数分组，先按张数再按点数从大到小排
    let groups = group_by_rank(&sorted);
    let top = &groups[0];

    if top.len() == 4 {
        let kicker = best_others(&sorted, &[top[0].rank], 1);
        let kicker_rank = kicker[0].rank;
        return MadeHand {
            category: HandCategory::FourOfAKind,
            ranks: vec![top[0].rank, kicker_rank],
            kickers: vec![kicker_rank],
            cards: [top.as_slice(), kicker.as_slice()].concat(),
        };
    }

    if top.len() == 3 && groups[1].len() >= 2 {
        // 第二组可能也是三条，只取其中两张
        let pair = &groups[1][..2];
        return MadeHand {
            category: HandCategory::FullHouse,
            ranks: vec![top[0].rank, pair[0].rank],
            kickers: vec![top[0].rank, pair[0].rank],
            cards: [top.as_slice(), pair].concat(),
        };
    }

    if let Some(flush) = flush_cards {
        let best: Vec<Card> = flush.into_iter().take(5).collect();
        let ranks: Vec<Rank> = best.iter().map(|c| c.rank).collect();
        return MadeHand { category: HandCategory::Flush, ranks: ranks.clone(), kickers: ranks, cards: best };
    }

    if let Some(straight) = find_straight(&sorted) {
        return MadeHand {
            category: HandCategory::Straight,
            ranks: vec![straight[0].rank],
            kickers: vec![straight[0].rank],
            cards: straight,
        };
    }

    if top.len() == 3 {
        let others = best_others(&sorted, &[top[0].rank], 2);
        let kickers: Vec<Rank> = others.iter().map(|c| c.rank).collect();
        return MadeHand {
            category: HandCategory::ThreeOfAKind,
            ranks: [vec![top[0].rank], kickers.clone()].concat(),
            kickers,
            cards: [top.as_slice(), others.as_slice()].concat(),
        };
    }

    if top.len() == 2 && groups[1].len() == 2 {
        let low = &groups[1];
        // 第三个对子的点数也可以做踢脚
        let kicker = best_others(&sorted, &[top[0].rank, low[0].rank], 1);
        let kicker_rank = kicker[0].rank;
        return MadeHand {
            category: HandCategory::TwoPair,
            ranks: vec![top[0].rank, low[0].rank, kicker_rank],
            kickers: vec![kicker_rank],
            cards: [top.as_slice(), low.as_slice(), kicker.as_slice()].concat(),
        };
    }

    if top.len() == 2 {
        let others = best_others(&sorted, &[top[0].rank], 3);
        let kickers: Vec<Rank> = others.iter().map(|c| c.rank).collect();
        return MadeHand {
            category: HandCategory::OnePair,
            ranks: [vec![top[0].rank], kickers.clone()].concat(),
            kickers,
            cards: [top.as_slice(), others.as_slice()].concat(),
        };
    }

    let best: Vec<Card> = sorted.into_iter().take(5).collect();
    let ranks: Vec<Rank> = best.iter().map(|c| c.rank).collect();
    MadeHand { category: HandCategory::HighCard, ranks: ranks.clone(), kickers: ranks, cards: best }
}

/// 在已排序的牌中找最大的顺子，返回从大到小的 5 张牌（A-2-3-4-5 中 A 排在最后）
fn find_straight(sorted: &[Card]) -> Option<Vec<Card>> {
    // 下标即点数，每个点数只保留一张
    let mut by_value: [Option<Card>; 15] = [None; 15];
    for card in sorted {
        let slot = &mut by_value[card.rank.value() as usize];
        if slot.is_none() {
            *slot = Some(*card);
        }
    }
    by_value[1] = by_value[14];

    (5..=14usize)
        .rev()
        .find_map(|high| (0..5).map(|i| by_value[high - i]).collect::<Option<Vec<Card>>>())
}

fn group_by_rank(sorted: &[Card]) -> Vec<Vec<Card>> {
    let mut groups: Vec<Vec<Card>> = Vec::new();
    for card in sorted {
        match groups.last_mut() {
            Some(group) if group[0].rank == card.rank => group.push(*card),
            _ => groups.push(vec![*card]),
        }
    }
    // 稳定排序：张数相同的组保持点数从大到小
    groups.sort_by(|a, b| b.len().cmp(&a.len()));
    groups
}

fn best_others(sorted: &[Card], exclude: &[Rank], n: usize) -> Vec<Card> {
    sorted.iter().filter(|c| !exclude.contains(&c.rank)).take(n).copied().collect()
}

// --- 牌力数值 ---

/// 以 13 为底的多项式：类别槽位在最高位，之后每个比较位放 (14 - 点数)，值越小越强
fn hand_key(category: HandCategory, ranks: &[Rank]) -> u32 {
    let mut key = category.slot();
    for i in 0..5 {
        let digit = ranks.get(i).map_or(0, |r| 14 - r.value() as u32);
        key = key * 13 + digit;
    }
    key
}

/// 所有合法牌型的 key，升序排列，下标 + 1 就是 strength
static STRENGTH_TABLE: LazyLock<Vec<u32>> = LazyLock::new(build_strength_table);

fn strength_of(key: u32) -> u16 {
    // 表里包含所有能被 classify 产生的 key
    let (Ok(index) | Err(index)) = STRENGTH_TABLE.binary_search(&key);
    index as u16 + 1
}

fn build_strength_table() -> Vec<u32> {
    let desc: Vec<Rank> = Rank::ALL.iter().rev().copied().collect();
    let mut keys = Vec::with_capacity(HAND_CLASS_COUNT as usize);

    // A 到 5 开头的 10 种顺子
    for &high in &desc[..10] {
        keys.push(hand_key(HandCategory::StraightFlush, &[high]));
        keys.push(hand_key(HandCategory::Straight, &[high]));
    }
    for &a in &desc {
        for &b in desc.iter().filter(|&&b| b != a) {
            keys.push(hand_key(HandCategory::FourOfAKind, &[a, b]));
            keys.push(hand_key(HandCategory::FullHouse, &[a, b]));
        }
    }
    for combo in get_combinations(&desc, 5) {
        if !is_straight_ranks(&combo) {
            keys.push(hand_key(HandCategory::Flush, &combo));
            keys.push(hand_key(HandCategory::HighCard, &combo));
        }
    }
    for &main in &desc {
        let others: Vec<Rank> = desc.iter().copied().filter(|&r| r != main).collect();
        for combo in get_combinations(&others, 2) {
            keys.push(hand_key(HandCategory::ThreeOfAKind, &[vec![main], combo].concat()));
        }
        for combo in get_combinations(&others, 3) {
            keys.push(hand_key(HandCategory::OnePair, &[vec![main], combo].concat()));
        }
    }
    for pairs in get_combinations(&desc, 2) {
        for &kicker in desc.iter().filter(|&&r| !pairs.contains(&r)) {
            keys.push(hand_key(HandCategory::TwoPair, &[pairs[0], pairs[1], kicker]));
        }
    }

    keys.sort_unstable();
    keys.dedup();
    keys
}

/// 5 个从大到小的不同点数是否构成顺子
fn is_straight_ranks(desc: &[Rank]) -> bool {
    desc.windows(2).all(|w| w[0].value() == w[1].value() + 1)
        || desc == [Rank::Ace, Rank::Five, Rank::Four, Rank::Three, Rank::Two]
}

/// 辅助函数：从一个切片中生成所有大小为 k 的组合，保持原有顺序
fn get_combinations<T: Clone>(data: &[T], k: usize) -> Vec<Vec<T>> {
    if k == 0 {
        return vec![vec![]];
    }
    if data.len() < k {
        return vec![];
    }

    let mut result = vec![];
    let (first, rest) = data.split_at(1);

    // 包含第一个元素的组合
    let mut combinations_with_first = get_combinations(rest, k - 1);
    for combo in &mut combinations_with_first {
        combo.insert(0, first[0].clone());
    }
    result.append(&mut combinations_with_first);

    // 不包含第一个元素的组合
    if data.len() > k {
        let mut combinations_without_first = get_combinations(rest, k);
        result.append(&mut combinations_without_first);
    }

    result
}

// --- 单元测试 ---
