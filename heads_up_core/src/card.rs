use rand::SeedableRng;
use rand::prelude::SliceRandom;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::error::ErrorKind;

// --- 核心数据结构定义 ---

/// 花色 (Suit)
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Serialize, Deserialize)]
pub enum Suit {
    #[serde(rename = "♠")]
    Spade, // 黑桃
    #[serde(rename = "♥")]
    Heart, // 红心
    #[serde(rename = "♣")]
    Club, // 梅花
    #[serde(rename = "♦")]
    Diamond, // 方块
}

/// 点数 (Rank)
/// Ace 可以是最大也可以是最小 (在 A-2-3-4-5 顺子中)
/// Ord 的派生让 Ace 默认是最大的
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Serialize, Deserialize)]
pub enum Rank {
    #[serde(rename = "2")]
    Two,
    #[serde(rename = "3")]
    Three,
    #[serde(rename = "4")]
    Four,
    #[serde(rename = "5")]
    Five,
    #[serde(rename = "6")]
    Six,
    #[serde(rename = "7")]
    Seven,
    #[serde(rename = "8")]
    Eight,
    #[serde(rename = "9")]
    Nine,
    #[serde(rename = "10")]
    Ten,
    #[serde(rename = "J")]
    Jack,
    #[serde(rename = "Q")]
    Queen,
    #[serde(rename = "K")]
    King,
    #[serde(rename = "A")]
    Ace,
}

/// 单张扑克牌 (Card)
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Serialize, Deserialize)]
pub struct Card {
    pub rank: Rank,
    pub suit: Suit,
}

impl Card {
    pub fn new(rank: Rank, suit: Suit) -> Card {
        Card { rank, suit }
    }
}

impl Suit {
    pub const ALL: [Suit; 4] = [Suit::Spade, Suit::Heart, Suit::Club, Suit::Diamond];
}

impl Rank {
    /// 从小到大排列的全部点数
    pub const ALL: [Rank; 13] = [
        Rank::Two, Rank::Three, Rank::Four, Rank::Five, Rank::Six, Rank::Seven,
        Rank::Eight, Rank::Nine, Rank::Ten, Rank::Jack, Rank::Queen, Rank::King, Rank::Ace,
    ];

    /// 点数的数值，2..=14，Ace 记为 14
    pub fn value(self) -> u8 {
        self as u8 + 2
    }

    pub fn label(self) -> &'static str {
        match self {
            Rank::Two => "2",
            Rank::Three => "3",
            Rank::Four => "4",
            Rank::Five => "5",
            Rank::Six => "6",
            Rank::Seven => "7",
            Rank::Eight => "8",
            Rank::Nine => "9",
            Rank::Ten => "10",
            Rank::Jack => "J",
            Rank::Queen => "Q",
            Rank::King => "K",
            Rank::Ace => "A",
        }
    }
}

// --- 实现辅助功能 ---

impl fmt::Display for Suit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", match self {
            Suit::Spade => "♠",
            Suit::Heart => "♥",
            Suit::Club => "♣",
            Suit::Diamond => "♦",
        })
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}{}", self.rank, self.suit)
    }
}

/// 解析 "As"、"10h"、"Td"、"Q♠" 这样的牌面记号（点数在前，花色在后，大小写不敏感）
impl FromStr for Card {
    type Err = DeckError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        let invalid = || DeckError::InvalidCardToken(token.to_string());
        let token = token.trim();
        let suit_char = token.chars().last().ok_or_else(invalid)?;
        let rank_part = &token[..token.len() - suit_char.len_utf8()];

        let suit = match suit_char.to_ascii_lowercase() {
            's' | '♠' => Suit::Spade,
            'h' | '♥' => Suit::Heart,
            'c' | '♣' => Suit::Club,
            'd' | '♦' => Suit::Diamond,
            _ => return Err(invalid()),
        };
        let rank = match rank_part.to_ascii_uppercase().as_str() {
            "2" => Rank::Two,
            "3" => Rank::Three,
            "4" => Rank::Four,
            "5" => Rank::Five,
            "6" => Rank::Six,
            "7" => Rank::Seven,
            "8" => Rank::Eight,
            "9" => Rank::Nine,
            "10" | "T" => Rank::Ten,
            "J" => Rank::Jack,
            "Q" => Rank::Queen,
            "K" => Rank::King,
            "A" => Rank::Ace,
            _ => return Err(invalid()),
        };
        Ok(Card { rank, suit })
    }
}

// --- 牌组 ---

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeckError {
    #[error("牌堆只剩 {available} 张牌，无法抽取 {requested} 张")]
    InsufficientCards { requested: usize, available: usize },
    #[error("无法识别的牌面记号: {0:?}")]
    InvalidCardToken(String),
}

impl DeckError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DeckError::InsufficientCards { .. } => ErrorKind::State,
            DeckError::InvalidCardToken(_) => ErrorKind::Validation,
        }
    }
}

/// 牌堆 (Deck)
///
/// 不可变快照：洗牌和抽牌都返回新的牌堆，原牌堆保持不变，
/// 这样状态机的每一步转换都只依赖输入。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Deck {
    cards: Vec<Card>,
}

impl Deck {
    /// 创建一副完整的 52 张扑克牌，固定顺序：按花色 ♠ ♥ ♣ ♦，每种花色 2..A
    pub fn new() -> Deck {
        let mut cards = Vec::with_capacity(52);
        for &suit in &Suit::ALL {
            for &rank in &Rank::ALL {
                cards.push(Card { rank, suit });
            }
        }
        Deck { cards }
    }

    /// 用给定种子洗牌。同一个种子永远得到同样的顺序。
    pub fn shuffle(&self, seed: u64) -> Deck {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut cards = self.cards.clone();
        cards.shuffle(&mut rng);
        Deck { cards }
    }

    /// 从牌堆顶部抽取 `n` 张牌，返回抽到的牌和剩余的牌堆
    pub fn draw(&self, n: usize) -> Result<(Vec<Card>, Deck), DeckError> {
        if n > self.cards.len() {
            return Err(DeckError::InsufficientCards { requested: n, available: self.cards.len() });
        }
        let (drawn, rest) = self.cards.split_at(n);
        Ok((drawn.to_vec(), Deck { cards: rest.to_vec() }))
    }

    /// 按给定顺序组成牌堆，调用者保证没有重复的牌
    pub(crate) fn from_cards(cards: Vec<Card>) -> Deck {
        Deck { cards }
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }
}

// --- 单元测试 ---

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_new_deck_has_52_unique_cards() {
        let deck = Deck::new();
        assert_eq!(deck.len(), 52);
        let unique: HashSet<_> = deck.cards().iter().collect();
        assert_eq!(unique.len(), 52);
        assert_eq!(deck.cards()[0], Card::new(Rank::Two, Suit::Spade));
        assert_eq!(deck.cards()[51], Card::new(Rank::Ace, Suit::Diamond));
    }

    #[test]
    fn test_shuffle_is_reproducible() {
        let a = Deck::new().shuffle(42);
        let b = Deck::new().shuffle(42);
        let c = Deck::new().shuffle(43);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, Deck::new());
    }

    #[test]
    fn test_draw_leaves_original_untouched() {
        let deck = Deck::new();
        let (drawn, rest) = deck.draw(3).unwrap();
        assert_eq!(drawn, deck.cards()[..3].to_vec());
        assert_eq!(rest.len(), 49);
        assert_eq!(deck.len(), 52);

        let (none, same) = deck.draw(0).unwrap();
        assert!(none.is_empty());
        assert_eq!(same, deck);
    }

    #[test]
    fn test_draw_too_many() {
        let (_, rest) = Deck::new().draw(50).unwrap();
        assert_eq!(
            rest.draw(3),
            Err(DeckError::InsufficientCards { requested: 3, available: 2 })
        );
    }

    #[test]
    fn test_parse_card_tokens() {
        assert_eq!("As".parse::<Card>().unwrap(), Card::new(Rank::Ace, Suit::Spade));
        assert_eq!("10h".parse::<Card>().unwrap(), Card::new(Rank::Ten, Suit::Heart));
        assert_eq!("td".parse::<Card>().unwrap(), Card::new(Rank::Ten, Suit::Diamond));
        assert_eq!("Q♣".parse::<Card>().unwrap(), Card::new(Rank::Queen, Suit::Club));
        assert!("1s".parse::<Card>().is_err());
        assert!("Ax".parse::<Card>().is_err());
        assert!("".parse::<Card>().is_err());
    }

    #[test]
    fn test_display_round_trips_through_parse() {
        for card in Deck::new().cards() {
            assert_eq!(card.to_string().parse::<Card>().unwrap(), *card);
        }
    }

    #[test]
    fn test_card_json_shape() {
        let json = serde_json::to_value(Card::new(Rank::Ten, Suit::Heart)).unwrap();
        assert_eq!(json, serde_json::json!({ "rank": "10", "suit": "♥" }));
    }
}
