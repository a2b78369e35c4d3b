//! # 单挑德州扑克核心逻辑库
//!
//! 这个 `core` crate 包含了两人德州扑克的牌组、牌力评估、
//! 纯函数式的牌局状态机、按游戏串行化写入的内存存储，
//! 以及客户端-服务器通信消息的定义。
//! 它不依赖任何异步运行时或网络传输，服务器和测试都可以直接使用。

mod card;
mod error;
mod eval;
mod logic;
mod message;
mod state;
mod store;

pub use card::*;

pub use error::*;

pub use eval::*;

pub use logic::*;

pub use message::*;

pub use state::*;

pub use store::*;
