use crate::error::GameError;
use crate::state::{GameId, GameState};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::{Mutex as P_Mutex, RwLock as P_RwLock};
use std::sync::Arc;
use tracing::debug;

/// 进程内的游戏存储
///
/// 每局游戏是一个独立的可串行化资源：同一局游戏同时最多只有一个转换在执行，
/// 不同游戏之间互不阻塞。读取拿到的是已发布的不可变快照，不需要等待写锁。
///
/// 存储在进程启动时创建一次，通过 `Arc` 传给所有组件，测试可以各自创建独立的实例。
#[derive(Default)]
pub struct GameStore {
    games: DashMap<GameId, Arc<GameSlot>>,
}

// 单局游戏的槽位
// 重要‼️：锁的顺序固定为 write -> state，且 state 只在发布时短暂持有
struct GameSlot {
    // 串行化同一局游戏的所有转换
    write: P_Mutex<()>,
    // 当前已发布的状态
    state: P_RwLock<Arc<GameState>>,
}

impl GameSlot {
    fn new(state: GameState) -> Self {
        GameSlot { write: P_Mutex::new(()), state: P_RwLock::new(Arc::new(state)) }
    }

    fn current(&self) -> Arc<GameState> {
        self.state.read().clone()
    }
}

impl GameStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 放入一局新游戏，同 id 已存在时拒绝
    pub fn insert(&self, state: GameState) -> Result<Arc<GameState>, GameError> {
        let game_id = state.game_id;
        match self.games.entry(game_id) {
            Entry::Occupied(_) => Err(GameError::GameAlreadyExists(game_id)),
            Entry::Vacant(entry) => {
                let slot = entry.insert(Arc::new(GameSlot::new(state)));
                debug!(%game_id, "游戏已加入存储");
                Ok(slot.current())
            }
        }
    }

    /// 从持久化快照恢复：内存中已经有这局游戏时保留内存里的版本
    pub fn restore(&self, state: GameState) -> Arc<GameState> {
        let game_id = state.game_id;
        let slot = self.games.entry(game_id).or_insert_with(|| Arc::new(GameSlot::new(state))).value().clone();
        slot.current()
    }

    pub fn get(&self, game_id: GameId) -> Option<Arc<GameState>> {
        self.slot(game_id).map(|slot| slot.current())
    }

    pub fn contains(&self, game_id: GameId) -> bool {
        self.games.contains_key(&game_id)
    }

    pub fn remove(&self, game_id: GameId) -> Option<Arc<GameState>> {
        self.games.remove(&game_id).map(|(_, slot)| slot.current())
    }

    pub fn len(&self) -> usize {
        self.games.len()
    }

    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }

    /// 在这局游戏的写锁内执行一次转换
    ///
    /// - `transition` 读取当前状态，返回新状态或拒绝原因。被拒绝时什么都不会写入。
    /// - 成功时先发布新状态，再在仍然持有写锁的情况下调用 `on_commit`，
    ///   所以 `on_commit` 看到的顺序和转换的顺序完全一致（用于广播）。
    ///
    /// `on_commit` 不能阻塞，也不能再次调用同一局游戏的 `update`。
    pub fn update<T, C>(&self, game_id: GameId, transition: T, on_commit: C) -> Result<Arc<GameState>, GameError>
    where
        T: FnOnce(&GameState) -> Result<GameState, GameError>,
        C: FnOnce(&Arc<GameState>),
    {
        // 先把槽位克隆出来，避免在持有 DashMap 分片锁的时候等待写锁
        let slot = self.slot(game_id).ok_or(GameError::GameNotFound(game_id))?;
        let _guard = slot.write.lock();

        let current = slot.current();
        let next = Arc::new(transition(&current)?);
        *slot.state.write() = next.clone();
        on_commit(&next);
        Ok(next)
    }

    /// 持有写锁读取当前状态
    ///
    /// 闭包执行期间这局游戏不会有新的转换提交，用于让“读当前状态”和
    /// 之后的广播排在同一个顺序里（例如新订阅者先收到当前快照，再收到后续更新）。
    pub fn with_current<R>(&self, game_id: GameId, f: impl FnOnce(&Arc<GameState>) -> R) -> Result<R, GameError> {
        let slot = self.slot(game_id).ok_or(GameError::GameNotFound(game_id))?;
        let _guard = slot.write.lock();
        Ok(f(&slot.current()))
    }

    fn slot(&self, game_id: GameId) -> Option<Arc<GameSlot>> {
        self.games.get(&game_id).map(|entry| entry.value().clone())
    }
}
