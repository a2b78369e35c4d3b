//! 断线重连与持久化
//!
//! - 为玩家签发短期有效的重连令牌。
//! - 把游戏状态写成带单调递增版本号的快照。
//! - 玩家重连时校验令牌，必要时从快照把游戏恢复到内存存储。
//!
//! 持久化失败只报告给调用者，内存中的权威状态不受影响，牌局照常进行。

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use heads_up_core::{ErrorKind, GameId, GameState, GameStore, PlayerId};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

// --- 数据结构 ---

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReconnectionToken {
    pub token: String,
    pub player_id: PlayerId,
    pub expires_at: DateTime<Utc>,
    pub game_id: GameId,
}

impl ReconnectionToken {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSnapshot {
    pub game_id: GameId,
    pub game_state: GameState,
    pub version: u64,
    pub persisted_at: DateTime<Utc>,
}

/// `persist_game` 的返回值
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PersistReceipt {
    pub persisted_at: DateTime<Utc>,
    pub version: u64,
    pub game_id: GameId,
}

// --- 错误 ---

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("读写快照失败: {0}")]
    Io(#[from] io::Error),
    #[error("快照格式错误: {0}")]
    Format(#[from] serde_json::Error),
    #[error("持久化存储不可用: {0}")]
    Unavailable(String),
}

impl PersistenceError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Persistence
    }
}

#[derive(Debug, Error)]
pub enum ReconnectError {
    #[error("重连令牌无效")]
    InvalidToken,
    #[error("重连令牌已于 {0} 过期")]
    Expired(DateTime<Utc>),
    #[error("游戏 {0} 不存在")]
    GameNotFound(GameId),
    #[error("玩家 {0} 不在这局游戏中")]
    PlayerNotFound(PlayerId),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl ReconnectError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReconnectError::InvalidToken => ErrorKind::Authorization,
            ReconnectError::Expired(_) => ErrorKind::Expired,
            ReconnectError::GameNotFound(_) | ReconnectError::PlayerNotFound(_) => ErrorKind::NotFound,
            ReconnectError::Persistence(e) => e.kind(),
        }
    }
}

// --- 存储后端 ---

/// 快照和令牌的持久化后端
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// 某局游戏最新的快照
    async fn latest(&self, game_id: GameId) -> Result<Option<PersistedSnapshot>, PersistenceError>;

    async fn save(&self, snapshot: &PersistedSnapshot) -> Result<(), PersistenceError>;

    async fn put_token(&self, token: &ReconnectionToken) -> Result<(), PersistenceError>;

    async fn get_token(&self, game_id: GameId, token: &str) -> Result<Option<ReconnectionToken>, PersistenceError>;

    /// 删除某局游戏的所有快照和令牌
    async fn delete_game(&self, game_id: GameId) -> Result<(), PersistenceError>;
}

/// 进程内存储，没有配置快照目录时使用，测试也用它
#[derive(Default)]
pub struct MemorySnapshotStore {
    snapshots: DashMap<GameId, PersistedSnapshot>,
    tokens: DashMap<String, ReconnectionToken>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn latest(&self, game_id: GameId) -> Result<Option<PersistedSnapshot>, PersistenceError> {
        Ok(self.snapshots.get(&game_id).map(|s| s.value().clone()))
    }

    async fn save(&self, snapshot: &PersistedSnapshot) -> Result<(), PersistenceError> {
        self.snapshots.insert(snapshot.game_id, snapshot.clone());
        Ok(())
    }

    async fn put_token(&self, token: &ReconnectionToken) -> Result<(), PersistenceError> {
        self.tokens.insert(token.token.clone(), token.clone());
        Ok(())
    }

    async fn get_token(&self, game_id: GameId, token: &str) -> Result<Option<ReconnectionToken>, PersistenceError> {
        Ok(self.tokens.get(token).map(|t| t.value().clone()).filter(|t| t.game_id == game_id))
    }

    async fn delete_game(&self, game_id: GameId) -> Result<(), PersistenceError> {
        self.snapshots.remove(&game_id);
        self.tokens.retain(|_, token| token.game_id != game_id);
        Ok(())
    }
}

/// 把快照和令牌写成 JSON 文件
///
/// 目录结构：
/// - `<root>/games/<game_id>.json` 最新快照
/// - `<root>/tokens/<game_id>/<token>.json`
pub struct FileSnapshotStore {
    root: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FileSnapshotStore { root: root.into() }
    }

    fn game_path(&self, game_id: GameId) -> PathBuf {
        self.root.join("games").join(format!("{game_id}.json"))
    }

    fn token_dir(&self, game_id: GameId) -> PathBuf {
        self.root.join("tokens").join(game_id.to_string())
    }
}

/// 先写临时文件再改名，读者永远看不到写了一半的快照
async fn write_atomically(path: PathBuf, contents: Vec<u8>) -> Result<(), PersistenceError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, contents).await?;
    tokio::fs::rename(&tmp, &path).await?;
    Ok(())
}

async fn read_optional(path: PathBuf) -> Result<Option<Vec<u8>>, PersistenceError> {
    match tokio::fs::read(&path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn latest(&self, game_id: GameId) -> Result<Option<PersistedSnapshot>, PersistenceError> {
        match read_optional(self.game_path(game_id)).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, snapshot: &PersistedSnapshot) -> Result<(), PersistenceError> {
        write_atomically(self.game_path(snapshot.game_id), serde_json::to_vec(snapshot)?).await
    }

    async fn put_token(&self, token: &ReconnectionToken) -> Result<(), PersistenceError> {
        let path = self.token_dir(token.game_id).join(format!("{}.json", token.token));
        write_atomically(path, serde_json::to_vec(token)?).await
    }

    async fn get_token(&self, game_id: GameId, token: &str) -> Result<Option<ReconnectionToken>, PersistenceError> {
        // 令牌是十六进制字符串，其它字符一律当作不存在，避免拼出目录外的路径
        if token.is_empty() || !token.chars().all(|c| c.is_ascii_hexdigit()) {
            return Ok(None);
        }
        match read_optional(self.token_dir(game_id).join(format!("{token}.json"))).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn delete_game(&self, game_id: GameId) -> Result<(), PersistenceError> {
        match tokio::fs::remove_file(self.game_path(game_id)).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        match tokio::fs::remove_dir_all(self.token_dir(game_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// --- 重连服务 ---

pub struct ReconnectionService {
    snapshots: Arc<dyn SnapshotStore>,
    games: Arc<GameStore>,
    token_ttl: TimeDelta,
    // 每局游戏的持久化锁，和游戏存储的写锁相互独立
    persist_locks: DashMap<GameId, Arc<Mutex<()>>>,
}

impl ReconnectionService {
    pub fn new(snapshots: Arc<dyn SnapshotStore>, games: Arc<GameStore>, token_ttl: Duration) -> Self {
        // 上限一年，超出 TimeDelta 表示范围的配置按一年处理
        let ttl = token_ttl.min(Duration::from_secs(365 * 24 * 60 * 60));
        ReconnectionService {
            snapshots,
            games,
            token_ttl: TimeDelta::from_std(ttl).unwrap_or_default(),
            persist_locks: DashMap::new(),
        }
    }

    /// 生成一个不可猜测的令牌：32 字节随机数的十六进制
    pub fn generate_token(&self, game_id: GameId, player_id: PlayerId) -> ReconnectionToken {
        let bytes: [u8; 32] = rand::random();
        ReconnectionToken {
            token: hex::encode(bytes),
            player_id,
            expires_at: Utc::now() + self.token_ttl,
            game_id,
        }
    }

    pub async fn store_token(&self, token: &ReconnectionToken) -> Result<(), PersistenceError> {
        self.snapshots.put_token(token).await
    }

    /// 为一个确实在这局游戏中的玩家签发并保存令牌
    pub async fn issue_token(&self, game_id: GameId, player_id: PlayerId) -> Result<ReconnectionToken, ReconnectError> {
        let state = self.games.get(game_id).ok_or(ReconnectError::GameNotFound(game_id))?;
        if state.player_index(player_id).is_none() {
            return Err(ReconnectError::PlayerNotFound(player_id));
        }
        let token = self.generate_token(game_id, player_id);
        self.store_token(&token).await?;
        debug!(%game_id, %player_id, expires_at = %token.expires_at, "签发重连令牌");
        Ok(token)
    }

    /// 校验令牌并返回这局游戏的权威状态
    ///
    /// 内存中已经没有这局游戏时，从最新的快照恢复到游戏存储。
    pub async fn handle_reconnection(
        &self,
        game_id: GameId,
        player_id: PlayerId,
        token: &str,
    ) -> Result<Arc<GameState>, ReconnectError> {
        let result = self.validate_and_load(game_id, player_id, token).await;
        match &result {
            Ok(_) => info!(%game_id, %player_id, "玩家重连成功"),
            Err(e) => info!(%game_id, %player_id, "玩家重连失败: {}", e),
        }
        result
    }

    async fn validate_and_load(
        &self,
        game_id: GameId,
        player_id: PlayerId,
        token: &str,
    ) -> Result<Arc<GameState>, ReconnectError> {
        let stored = self.snapshots.get_token(game_id, token).await?.ok_or(ReconnectError::InvalidToken)?;
        if stored.game_id != game_id || stored.player_id != player_id {
            return Err(ReconnectError::InvalidToken);
        }
        if stored.is_expired_at(Utc::now()) {
            return Err(ReconnectError::Expired(stored.expires_at));
        }

        let state = match self.games.get(game_id) {
            Some(state) => state,
            None => {
                let restored = self.restore_game(game_id).await?.ok_or(ReconnectError::GameNotFound(game_id))?;
                self.games.restore(restored)
            }
        };
        if state.player_index(player_id).is_none() {
            return Err(ReconnectError::PlayerNotFound(player_id));
        }
        Ok(state)
    }

    /// 写入一个新快照，版本号为上一个版本加一（从 1 开始）
    pub async fn persist_game(&self, game_id: GameId, state: &GameState) -> Result<PersistReceipt, PersistenceError> {
        let lock = self.persist_lock(game_id);
        let _guard = lock.lock().await;
        self.write_snapshot(game_id, state).await
    }

    /// 在持久化锁内读取内存中最新的状态再写入
    ///
    /// 后台任务完成的先后顺序不确定，每次都写当时最新的状态，
    /// 这样版本号越大的快照内容也越新。
    pub async fn persist_latest(&self, game_id: GameId) -> Result<PersistReceipt, ReconnectError> {
        let lock = self.persist_lock(game_id);
        let _guard = lock.lock().await;
        let state = self.games.get(game_id).ok_or(ReconnectError::GameNotFound(game_id))?;
        Ok(self.write_snapshot(game_id, &state).await?)
    }

    async fn write_snapshot(&self, game_id: GameId, state: &GameState) -> Result<PersistReceipt, PersistenceError> {
        let previous = self.snapshots.latest(game_id).await?;
        let version = previous.as_ref().map_or(0, |s| s.version) + 1;
        // 时间戳不回退
        let persisted_at = previous.map_or_else(Utc::now, |s| s.persisted_at.max(Utc::now()));

        let snapshot = PersistedSnapshot { game_id, game_state: state.clone(), version, persisted_at };
        match self.snapshots.save(&snapshot).await {
            Ok(()) => {
                debug!(%game_id, version, "游戏快照已保存");
                Ok(PersistReceipt { persisted_at, version, game_id })
            }
            Err(e) => {
                warn!(%game_id, version, "保存游戏快照失败: {}", e);
                Err(e)
            }
        }
    }

    pub async fn restore_game(&self, game_id: GameId) -> Result<Option<GameState>, PersistenceError> {
        Ok(self.snapshots.latest(game_id).await?.map(|s| s.game_state))
    }

    pub async fn cleanup_game(&self, game_id: GameId) -> Result<(), PersistenceError> {
        let lock = self.persist_lock(game_id);
        {
            let _guard = lock.lock().await;
            self.snapshots.delete_game(game_id).await?;
        }
        self.persist_locks.remove(&game_id);
        debug!(%game_id, "已删除游戏的快照和令牌");
        Ok(())
    }

    fn persist_lock(&self, game_id: GameId) -> Arc<Mutex<()>> {
        self.persist_locks.entry(game_id).or_default().value().clone()
    }
}
