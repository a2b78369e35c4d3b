use async_trait::async_trait;
use heads_up_core::{ErrorKind, GameId, GamePhase, GameState, GameStore, create_game, deal_new_hand};
use heads_up_server::reconnect::{
    FileSnapshotStore, MemorySnapshotStore, PersistedSnapshot, PersistenceError, ReconnectError, ReconnectionService,
    ReconnectionToken, SnapshotStore,
};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

const TTL: Duration = Duration::from_secs(30 * 60);

fn setup(store: Arc<dyn SnapshotStore>, ttl: Duration) -> (ReconnectionService, Arc<GameStore>, GameState) {
    let games = Arc::new(GameStore::new());
    let game = deal_new_hand(&create_game(Uuid::new_v4(), ["alice", "bob"]), 11).unwrap();
    games.insert(game.clone()).unwrap();
    (ReconnectionService::new(store, games.clone(), ttl), games, game)
}

/// 永远写入失败的后端
struct BrokenStore;

#[async_trait]
impl SnapshotStore for BrokenStore {
    async fn latest(&self, _: GameId) -> Result<Option<PersistedSnapshot>, PersistenceError> {
        Ok(None)
    }
    async fn save(&self, _: &PersistedSnapshot) -> Result<(), PersistenceError> {
        Err(PersistenceError::Unavailable("磁盘已满".to_string()))
    }
    async fn put_token(&self, _: &ReconnectionToken) -> Result<(), PersistenceError> {
        Err(PersistenceError::Unavailable("磁盘已满".to_string()))
    }
    async fn get_token(&self, _: GameId, _: &str) -> Result<Option<ReconnectionToken>, PersistenceError> {
        Ok(None)
    }
    async fn delete_game(&self, _: GameId) -> Result<(), PersistenceError> {
        Ok(())
    }
}

#[tokio::test]
async fn valid_token_returns_live_state() {
    let (service, _, game) = setup(Arc::new(MemorySnapshotStore::new()), TTL);
    let player = game.players[0].id;
    let token = service.issue_token(game.game_id, player).await.unwrap();

    let state = service.handle_reconnection(game.game_id, player, &token.token).await.unwrap();
    assert_eq!(*state, game);
}

#[tokio::test]
async fn expired_token_is_rejected() {
    let (service, _, game) = setup(Arc::new(MemorySnapshotStore::new()), Duration::ZERO);
    let player = game.players[1].id;
    let token = service.issue_token(game.game_id, player).await.unwrap();

    let err = service.handle_reconnection(game.game_id, player, &token.token).await.unwrap_err();
    assert!(matches!(err, ReconnectError::Expired(_)));
    assert_eq!(err.kind(), ErrorKind::Expired);
}

#[tokio::test]
async fn token_for_another_player_is_rejected() {
    let (service, _, game) = setup(Arc::new(MemorySnapshotStore::new()), TTL);
    let token = service.issue_token(game.game_id, game.players[0].id).await.unwrap();

    let err = service.handle_reconnection(game.game_id, game.players[1].id, &token.token).await.unwrap_err();
    assert!(matches!(err, ReconnectError::InvalidToken));
    assert_eq!(err.kind(), ErrorKind::Authorization);

    // 令牌和游戏也必须对应
    let err = service.handle_reconnection(Uuid::new_v4(), game.players[0].id, &token.token).await.unwrap_err();
    assert!(matches!(err, ReconnectError::InvalidToken));
}

#[tokio::test]
async fn persist_twice_yields_increasing_versions() {
    let (service, _, game) = setup(Arc::new(MemorySnapshotStore::new()), TTL);

    let first = service.persist_game(game.game_id, &game).await.unwrap();
    let second = service.persist_game(game.game_id, &game).await.unwrap();
    assert_eq!(first.version, 1);
    assert_eq!(second.version, 2);
    assert!(second.persisted_at >= first.persisted_at);
    assert_eq!(second.game_id, game.game_id);
}

#[tokio::test]
async fn concurrent_persists_get_distinct_versions() {
    let (service, _, game) = setup(Arc::new(MemorySnapshotStore::new()), TTL);
    let service = Arc::new(service);

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let service = service.clone();
            let game_id = game.game_id;
            tokio::spawn(async move { service.persist_latest(game_id).await.unwrap().version })
        })
        .collect();
    let mut versions = vec![];
    for task in tasks {
        versions.push(task.await.unwrap());
    }
    versions.sort();
    assert_eq!(versions, (1..=8).collect::<Vec<u64>>());
}

#[tokio::test]
async fn reconnect_restores_evicted_game_from_snapshot() {
    let (service, games, game) = setup(Arc::new(MemorySnapshotStore::new()), TTL);
    let player = game.players[0].id;
    let token = service.issue_token(game.game_id, player).await.unwrap();
    service.persist_game(game.game_id, &game).await.unwrap();

    games.remove(game.game_id);
    let state = service.handle_reconnection(game.game_id, player, &token.token).await.unwrap();
    assert_eq!(*state, game);
    assert_eq!(games.get(game.game_id).unwrap().phase, GamePhase::Preflop);
}

#[tokio::test]
async fn reconnect_without_any_copy_is_not_found() {
    let (service, games, game) = setup(Arc::new(MemorySnapshotStore::new()), TTL);
    let player = game.players[0].id;
    let token = service.issue_token(game.game_id, player).await.unwrap();

    games.remove(game.game_id);
    let err = service.handle_reconnection(game.game_id, player, &token.token).await.unwrap_err();
    assert!(matches!(err, ReconnectError::GameNotFound(id) if id == game.game_id));
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn failed_persist_leaves_game_untouched() {
    let (service, games, game) = setup(Arc::new(BrokenStore), TTL);

    let err = service.persist_game(game.game_id, &game).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Persistence);
    assert_eq!(*games.get(game.game_id).unwrap(), game);

    let err = service.issue_token(game.game_id, game.players[0].id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Persistence);
    assert_eq!(service.restore_game(game.game_id).await.unwrap(), None);
}

#[tokio::test]
async fn file_store_survives_a_new_service() {
    let dir = std::env::temp_dir().join(format!("heads-up-snapshots-{}", Uuid::new_v4()));
    let (service, _, game) = setup(Arc::new(FileSnapshotStore::new(&dir)), TTL);
    let player = game.players[1].id;
    let token = service.issue_token(game.game_id, player).await.unwrap();
    service.persist_game(game.game_id, &game).await.unwrap();
    let receipt = service.persist_game(game.game_id, &game).await.unwrap();
    assert_eq!(receipt.version, 2);

    // 模拟进程重启：新的内存存储，同一个目录
    let games = Arc::new(GameStore::new());
    let restarted = ReconnectionService::new(Arc::new(FileSnapshotStore::new(&dir)), games.clone(), TTL);
    let state = restarted.handle_reconnection(game.game_id, player, &token.token).await.unwrap();
    assert_eq!(*state, game);
    assert_eq!(restarted.persist_game(game.game_id, &game).await.unwrap().version, 3);

    restarted.cleanup_game(game.game_id).await.unwrap();
    assert_eq!(restarted.restore_game(game.game_id).await.unwrap(), None);
    assert!(matches!(
        restarted.handle_reconnection(game.game_id, player, &token.token).await,
        Err(ReconnectError::InvalidToken)
    ));
    let _ = tokio::fs::remove_dir_all(&dir).await;
}

#[tokio::test]
async fn committed_mutation_is_persisted_in_background() {
    use heads_up_server::api::AppState;
    use heads_up_server::config::ServerConfig;

    let state = AppState::new(ServerConfig::default(), Arc::new(MemorySnapshotStore::new()));
    let game_id = Uuid::new_v4();
    state.games.insert(create_game(game_id, ["alice", "bob"])).unwrap();
    state.deal(game_id).unwrap();

    let mut restored = None;
    for _ in 0..100 {
        restored = state.reconnect.restore_game(game_id).await.unwrap();
        if restored.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let restored = restored.expect("后台持久化应当写入快照");
    assert_eq!(restored.phase, GamePhase::Preflop);
    assert_eq!(restored, *state.games.get(game_id).unwrap());
}
