use heads_up_core::{GamePhase, PlayerAction, ServerEvent, create_game, execute_player_action};
use heads_up_server::api::AppState;
use heads_up_server::broadcaster::Broadcaster;
use heads_up_server::config::ServerConfig;
use heads_up_server::reconnect::MemorySnapshotStore;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

fn parse(payload: &str) -> Value {
    serde_json::from_str(payload).unwrap()
}

#[tokio::test]
async fn every_subscriber_gets_the_same_payload() {
    let broadcaster = Broadcaster::new(8);
    let game_id = Uuid::new_v4();
    let mut a = broadcaster.subscribe(game_id, Uuid::new_v4());
    let mut b = broadcaster.subscribe(game_id, Uuid::new_v4());
    let mut other_game = broadcaster.subscribe(Uuid::new_v4(), Uuid::new_v4());

    assert_eq!(broadcaster.broadcast(game_id, &ServerEvent::keep_alive()), 2);

    let from_a = a.receiver.recv().await.unwrap();
    let from_b = b.receiver.recv().await.unwrap();
    assert_eq!(from_a, from_b);
    assert_eq!(parse(&from_a)["type"], "keepAlive");
    assert!(other_game.receiver.try_recv().is_err());
}

#[tokio::test]
async fn closed_subscriber_is_removed_without_affecting_others() {
    let broadcaster = Broadcaster::new(8);
    let game_id = Uuid::new_v4();
    let gone = broadcaster.subscribe(game_id, Uuid::new_v4());
    let mut alive = broadcaster.subscribe(game_id, Uuid::new_v4());
    drop(gone);

    assert_eq!(broadcaster.broadcast(game_id, &ServerEvent::keep_alive()), 1);
    assert_eq!(broadcaster.connection_count(game_id), 1);
    assert!(alive.receiver.recv().await.is_some());
}

#[tokio::test]
async fn full_subscriber_is_treated_as_failed() {
    let broadcaster = Broadcaster::new(1);
    let game_id = Uuid::new_v4();
    let _slow = broadcaster.subscribe(game_id, Uuid::new_v4());
    let mut fast = broadcaster.subscribe(game_id, Uuid::new_v4());

    assert_eq!(broadcaster.broadcast(game_id, &ServerEvent::keep_alive()), 2);
    fast.receiver.recv().await.unwrap();
    // slow 的队列还满着，这一次投递失败并被移除
    assert_eq!(broadcaster.broadcast(game_id, &ServerEvent::keep_alive()), 1);
    assert_eq!(broadcaster.connection_count(game_id), 1);
}

#[tokio::test]
async fn send_to_reaches_only_one_connection() {
    let broadcaster = Broadcaster::new(4);
    let game_id = Uuid::new_v4();
    let mut a = broadcaster.subscribe(game_id, Uuid::new_v4());
    let mut b = broadcaster.subscribe(game_id, Uuid::new_v4());

    assert!(broadcaster.send_to(game_id, a.connection_id, &ServerEvent::connected(a.connection_id, game_id)));
    let event = parse(&a.receiver.recv().await.unwrap());
    assert_eq!(event["type"], "connected");
    assert_eq!(event["connectionId"], serde_json::json!(a.connection_id));
    assert!(b.receiver.try_recv().is_err());
    assert!(!broadcaster.send_to(game_id, Uuid::new_v4(), &ServerEvent::keep_alive()));
}

#[tokio::test]
async fn reaped_connection_sees_end_of_stream() {
    let broadcaster = Broadcaster::new(4);
    let game_id = Uuid::new_v4();
    let mut sub = broadcaster.subscribe(game_id, Uuid::new_v4());

    let reaped = broadcaster.reap_idle(std::time::Duration::ZERO);
    assert_eq!(reaped, vec![(game_id, sub.connection_id)]);
    assert!(sub.receiver.recv().await.is_none());
}

#[tokio::test]
async fn committed_mutations_are_broadcast_in_order() {
    let config = ServerConfig { persist_on_update: false, ..ServerConfig::default() };
    let state = AppState::new(config, Arc::new(MemorySnapshotStore::new()));
    let game = create_game(Uuid::new_v4(), ["alice", "bob"]);
    let game_id = game.game_id;
    state.games.insert(game).unwrap();
    let mut sub = state.broadcaster.subscribe(game_id, Uuid::new_v4());

    let dealt = state.deal(game_id).unwrap();
    let dealer = dealt.players[dealt.dealer_index].id;
    let bb = dealt.players[(dealt.dealer_index + 1) % 2].id;
    state.apply(game_id, |s| execute_player_action(s, dealer, PlayerAction::Call)).unwrap();
    // 被拒绝的操作不广播
    assert!(state.deal(game_id).is_err());
    state.apply(game_id, |s| execute_player_action(s, bb, PlayerAction::Call)).unwrap();

    let mut phases = vec![];
    let mut pots = vec![];
    while let Ok(payload) = sub.receiver.try_recv() {
        let event = parse(&payload);
        assert_eq!(event["type"], "gameStateUpdate");
        assert!(event["data"].get("deck").is_none());
        assert!(event["data"]["players"][0]["holeCards"].as_array().unwrap().is_empty());
        phases.push(event["data"]["phase"].as_str().unwrap().to_string());
        pots.push(event["data"]["pot"].as_u64().unwrap());
    }
    assert_eq!(phases, vec!["preflop", "preflop", "flop"]);
    assert_eq!(pots, vec![30, 40, 40]);
    assert_eq!(state.games.get(game_id).unwrap().phase, GamePhase::Flop);
}

#[tokio::test]
async fn joining_queues_current_snapshot_before_later_updates() {
    let config = ServerConfig { persist_on_update: false, ..ServerConfig::default() };
    let state = AppState::new(config, Arc::new(MemorySnapshotStore::new()));
    let game = create_game(Uuid::new_v4(), ["alice", "bob"]);
    let game_id = game.game_id;
    state.games.insert(game).unwrap();
    let dealt = state.deal(game_id).unwrap();
    let dealer = dealt.players[dealt.dealer_index].id;

    let connection_id = Uuid::new_v4();
    let mut sub = state.join(game_id, connection_id).unwrap();
    assert_eq!(state.broadcaster.connection_count(game_id), 1);
    state.apply(game_id, |s| execute_player_action(s, dealer, PlayerAction::Call)).unwrap();

    let connected = parse(&sub.receiver.try_recv().unwrap());
    assert_eq!(connected["type"], "connected");
    assert_eq!(connected["connectionId"], connection_id.to_string());

    let pots: Vec<u64> = std::iter::from_fn(|| sub.receiver.try_recv().ok())
        .map(|payload| parse(&payload)["data"]["pot"].as_u64().unwrap())
        .collect();
    assert_eq!(pots, vec![30, 40]);

    assert!(state.join(Uuid::new_v4(), Uuid::new_v4()).is_err());
}
