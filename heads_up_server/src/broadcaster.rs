//! 事件广播器
//!
//! 按游戏 id 维护订阅者集合，把同一份序列化好的事件推送给所有订阅者。
//! 这里不包含任何游戏逻辑，只负责扇出。

use dashmap::DashMap;
use heads_up_core::{ConnectionId, GameId, ServerEvent};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// 发给订阅者的已序列化消息，所有订阅者共享同一份
pub type Payload = Arc<str>;

pub struct Broadcaster {
    games: DashMap<GameId, HashMap<ConnectionId, Subscriber>>,
    buffer: usize,
}

// 单个订阅连接
struct Subscriber {
    // 用于向该连接的 WebSocket 任务发送消息的通道
    sender: mpsc::Sender<Payload>,
    last_activity: Instant,
}

/// `subscribe` 的返回值，持有者负责把 `receiver` 里的消息写到传输层
pub struct Subscription {
    pub connection_id: ConnectionId,
    pub game_id: GameId,
    pub receiver: mpsc::Receiver<Payload>,
}

impl Broadcaster {
    /// `buffer` 是每个订阅者发送队列的长度
    pub fn new(buffer: usize) -> Self {
        Broadcaster { games: DashMap::new(), buffer: buffer.max(1) }
    }

    /// 订阅一局游戏；同一个连接 id 重复订阅会替换旧的通道
    pub fn subscribe(&self, game_id: GameId, connection_id: ConnectionId) -> Subscription {
        let (sender, receiver) = mpsc::channel(self.buffer);
        let mut subscribers = self.games.entry(game_id).or_default();
        subscribers.insert(connection_id, Subscriber { sender, last_activity: Instant::now() });
        info!(%game_id, %connection_id, count = subscribers.len(), "新的订阅者");
        Subscription { connection_id, game_id, receiver }
    }

    /// 取消订阅，返回该连接之前是否存在
    pub fn unsubscribe(&self, game_id: GameId, connection_id: ConnectionId) -> bool {
        let removed = match self.games.get_mut(&game_id) {
            Some(mut subscribers) => {
                let removed = subscribers.remove(&connection_id).is_some();
                if removed {
                    info!(%game_id, %connection_id, count = subscribers.len(), "订阅者离开");
                }
                removed
            }
            None => false,
        };
        self.games.remove_if(&game_id, |_, subscribers| subscribers.is_empty());
        removed
    }

    /// 把事件推送给这局游戏的所有订阅者，返回成功投递的数量
    ///
    /// 尽力而为：某个通道写入失败（已关闭或队列已满）只会移除该通道，
    /// 不影响其他订阅者，也不会把错误返回给调用者。这个函数从不等待，
    /// 可以在持有游戏写锁时调用。
    pub fn broadcast(&self, game_id: GameId, event: &ServerEvent) -> usize {
        let payload = match serde_json::to_string(event) {
            Ok(json) => Payload::from(json),
            Err(e) => {
                warn!(%game_id, "序列化广播事件失败: {}", e);
                return 0;
            }
        };

        let Some(mut subscribers) = self.games.get_mut(&game_id) else {
            return 0;
        };
        let before = subscribers.len();
        subscribers.retain(|connection_id, subscriber| match subscriber.sender.try_send(payload.clone()) {
            Ok(()) => true,
            Err(e) => {
                warn!(%game_id, %connection_id, "向订阅者投递失败，移除该连接: {}", e);
                false
            }
        });
        let delivered = subscribers.len();
        debug!(%game_id, delivered, dropped = before - delivered, "广播完成");
        drop(subscribers);

        self.games.remove_if(&game_id, |_, subscribers| subscribers.is_empty());
        delivered
    }

    /// 只发给一个连接（连接成功通知、错误回执等），失败时同样移除该连接
    pub fn send_to(&self, game_id: GameId, connection_id: ConnectionId, event: &ServerEvent) -> bool {
        let payload = match serde_json::to_string(event) {
            Ok(json) => Payload::from(json),
            Err(e) => {
                warn!(%game_id, "序列化事件失败: {}", e);
                return false;
            }
        };

        let sent = match self.games.get_mut(&game_id) {
            Some(mut subscribers) => {
                let outcome = subscribers.get(&connection_id).map(|s| s.sender.try_send(payload));
                match outcome {
                    Some(Ok(())) => true,
                    Some(Err(e)) => {
                        warn!(%game_id, %connection_id, "向订阅者发送失败，移除该连接: {}", e);
                        subscribers.remove(&connection_id);
                        false
                    }
                    None => false,
                }
            }
            None => false,
        };
        self.games.remove_if(&game_id, |_, subscribers| subscribers.is_empty());
        sent
    }

    pub fn connection_count(&self, game_id: GameId) -> usize {
        self.games.get(&game_id).map_or(0, |subscribers| subscribers.len())
    }

    /// 收到客户端消息或 pong 时刷新活动时间
    pub fn touch(&self, game_id: GameId, connection_id: ConnectionId) {
        if let Some(mut subscribers) = self.games.get_mut(&game_id) {
            if let Some(subscriber) = subscribers.get_mut(&connection_id) {
                subscriber.last_activity = Instant::now();
            }
        }
    }

    /// 移除所有超过 `idle_timeout` 没有活动的连接
    ///
    /// 被移除连接的发送端随之关闭，对应的 WebSocket 任务会读到通道结束并退出。
    pub fn reap_idle(&self, idle_timeout: Duration) -> Vec<(GameId, ConnectionId)> {
        let mut reaped = vec![];
        for mut entry in self.games.iter_mut() {
            let game_id = *entry.key();
            entry.value_mut().retain(|connection_id, subscriber| {
                let idle = subscriber.last_activity.elapsed() >= idle_timeout;
                if idle {
                    reaped.push((game_id, *connection_id));
                }
                !idle
            });
        }
        self.games.retain(|_, subscribers| !subscribers.is_empty());

        for (game_id, connection_id) in &reaped {
            info!(%game_id, %connection_id, "清理空闲连接");
        }
        reaped
    }

    /// 游戏被删除时断开它的所有订阅者
    pub fn close_game(&self, game_id: GameId) -> usize {
        self.games.remove(&game_id).map_or(0, |(_, subscribers)| subscribers.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_subscribe_and_unsubscribe() {
        let broadcaster = Broadcaster::new(4);
        let game_id = Uuid::new_v4();

        let a = broadcaster.subscribe(game_id, Uuid::new_v4());
        let b = broadcaster.subscribe(game_id, Uuid::new_v4());
        assert_ne!(a.connection_id, b.connection_id);
        assert_eq!(broadcaster.connection_count(game_id), 2);

        assert!(broadcaster.unsubscribe(game_id, a.connection_id));
        assert!(!broadcaster.unsubscribe(game_id, a.connection_id));
        assert_eq!(broadcaster.connection_count(game_id), 1);

        broadcaster.unsubscribe(game_id, b.connection_id);
        assert_eq!(broadcaster.connection_count(game_id), 0);
        assert!(broadcaster.games.is_empty());
    }

    #[test]
    fn test_broadcast_to_unknown_game() {
        let broadcaster = Broadcaster::new(4);
        assert_eq!(broadcaster.broadcast(Uuid::new_v4(), &ServerEvent::keep_alive()), 0);
    }

    #[test]
    fn test_reap_idle() {
        let broadcaster = Broadcaster::new(4);
        let game_id = Uuid::new_v4();
        let sub = broadcaster.subscribe(game_id, Uuid::new_v4());

        assert!(broadcaster.reap_idle(Duration::from_secs(60)).is_empty());
        assert_eq!(broadcaster.reap_idle(Duration::ZERO), vec![(game_id, sub.connection_id)]);
        assert_eq!(broadcaster.connection_count(game_id), 0);
    }
}
