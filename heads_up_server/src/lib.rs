//! # 单挑德州扑克服务器
//!
//! 在核心库外面加上事件广播、断线重连与持久化，以及 axum 的 HTTP/WebSocket 接口。

pub mod api;
pub mod broadcaster;
pub mod config;
pub mod logging;
pub mod reconnect;

use broadcaster::Broadcaster;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// 启动后台任务，定期清理超过 `idle_timeout` 没有活动的连接
pub fn spawn_idle_reaper(broadcaster: Arc<Broadcaster>, every: Duration, idle_timeout: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            broadcaster.reap_idle(idle_timeout);
        }
    })
}
