use super::{ApiError, AppState};
use axum::{
    extract::{
        Path, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, stream::StreamExt};
use heads_up_core::{ClientMessage, ConnectionId, ErrorKind, GameError, GameId, ServerEvent, execute_player_action};
use tracing::{debug, info};
use uuid::Uuid;

/// 处理 WebSocket 连接请求，游戏不存在时直接返回 404，不升级连接
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Path(game_id): Path<GameId>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.games.contains(game_id) {
        return Err(GameError::GameNotFound(game_id).into());
    }
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, game_id)))
}

/// 处理单个 WebSocket 连接的生命周期
///
/// 写方向由一个独立任务负责：转发广播器通道里的消息，并定时发送 keepAlive 和 ping。
/// 读方向在当前任务里处理客户端指令。任意一个方向结束，连接就被取消订阅。
async fn handle_socket(mut socket: WebSocket, state: AppState, game_id: GameId) {
    // 升级期间游戏可能已经被删除
    let subscription = match state.join(game_id, Uuid::new_v4()) {
        Ok(subscription) => subscription,
        Err(e) => {
            debug!(%game_id, "无法加入游戏: {}", e);
            let _ = socket.close().await;
            return;
        }
    };
    let connection_id = subscription.connection_id;
    let mut outbound = subscription.receiver;
    let (mut sender, mut receiver) = socket.split();

    // 启动一个新任务，专门负责将通道中的消息发送到 WebSocket
    let keepalive = state.config.keepalive;
    let mut writer = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(keepalive);
        // 第一次 tick 立即完成，跳过
        ticker.tick().await;
        loop {
            tokio::select! {
                payload = outbound.recv() => {
                    // 通道关闭说明连接已被取消订阅或被清理
                    let Some(payload) = payload else { break };
                    if sender.send(Message::Text(payload.to_string().into())).await.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let Ok(json) = serde_json::to_string(&ServerEvent::keep_alive()) else { continue };
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                    if sender.send(Message::Ping(Default::default())).await.is_err() {
                        break;
                    }
                }
            }
        }
        let _ = sender.close().await;
    });

    // 主循环，处理从客户端接收到的消息
    loop {
        tokio::select! {
            frame = receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    state.broadcaster.touch(game_id, connection_id);
                    handle_client_message(&state, game_id, connection_id, text.as_str());
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                // pong、ping 和二进制消息都算活动
                Some(Ok(_)) => state.broadcaster.touch(game_id, connection_id),
            },
            _ = &mut writer => break,
        }
    }

    // 客户端断开连接，执行清理工作
    state.broadcaster.unsubscribe(game_id, connection_id);
    writer.abort();
    info!(%game_id, %connection_id, "客户端连接关闭");
}

/// 核心消息处理逻辑
///
/// 成功的结果通过正常的广播到达所有订阅者，拒绝原因只发回给发送者。
fn handle_client_message(state: &AppState, game_id: GameId, connection_id: ConnectionId, text: &str) {
    let result = match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::Act(request)) => request
            .into_action()
            .and_then(|action| state.apply(game_id, |game| execute_player_action(game, request.player_id, action))),
        Ok(ClientMessage::Deal) => state.deal(game_id),
        Ok(ClientMessage::NextHand) => state.next_hand(game_id),
        Err(e) => {
            debug!(%game_id, %connection_id, "解析消息失败: {}", e);
            let event = ServerEvent::error(ErrorKind::Validation, format!("无法解析消息: {e}"));
            state.broadcaster.send_to(game_id, connection_id, &event);
            return;
        }
    };

    if let Err(e) = result {
        state.broadcaster.send_to(game_id, connection_id, &ServerEvent::from(&e));
    }
}
