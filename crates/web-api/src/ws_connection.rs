use application::SessionHandle;
use axum::extract::ws::{Message as WsMessage, WebSocket};
use domain::UserId;
use futures_util::{SinkExt, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::state::AppState;

/// WebSocket 连接
///
/// 一个连接对应一个会话：
/// - 写任务独占 socket 的发送端，排空会话的出站队列
/// - 读循环逐帧交给分发器，回复经同一队列写回；只在两帧之间响应取消
/// - 断开时注销会话并记录最后在线时间
pub struct WebSocketConnection {
    socket: WebSocket,
    state: AppState,
    user_id: UserId,
}

impl WebSocketConnection {
    pub fn new(socket: WebSocket, state: AppState, user_id: UserId) -> Self {
        tracing::info!(user_id = %user_id, "WebSocket 连接已建立");
        Self {
            socket,
            state,
            user_id,
        }
    }

    /// 运行连接主循环，直到任一方向结束
    pub async fn run(self) {
        let Self {
            socket,
            state,
            user_id,
        } = self;
        let config = state.session_config.clone();

        let (handle, mut outbound) = SessionHandle::channel(user_id, config.outbound_buffer);
        let session_id = handle.id();
        state.sessions.register(handle.clone());

        let (mut sender, mut incoming) = socket.split();
        let cancel = CancellationToken::new();

        // 发送任务：统一处理所有对 WebSocket sender 的写操作
        let mut send_task = tokio::spawn(async move {
            while let Some(frame) = outbound.recv().await {
                let text = match frame.to_text() {
                    Ok(text) => text,
                    Err(err) => {
                        tracing::warn!(error = %err, method = %frame.method, "出站帧序列化失败");
                        continue;
                    }
                };
                if sender.send(WsMessage::Text(text.into())).await.is_err() {
                    tracing::warn!(user_id = %user_id, "WebSocket 写入失败");
                    break;
                }
            }
            let _ = sender.close().await;
            tracing::debug!(user_id = %user_id, "WebSocket 发送任务结束");
        });

        // 接收任务：逐帧分发，同一连接内按到达顺序处理
        let mut recv_task = {
            let dispatcher = state.dispatcher.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                loop {
                    // 已读到的帧总会处理完（落库与扇出），不会被中途取消
                    let next = tokio::select! {
                        _ = cancel.cancelled() => break,
                        next = incoming.next() => next,
                    };
                    let Some(Ok(message)) = next else {
                        break;
                    };
                    let text = match message {
                        WsMessage::Text(text) => text,
                        WsMessage::Close(_) => {
                            tracing::info!(user_id = %user_id, "WebSocket 收到关闭消息");
                            break;
                        }
                        WsMessage::Ping(_) | WsMessage::Pong(_) => continue,
                        WsMessage::Binary(_) => {
                            tracing::debug!(user_id = %user_id, "忽略二进制帧");
                            continue;
                        }
                    };

                    let Some(reply) = dispatcher.handle_text(user_id, text.as_str()).await else {
                        continue;
                    };
                    if let Err(err) = handle
                        .deliver(reply, config.write_timeout(), config.write_retries)
                        .await
                    {
                        tracing::warn!(user_id = %user_id, error = %err, "回复投递失败，关闭连接");
                        break;
                    }
                }
                tracing::debug!(user_id = %user_id, "WebSocket 接收任务结束");
            })
        };

        // 等待任意一个任务完成（连接断开）；读任务只通过取消令牌停止
        tokio::select! {
            _ = &mut send_task => {
                cancel.cancel();
                let _ = recv_task.await;
            }
            _ = &mut recv_task => send_task.abort(),
        }

        // 只注销自己的会话，不影响同一用户更新的连接
        state.sessions.unregister_session(user_id, session_id);
        if let Err(err) = state.chat_service.touch_last_online(user_id).await {
            tracing::error!(error = %err, user_id = %user_id, "记录最后在线时间失败");
        }

        tracing::info!(user_id = %user_id, session_id = %session_id, "WebSocket 连接已断开，会话已注销");
    }
}
