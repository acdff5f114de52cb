//! 会话注册表
//!
//! 维护 `UserId -> SessionHandle` 的映射。每个用户同一时刻只保留一个在线会话，
//! 新连接注册时覆盖旧条目（旧句柄返回给调用方，由其决定是否关闭）。

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use domain::UserId;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::SendTimeoutError};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::protocol::OutboundFrame;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeliveryError {
    /// 写端已关闭，连接已断开
    #[error("session closed")]
    Closed,
    /// 多次重试后出站队列仍然已满
    #[error("session outbound queue stalled after {attempts} attempts")]
    Stalled { attempts: u32 },
}

/// 一个在线连接的出站句柄
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: Uuid,
    user_id: UserId,
    tx: mpsc::Sender<OutboundFrame>,
}

impl SessionHandle {
    pub fn new(user_id: UserId, tx: mpsc::Sender<OutboundFrame>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            tx,
        }
    }

    /// 创建句柄以及对应的接收端，接收端交给连接的写任务消费
    pub fn channel(user_id: UserId, buffer: usize) -> (Self, mpsc::Receiver<OutboundFrame>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self::new(user_id, tx), rx)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// 有界投递：每次最多等待 `timeout`，队列满时再重试 `retries` 次
    pub async fn deliver(
        &self,
        frame: OutboundFrame,
        timeout: Duration,
        retries: u32,
    ) -> Result<(), DeliveryError> {
        let mut frame = frame;
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.tx.send_timeout(frame, timeout).await {
                Ok(()) => return Ok(()),
                Err(SendTimeoutError::Closed(_)) => return Err(DeliveryError::Closed),
                Err(SendTimeoutError::Timeout(returned)) => {
                    if attempts > retries {
                        return Err(DeliveryError::Stalled { attempts });
                    }
                    tracing::debug!(
                        user_id = %self.user_id,
                        session_id = %self.id,
                        attempts,
                        "outbound queue full, retrying"
                    );
                    frame = returned;
                }
            }
        }
    }
}

/// 会话注册表
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<UserId, SessionHandle>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<UserId, SessionHandle>> {
        self.sessions
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<UserId, SessionHandle>> {
        self.sessions
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 注册会话，返回被替换的旧句柄
    pub fn register(&self, handle: SessionHandle) -> Option<SessionHandle> {
        let user_id = handle.user_id();
        let previous = self.write().insert(user_id, handle);
        if let Some(previous) = &previous {
            tracing::info!(
                user_id = %user_id,
                replaced_session = %previous.id(),
                "session replaced by newer connection"
            );
        }
        previous
    }

    /// 幂等注销
    pub fn unregister(&self, user_id: UserId) -> Option<SessionHandle> {
        self.write().remove(&user_id)
    }

    /// 仅当当前条目仍属于 `session_id` 时才注销
    pub fn unregister_session(&self, user_id: UserId, session_id: Uuid) -> bool {
        let mut sessions = self.write();
        match sessions.get(&user_id) {
            Some(current) if current.id() == session_id => {
                sessions.remove(&user_id);
                true
            }
            _ => false,
        }
    }

    pub fn lookup(&self, user_id: UserId) -> Option<SessionHandle> {
        self.read().get(&user_id).cloned()
    }

    pub fn is_online(&self, user_id: UserId) -> bool {
        self.read().contains_key(&user_id)
    }

    pub fn count(&self) -> usize {
        self.read().len()
    }
}

/// 周期性采样在线会话数，直到 `cancel` 被触发
pub async fn observe_session_count(
    registry: Arc<SessionRegistry>,
    every: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!("session observer stopped");
                break;
            }
            _ = ticker.tick() => {
                tracing::info!(sessions = registry.count(), "active sessions");
            }
        }
    }
}
