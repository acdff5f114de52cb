//! 会话广播
//!
//! 把同一个出站帧投递给一组接收者的在线会话。每个接收者的投递相互独立，
//! 失败的会话会被注销，不影响其他接收者和触发广播的请求。

use std::sync::Arc;
use std::time::Duration;

use domain::UserId;
use futures_util::future::join_all;

use crate::protocol::OutboundFrame;
use crate::session::SessionRegistry;

/// 广播投递限制
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryPolicy {
    pub write_timeout: Duration,
    pub write_retries: u32,
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self {
            write_timeout: Duration::from_millis(500),
            write_retries: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanOutReport {
    pub delivered: usize,
    /// 不在线，直接跳过
    pub offline: usize,
    pub evicted: usize,
}

#[derive(Clone)]
pub struct SessionBroadcaster {
    sessions: Arc<SessionRegistry>,
    policy: DeliveryPolicy,
}

impl SessionBroadcaster {
    pub fn new(sessions: Arc<SessionRegistry>, policy: DeliveryPolicy) -> Self {
        Self { sessions, policy }
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    pub async fn fan_out(&self, recipients: &[UserId], frame: &OutboundFrame) -> FanOutReport {
        let mut report = FanOutReport::default();
        let mut targets = Vec::with_capacity(recipients.len());
        for user_id in recipients {
            match self.sessions.lookup(*user_id) {
                Some(handle) => targets.push(handle),
                None => report.offline += 1,
            }
        }

        let deliveries = targets.into_iter().map(|handle| {
            let frame = frame.clone();
            let policy = self.policy;
            async move {
                let result = handle
                    .deliver(frame, policy.write_timeout, policy.write_retries)
                    .await;
                (handle, result)
            }
        });

        for (handle, result) in join_all(deliveries).await {
            match result {
                Ok(()) => report.delivered += 1,
                Err(err) => {
                    if self.sessions.unregister_session(handle.user_id(), handle.id()) {
                        tracing::info!(
                            user_id = %handle.user_id(),
                            session_id = %handle.id(),
                            error = %err,
                            "evicted unreachable session"
                        );
                    }
                    report.evicted += 1;
                }
            }
        }

        tracing::debug!(
            method = %frame.method,
            delivered = report.delivered,
            offline = report.offline,
            evicted = report.evicted,
            "fan-out finished"
        );
        report
    }
}
