//! 自动解封任务
//!
//! 周期性清除已到期的账号封禁，直到收到取消信号。

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::{clock::Clock, error::ApplicationError, repository::UserRepository};

pub struct AutoUnblockSweeper {
    users: Arc<dyn UserRepository>,
    clock: Arc<dyn Clock>,
    interval: Duration,
}

impl AutoUnblockSweeper {
    pub fn new(users: Arc<dyn UserRepository>, clock: Arc<dyn Clock>, interval: Duration) -> Self {
        Self {
            users,
            clock,
            interval,
        }
    }

    /// 执行一次清扫，返回解封的账号数
    pub async fn tick(&self) -> Result<u64, ApplicationError> {
        let cleared = self.users.sweep_expired_blocks(self.clock.now()).await?;
        if cleared > 0 {
            tracing::info!(cleared, "expired account blocks lifted");
        }
        Ok(cleared)
    }

    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::info!(interval = ?self.interval, "auto-unblock sweeper started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("auto-unblock sweeper stopped");
                    break;
                }
                _ = ticker.tick() => {
                    // 单次失败只记录，下一轮继续
                    if let Err(err) = self.tick().await {
                        tracing::error!(error = %err, "auto-unblock sweep failed");
                    }
                }
            }
        }
    }
}
