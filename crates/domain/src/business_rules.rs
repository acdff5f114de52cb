//! 业务规则验证
//!
//! 拉黑阈值升级规则：被足够多的不同用户拉黑后，账号进入限时封禁。

use chrono::{DateTime, Duration, Utc};

use crate::value_objects::Timestamp;

/// 拉黑升级规则
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockEscalationRule {
    /// 触发账号封禁所需的不同拉黑者数量
    pub threshold: u32,
    /// 封禁时长
    pub cooldown: Duration,
}

impl Default for BlockEscalationRule {
    fn default() -> Self {
        Self {
            threshold: 2,
            cooldown: Duration::hours(24),
        }
    }
}

impl BlockEscalationRule {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            cooldown,
        }
    }

    /// 达到阈值时返回封禁截止时间，超出时间范围时取最大可表示时间
    pub fn escalate(&self, blocker_count: u64, now: Timestamp) -> Option<Timestamp> {
        (blocker_count >= u64::from(self.threshold)).then(|| {
            now.checked_add_signed(self.cooldown)
                .unwrap_or(DateTime::<Utc>::MAX_UTC)
        })
    }
}
