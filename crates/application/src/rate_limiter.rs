//! 限流网关
//!
//! 两组相互独立的令牌桶：公开路径按客户端 IP 计，认证路径按用户计。
//! 被拒绝的请求不消耗令牌。

use std::net::IpAddr;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use config::{BucketConfig, RateLimitConfig};
use domain::UserId;
use governor::clock::{Clock as _, DefaultClock};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RateLimitError {
    #[error("rate limit exceeded, retry after {retry_after:?}")]
    Exceeded { retry_after: Duration },
}

impl RateLimitError {
    /// `Retry-After` 头使用的秒数，至少为 1
    pub fn retry_after_secs(&self) -> u64 {
        match self {
            RateLimitError::Exceeded { retry_after } => {
                let secs = retry_after.as_secs();
                if retry_after.subsec_nanos() > 0 {
                    secs + 1
                } else {
                    secs.max(1)
                }
            }
        }
    }
}

/// 令牌桶参数：容量为 `burst`，每隔 `refill` 补充一个令牌
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketSpec {
    pub burst: u32,
    pub refill: Duration,
}

impl BucketSpec {
    fn quota(self) -> Quota {
        let burst = NonZeroU32::new(self.burst).unwrap_or(NonZeroU32::MIN);
        let refill = if self.refill.is_zero() {
            Duration::from_millis(1)
        } else {
            self.refill
        };
        Quota::with_period(refill)
            .unwrap_or_else(|| Quota::per_second(burst))
            .allow_burst(burst)
    }
}

impl From<&BucketConfig> for BucketSpec {
    fn from(config: &BucketConfig) -> Self {
        Self {
            burst: config.burst,
            refill: config.refill_interval(),
        }
    }
}

pub struct RateLimitGateway {
    public: DefaultKeyedRateLimiter<IpAddr>,
    authenticated: DefaultKeyedRateLimiter<UserId>,
    clock: DefaultClock,
    rejected: AtomicU64,
}

impl RateLimitGateway {
    pub fn new(public: BucketSpec, authenticated: BucketSpec) -> Self {
        Self {
            public: RateLimiter::keyed(public.quota()),
            authenticated: RateLimiter::keyed(authenticated.quota()),
            clock: DefaultClock::default(),
            rejected: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(
            BucketSpec::from(&config.public),
            BucketSpec::from(&config.authenticated),
        )
    }

    pub fn check_public(&self, ip: IpAddr) -> Result<(), RateLimitError> {
        self.public.check_key(&ip).map_err(|not_until| {
            let retry_after = not_until.wait_time_from(self.clock.now());
            self.reject(retry_after, || tracing::debug!(ip = %ip, "public rate limit exceeded"))
        })
    }

    pub fn check_user(&self, user_id: UserId) -> Result<(), RateLimitError> {
        self.authenticated.check_key(&user_id).map_err(|not_until| {
            let retry_after = not_until.wait_time_from(self.clock.now());
            self.reject(retry_after, || {
                tracing::debug!(user_id = %user_id, "authenticated rate limit exceeded")
            })
        })
    }

    fn reject(&self, retry_after: Duration, log: impl FnOnce()) -> RateLimitError {
        self.rejected.fetch_add(1, Ordering::Relaxed);
        log();
        RateLimitError::Exceeded { retry_after }
    }

    /// 累计拒绝次数
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    /// 清理已回满的桶，防止键无限增长
    pub fn retain_recent(&self) {
        self.public.retain_recent();
        self.authenticated.retain_recent();
    }
}
