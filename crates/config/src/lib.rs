//! 统一配置中心
//!
//! 提供应用的全局配置管理，包括：
//! - 服务监听地址
//! - 数据库连接（缺省时使用内存仓储）
//! - JWT认证
//! - 拉黑升级与自动解封
//! - 限流网关
//! - 会话写出策略
//!
//! 加载优先级：默认值 -> `APP_CONFIG_FILE` 指定的文件 -> `APP_*` 环境变量（`__` 分隔层级）。

use std::time::Duration;

use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// 全局应用配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AppConfig {
    #[validate(nested)]
    pub server: ServerConfig,
    #[validate(nested)]
    #[serde(default)]
    pub database: DatabaseConfig,
    #[validate(nested)]
    pub jwt: JwtConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[validate(nested)]
    #[serde(default)]
    pub blocking: BlockingConfig,
    #[validate(nested)]
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[validate(nested)]
    #[serde(default)]
    pub session: SessionConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ServerConfig {
    #[validate(length(min = 1))]
    pub host: String,
    #[validate(range(min = 1))]
    pub port: u16,
}

/// 数据库配置，`url` 为空时使用内存仓储
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct DatabaseConfig {
    #[validate(url)]
    pub url: Option<String>,
    #[serde(default = "default_max_connections")]
    #[validate(range(min = 1))]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

/// JWT配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct JwtConfig {
    #[validate(length(min = 32, message = "JWT secret must be at least 32 characters long"))]
    pub secret: String,
    #[validate(range(min = 1))]
    pub expiration_hours: i64,
}

/// 头像对象存储配置，`object_dir` 为空时存放在内存中
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    pub object_dir: Option<String>,
}

/// 拉黑升级配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BlockingConfig {
    /// 触发账号封禁所需的不同拉黑者数量
    #[validate(range(min = 1))]
    pub threshold: u32,
    /// 封禁时长，上限十年
    #[validate(range(min = 1, max = 315_360_000))]
    pub cooldown_secs: u64,
    #[validate(range(min = 1))]
    pub sweep_interval_secs: u64,
}

impl Default for BlockingConfig {
    fn default() -> Self {
        Self {
            threshold: 2,
            cooldown_secs: 24 * 60 * 60,
            sweep_interval_secs: 60,
        }
    }
}

impl BlockingConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// 单个令牌桶：容量 `burst`，每 `refill_ms` 毫秒补充一个令牌
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Validate)]
pub struct BucketConfig {
    #[validate(range(min = 1))]
    pub burst: u32,
    #[validate(range(min = 1))]
    pub refill_ms: u64,
}

impl BucketConfig {
    pub fn refill_interval(&self) -> Duration {
        Duration::from_millis(self.refill_ms)
    }
}

/// 限流配置：公开接口按来源地址，其余接口按认证身份
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RateLimitConfig {
    #[validate(nested)]
    pub public: BucketConfig,
    #[validate(nested)]
    pub authenticated: BucketConfig,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            public: BucketConfig {
                burst: 10,
                refill_ms: 1000,
            },
            authenticated: BucketConfig {
                burst: 30,
                refill_ms: 200,
            },
        }
    }
}

/// 会话写出配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SessionConfig {
    /// 每个连接的待写出帧缓冲
    #[validate(range(min = 1))]
    pub outbound_buffer: usize,
    #[validate(range(min = 1))]
    pub write_timeout_ms: u64,
    pub write_retries: u32,
    /// 在线连接数采样间隔
    #[validate(range(min = 1))]
    pub sample_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            outbound_buffer: 64,
            write_timeout_ms: 500,
            write_retries: 2,
            sample_interval_secs: 5,
        }
    }
}

impl SessionConfig {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_secs(self.sample_interval_secs)
    }
}

impl Default for AppConfig {
    /// 默认配置使用开发环境版本
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".into(),
                port: 8080,
            },
            database: DatabaseConfig {
                url: None,
                max_connections: default_max_connections(),
            },
            jwt: JwtConfig {
                secret: "dev-secret-key-not-for-production-use-minimum-32-chars".into(),
                expiration_hours: 24,
            },
            storage: StorageConfig::default(),
            blocking: BlockingConfig::default(),
            rate_limit: RateLimitConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

impl AppConfig {
    /// 按优先级加载：默认值 -> 可选文件 (APP_CONFIG_FILE) -> 环境变量 (APP_*)
    pub fn load() -> Result<Self, ConfigError> {
        let mut fig = Figment::new().merge(Serialized::defaults(AppConfig::default()));
        if let Ok(path) = std::env::var("APP_CONFIG_FILE") {
            fig = if path.ends_with(".yml") || path.ends_with(".yaml") {
                fig.merge(Yaml::file(path))
            } else if path.ends_with(".json") {
                fig.merge(Json::file(path))
            } else {
                fig.merge(Toml::file(path))
            };
        }
        Self::from_figment(fig.merge(Env::prefixed("APP_").split("__")))
    }

    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let cfg: AppConfig = figment.extract().map_err(Box::new)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// 是否仍在使用开发用的 JWT 密钥
    pub fn uses_dev_secret(&self) -> bool {
        self.jwt.secret.contains("dev-secret") || self.jwt.secret.contains("not-for-production")
    }

    /// 日志用的脱敏表示
    pub fn sanitize(&self) -> String {
        let mut copy = self.clone();
        copy.jwt.secret = "[REDACTED]".into();
        if let Some(url) = copy.database.url.as_mut() {
            if let Some(at) = url.rfind('@') {
                *url = format!("postgres://[REDACTED]{}", &url[at..]);
            }
        }
        format!("{:?}", copy)
    }
}

/// 配置错误类型
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),
    #[error("invalid configuration: {0}")]
    Invalid(#[from] validator::ValidationErrors),
}
