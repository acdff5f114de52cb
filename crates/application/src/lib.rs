//! 应用层实现。
//!
//! 围绕领域模型的用例服务：会话注册、协议分发、拉黑准入、限流，
//! 以及对外部适配器（仓储、对象存储、时钟）的抽象。

pub mod broadcaster;
pub mod clock;
pub mod dispatcher;
pub mod dto;
pub mod error;
pub mod memory;
pub mod protocol;
pub mod rate_limiter;
pub mod repository;
pub mod services;
pub mod session;
pub mod storage;
pub mod sweeper;

pub use broadcaster::{DeliveryPolicy, FanOutReport, SessionBroadcaster};
pub use clock::{Clock, ManualClock, SystemClock};
pub use dispatcher::MessageDispatcher;
pub use error::ApplicationError;
pub use memory::{MemoryChatStore, MemoryObjectStore};
pub use protocol::{FrameError, LooseId, MessageTarget, OutboundFrame, Request};
pub use rate_limiter::{BucketSpec, RateLimitError, RateLimitGateway};
pub use repository::{BlockRepository, ChannelRepository, MessageRepository, UserRepository};
pub use services::{
    escalation_rule, AdmissionPolicy, ChatService, ChatServiceDependencies,
};
pub use session::{observe_session_count, DeliveryError, SessionHandle, SessionRegistry};
pub use storage::{ObjectStore, ObjectStoreError, StoredObject};
pub use sweeper::AutoUnblockSweeper;
