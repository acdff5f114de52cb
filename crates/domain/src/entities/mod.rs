//! 领域实体定义
//!
//! 包含系统的核心实体：用户、会话、消息与拉黑关系。

pub mod block;
pub mod channel;
pub mod message;
pub mod user;

pub use block::BlockRelation;
pub use channel::{Channel, NewChannel, PrivateChannelKey};
pub use message::{channel_readed_for, Message, NewMessage};
pub use user::{profile_object_key, ProfileUpdate, User};
