//! 会话（聊天）实体
//!
//! 私聊会话恰好包含两个不同的成员，并由规范名唯一确定。

use serde::{Deserialize, Serialize};

use crate::errors::{DomainError, DomainResult};
use crate::value_objects::{ChannelId, Timestamp, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: ChannelId,
    pub name: String,
    pub description: String,
    pub is_private: bool,
    pub creator_id: UserId,
    pub created_at: Timestamp,
}

/// 尚未持久化的会话，由仓储分配 id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChannel {
    pub name: String,
    pub description: String,
    pub is_private: bool,
    pub creator_id: UserId,
    pub members: Vec<UserId>,
    pub created_at: Timestamp,
}

impl NewChannel {
    /// 构造两人私聊，`creator` 为发起方
    pub fn private_pair(creator: UserId, peer: UserId, now: Timestamp) -> DomainResult<Self> {
        let key = PrivateChannelKey::new(creator, peer)?;
        Ok(Self {
            name: key.name(),
            description: format!("Private chat between user {creator} and user {peer}"),
            is_private: true,
            creator_id: creator,
            members: vec![creator, peer],
            created_at: now,
        })
    }
}

/// 无序用户对的规范键，同一对用户无论谁发起都得到相同的会话名
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PrivateChannelKey {
    low: UserId,
    high: UserId,
}

impl PrivateChannelKey {
    pub fn new(a: UserId, b: UserId) -> DomainResult<Self> {
        if a == b {
            return Err(DomainError::validation_error(
                "user2",
                "private chat requires two distinct users",
            ));
        }
        let (low, high) = if a < b { (a, b) } else { (b, a) };
        Ok(Self { low, high })
    }

    pub fn name(&self) -> String {
        format!("chat_{}_{}", self.low, self.high)
    }

    pub fn members(&self) -> [UserId; 2] {
        [self.low, self.high]
    }

    /// 返回对端用户
    pub fn peer_of(&self, user: UserId) -> Option<UserId> {
        if user == self.low {
            Some(self.high)
        } else if user == self.high {
            Some(self.low)
        } else {
            None
        }
    }
}
