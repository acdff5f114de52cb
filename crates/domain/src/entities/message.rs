//! 消息实体定义

use serde::{Deserialize, Serialize};

use crate::value_objects::{ChannelId, MessageBody, MessageId, Timestamp, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub channel_id: ChannelId,
    pub sender_id: UserId,
    pub body: MessageBody,
    pub created_at: Timestamp,
    pub edited: bool,
    /// 已读标记只会从 false 变为 true
    pub readed: bool,
}

impl Message {
    /// 对指定读者而言是否仍是未读消息
    pub fn is_unread_for(&self, reader: UserId) -> bool {
        self.sender_id != reader && !self.readed
    }
}

/// 尚未持久化的消息。新消息总是未读且未编辑。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub channel_id: ChannelId,
    pub sender_id: UserId,
    pub body: MessageBody,
    pub created_at: Timestamp,
}

impl NewMessage {
    pub fn new(channel_id: ChannelId, sender_id: UserId, body: MessageBody, now: Timestamp) -> Self {
        Self {
            channel_id,
            sender_id,
            body,
            created_at: now,
        }
    }

    pub fn persisted(self, id: MessageId) -> Message {
        Message {
            id,
            channel_id: self.channel_id,
            sender_id: self.sender_id,
            body: self.body,
            created_at: self.created_at,
            edited: false,
            readed: false,
        }
    }
}

/// 会话对某位读者是否"已读"：没有任何他人发送的未读消息
pub fn channel_readed_for<'a>(
    messages: impl IntoIterator<Item = &'a Message>,
    reader: UserId,
) -> bool {
    !messages.into_iter().any(|m| m.is_unread_for(reader))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn message(id: i64, sender: i64, readed: bool) -> Message {
        let mut m = NewMessage::new(
            ChannelId::new(1),
            UserId::new(sender),
            MessageBody::new("hello").unwrap(),
            Utc::now(),
        )
        .persisted(MessageId::new(id));
        m.readed = readed;
        m
    }

    #[test]
    fn new_messages_start_unread_and_unedited() {
        let m = message(1, 1, false);
        assert!(!m.readed);
        assert!(!m.edited);
    }

    #[test]
    fn own_messages_never_count_as_unread() {
        let messages = vec![message(1, 1, false), message(2, 2, true)];
        assert!(channel_readed_for(&messages, UserId::new(1)));
        assert!(!channel_readed_for(&messages, UserId::new(2)));
    }

    #[test]
    fn empty_channel_is_readed() {
        assert!(channel_readed_for(&Vec::<Message>::new(), UserId::new(1)));
    }
}
