//! 出站帧负载
//!
//! 字段名沿用客户端已使用的 JSON 键（包括大小写不统一的历史字段）。

use domain::{Channel, ChannelId, Message, MessageId, Timestamp, User, UserId};
use serde::{Deserialize, Serialize};

fn rfc3339(at: Timestamp) -> String {
    at.to_rfc3339()
}

/// `RcvdMessage` 负载，确认帧与广播帧相同
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePayload {
    #[serde(rename = "fromChatID")]
    pub from_chat_id: ChannelId,
    #[serde(rename = "messageId")]
    pub message_id: MessageId,
    #[serde(rename = "UserFromID")]
    pub user_from_id: UserId,
    pub message: String,
    pub timestamp: String,
    #[serde(rename = "Readed")]
    pub readed: bool,
    #[serde(rename = "Edited")]
    pub edited: bool,
}

impl From<&Message> for MessagePayload {
    fn from(message: &Message) -> Self {
        Self {
            from_chat_id: message.channel_id,
            message_id: message.id,
            user_from_id: message.sender_id,
            message: message.body.as_str().to_string(),
            timestamp: rfc3339(message.created_at),
            readed: message.readed,
            edited: message.edited,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadReceipt {
    pub chat_id: ChannelId,
    pub reader_id: UserId,
    pub updated: u64,
}

/// 会话成员的简要信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberInfo {
    pub id: UserId,
    pub username: String,
    pub is_online: bool,
    pub last_online: String,
}

impl MemberInfo {
    pub fn new(user: &User, is_online: bool) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            is_online,
            last_online: rfc3339(user.last_online),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSummary {
    pub id: ChannelId,
    /// 私聊时为对端用户名
    pub name: String,
    pub readed: bool,
    pub is_private: bool,
    pub profile_picture: String,
    pub users: Vec<MemberInfo>,
    pub other_user_id: Option<UserId>,
    pub last_activity: Option<String>,
    pub is_online: bool,
    pub unread_count: u64,
}

/// 调用者自己的资料
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileInfo {
    pub id: UserId,
    #[serde(rename = "UserName")]
    pub username: String,
    #[serde(rename = "IsBlocked")]
    pub is_blocked: bool,
    #[serde(rename = "LastOnline")]
    pub last_online: String,
    #[serde(rename = "ProfilePicture")]
    pub profile_picture: String,
    #[serde(rename = "Bio")]
    pub bio: String,
    #[serde(rename = "Mail", default, skip_serializing_if = "Option::is_none")]
    pub mail: Option<String>,
}

impl ProfileInfo {
    pub fn new(user: &User, profile_picture: String) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            is_blocked: user.is_blocked,
            last_online: rfc3339(user.last_online),
            profile_picture,
            bio: user.bio.clone(),
            mail: user.mail.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatList {
    pub chats: Vec<ChatSummary>,
    pub info: ProfileInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: MessageId,
    pub from: UserId,
    pub message: String,
    pub timestamp: String,
    pub readed: bool,
    pub edited: bool,
}

impl From<&Message> for HistoryEntry {
    fn from(message: &Message) -> Self {
        Self {
            id: message.id,
            from: message.sender_id,
            message: message.body.as_str().to_string(),
            timestamp: rfc3339(message.created_at),
            readed: message.readed,
            edited: message.edited,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    pub id: UserId,
    pub username: String,
    pub is_online: bool,
    pub last_online: String,
    pub profile_picture: String,
    pub bio: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatHistory {
    pub chat_id: ChannelId,
    pub messages: Vec<HistoryEntry>,
    /// 对调用者而言是否没有他人发送的未读消息
    pub readed: bool,
    pub peer: Option<PeerInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMatch {
    pub id: UserId,
    pub username: String,
    pub profile_picture: String,
    /// 已有私聊的 id，没有时为 -1
    pub chat_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatCreated {
    pub chat_id: ChannelId,
    pub name: String,
    pub members: Vec<UserId>,
    /// 本次请求是否新建了会话
    pub created: bool,
}

impl ChatCreated {
    pub fn new(channel: &Channel, members: Vec<UserId>, created: bool) -> Self {
        Self {
            chat_id: channel.id,
            name: channel.name.clone(),
            members,
            created,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfilePictureUpdated {
    #[serde(rename = "ProfilePicture")]
    pub profile_picture: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use domain::{MessageBody, NewMessage};
    use serde_json::json;

    #[test]
    fn message_payload_uses_wire_names() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let message = NewMessage::new(
            ChannelId::new(4),
            UserId::new(1),
            MessageBody::new("hi").unwrap(),
            at,
        )
        .persisted(MessageId::new(10));

        let value = serde_json::to_value(MessagePayload::from(&message)).unwrap();
        assert_eq!(
            value,
            json!({
                "fromChatID": 4,
                "messageId": 10,
                "UserFromID": 1,
                "message": "hi",
                "timestamp": "2024-05-01T12:00:00+00:00",
                "Readed": false,
                "Edited": false,
            })
        );
    }
}
