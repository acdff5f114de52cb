//! 协议帧定义
//!
//! 入站：`{"method": "...", "query": {...}}`；出站：`{"method": "...", "data": {...}}`。
//! 入站帧在进入业务逻辑之前被解码并校验为封闭的 [`Request`] 枚举。

use data_encoding::BASE64;
use domain::{ChannelId, MessageBody, UserId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub mod methods {
    pub const RCVD_MESSAGE: &str = "RcvdMessage";
    pub const READ_MESSAGES: &str = "ReadMessages";
    pub const READED_MESSAGES: &str = "ReadedMessages";
    pub const GET_CHATS: &str = "GetChats";
    pub const GET_CHAT: &str = "GetChat";
    pub const GET_USERS: &str = "GetUsers";
    pub const CREATE_CHAT: &str = "CreateChat";
    pub const CHAT_CREATED: &str = "ChatCreated";
    pub const UPDATE_PROFILE_PICTURE: &str = "UpdateProfilePicture";
    pub const ERROR: &str = "Error";
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("malformed frame for method '{method}': {reason}")]
    Malformed { method: String, reason: String },
    #[error("unknown method '{0}'")]
    UnknownMethod(String),
}

impl FrameError {
    fn malformed(method: &str, reason: impl ToString) -> Self {
        Self::Malformed {
            method: method.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            FrameError::Malformed { .. } => "MALFORMED_FRAME",
            FrameError::UnknownMethod(_) => "UNKNOWN_METHOD",
        }
    }

    pub fn method(&self) -> &str {
        match self {
            FrameError::Malformed { method, .. } => method,
            FrameError::UnknownMethod(method) => method,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct InboundFrame {
    pub method: String,
    #[serde(default)]
    pub query: Value,
}

/// 消息发送目标
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageTarget {
    Channel(ChannelId),
    /// `chatId` 为 0 或负数时按对端解析（必要时创建）私聊
    Peer(UserId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    SendMessage {
        target: MessageTarget,
        body: MessageBody,
    },
    ReadMessages {
        channel_id: ChannelId,
        reader: Option<UserId>,
    },
    GetChats,
    GetChat {
        channel_id: ChannelId,
    },
    GetUsers {
        prefix: String,
    },
    CreateChat {
        peer: UserId,
    },
    UpdateProfilePicture {
        image: Vec<u8>,
    },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendQuery {
    chat_id: i64,
    message: String,
    #[serde(default, rename = "user2")]
    user2: Option<i64>,
}

/// `userId` 既可能是数字也可能是字符串
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum LooseId {
    Number(i64),
    Text(String),
}

impl LooseId {
    pub fn parse(self) -> Result<i64, String> {
        match self {
            LooseId::Number(id) => Ok(id),
            LooseId::Text(text) => text
                .trim()
                .parse()
                .map_err(|_| format!("userId '{text}' is not an integer")),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReadQuery {
    chat_id: i64,
    #[serde(default)]
    user_id: Option<LooseId>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatQuery {
    chat_id: i64,
}

#[derive(Deserialize)]
struct UsersQuery {
    username: String,
}

#[derive(Deserialize)]
struct CreateChatQuery {
    user2: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PictureQuery {
    image_data: String,
}

fn query<T: for<'de> Deserialize<'de>>(method: &str, value: Value) -> Result<T, FrameError> {
    serde_json::from_value(value).map_err(|err| FrameError::malformed(method, err))
}

/// 解析 `data:<mime>;base64,<payload>` 形式的图片数据
fn decode_image(method: &str, data: &str) -> Result<Vec<u8>, FrameError> {
    let (header, payload) = data
        .split_once(',')
        .ok_or_else(|| FrameError::malformed(method, "imageData must be a data URL"))?;
    if !header.starts_with("data:") || !header.ends_with(";base64") {
        return Err(FrameError::malformed(
            method,
            "imageData must be a base64 data URL",
        ));
    }
    let bytes = BASE64
        .decode(payload.trim().as_bytes())
        .map_err(|err| FrameError::malformed(method, err))?;
    if bytes.is_empty() {
        return Err(FrameError::malformed(method, "imageData is empty"));
    }
    Ok(bytes)
}

impl Request {
    /// 解码并校验一条文本帧
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let frame: InboundFrame =
            serde_json::from_str(text).map_err(|err| FrameError::malformed("", err))?;
        Self::from_frame(frame)
    }

    pub fn from_frame(frame: InboundFrame) -> Result<Self, FrameError> {
        let InboundFrame { method, query: q } = frame;
        let m = method.as_str();
        match m {
            methods::RCVD_MESSAGE => {
                let SendQuery {
                    chat_id,
                    message,
                    user2,
                } = query(m, q)?;
                let body = MessageBody::new(message).map_err(|err| FrameError::malformed(m, err))?;
                let target = if chat_id > 0 {
                    MessageTarget::Channel(ChannelId::new(chat_id))
                } else {
                    let peer = user2.ok_or_else(|| {
                        FrameError::malformed(m, "user2 is required when chatId is not positive")
                    })?;
                    MessageTarget::Peer(UserId::new(peer))
                };
                Ok(Request::SendMessage { target, body })
            }
            methods::READ_MESSAGES => {
                let ReadQuery { chat_id, user_id } = query(m, q)?;
                let reader = user_id
                    .map(LooseId::parse)
                    .transpose()
                    .map_err(|reason| FrameError::malformed(m, reason))?
                    .map(UserId::new);
                Ok(Request::ReadMessages {
                    channel_id: ChannelId::new(chat_id),
                    reader,
                })
            }
            methods::GET_CHATS => Ok(Request::GetChats),
            methods::GET_CHAT => {
                let ChatQuery { chat_id } = query(m, q)?;
                Ok(Request::GetChat {
                    channel_id: ChannelId::new(chat_id),
                })
            }
            methods::GET_USERS => {
                let UsersQuery { username } = query(m, q)?;
                Ok(Request::GetUsers { prefix: username })
            }
            methods::CREATE_CHAT => {
                let CreateChatQuery { user2 } = query(m, q)?;
                Ok(Request::CreateChat {
                    peer: UserId::new(user2),
                })
            }
            methods::UPDATE_PROFILE_PICTURE => {
                let PictureQuery { image_data } = query(m, q)?;
                Ok(Request::UpdateProfilePicture {
                    image: decode_image(m, &image_data)?,
                })
            }
            _ => Err(FrameError::UnknownMethod(method)),
        }
    }

    pub fn method(&self) -> &'static str {
        match self {
            Request::SendMessage { .. } => methods::RCVD_MESSAGE,
            Request::ReadMessages { .. } => methods::READ_MESSAGES,
            Request::GetChats => methods::GET_CHATS,
            Request::GetChat { .. } => methods::GET_CHAT,
            Request::GetUsers { .. } => methods::GET_USERS,
            Request::CreateChat { .. } => methods::CREATE_CHAT,
            Request::UpdateProfilePicture { .. } => methods::UPDATE_PROFILE_PICTURE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundFrame {
    pub method: String,
    pub data: Value,
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    code: &'a str,
    message: String,
    method: &'a str,
}

impl OutboundFrame {
    pub fn new(method: impl Into<String>, data: Value) -> Self {
        Self {
            method: method.into(),
            data,
        }
    }

    pub fn from_payload<T: Serialize>(
        method: impl Into<String>,
        payload: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(method, serde_json::to_value(payload)?))
    }

    pub fn error(code: &str, message: impl Into<String>, method: &str) -> Self {
        let body = ErrorBody {
            code,
            message: message.into(),
            method,
        };
        let data = serde_json::to_value(&body).unwrap_or(Value::Null);
        Self::new(methods::ERROR, data)
    }

    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn loose_id_accepts_number_or_numeric_string() {
        let id: LooseId = serde_json::from_value(json!(5)).unwrap();
        assert_eq!(id.parse(), Ok(5));
        let id: LooseId = serde_json::from_value(json!(" 7 ")).unwrap();
        assert_eq!(id.parse(), Ok(7));
        let id: LooseId = serde_json::from_value(json!("abc")).unwrap();
        assert!(id.parse().is_err());
    }

    #[test]
    fn parses_send_with_create_target() {
        let request =
            Request::parse(r#"{"method":"RcvdMessage","query":{"chatId":-1,"message":"hi","user2":2}}"#)
                .unwrap();
        assert_eq!(
            request,
            Request::SendMessage {
                target: MessageTarget::Peer(UserId::new(2)),
                body: MessageBody::new("hi").unwrap(),
            }
        );
    }

    #[test]
    fn send_to_zero_chat_requires_peer() {
        let err = Request::parse(r#"{"method":"RcvdMessage","query":{"chatId":0,"message":"hi"}}"#)
            .unwrap_err();
        assert!(matches!(err, FrameError::Malformed { ref method, .. } if method == "RcvdMessage"));
    }

    #[test]
    fn send_rejects_blank_message_and_wrong_types() {
        assert!(Request::parse(r#"{"method":"RcvdMessage","query":{"chatId":3,"message":"  "}}"#).is_err());
        assert!(Request::parse(r#"{"method":"RcvdMessage","query":{"chatId":"3","message":"x"}}"#).is_err());
        assert!(Request::parse(r#"{"method":"RcvdMessage"}"#).is_err());
    }

    #[test]
    fn read_messages_accepts_string_or_number_user_id() {
        for raw in [json!("5"), json!(5)] {
            let frame = json!({"method":"ReadMessages","query":{"chatId":9,"userId":raw}});
            let request = Request::parse(&frame.to_string()).unwrap();
            assert_eq!(
                request,
                Request::ReadMessages {
                    channel_id: ChannelId::new(9),
                    reader: Some(UserId::new(5)),
                }
            );
        }
        let frame = json!({"method":"ReadMessages","query":{"chatId":9,"userId":"abc"}});
        assert!(Request::parse(&frame.to_string()).is_err());
    }

    #[test]
    fn get_chats_ignores_missing_query() {
        assert_eq!(Request::parse(r#"{"method":"GetChats"}"#).unwrap(), Request::GetChats);
    }

    #[test]
    fn unknown_method_is_reported() {
        let err = Request::parse(r#"{"method":"DeleteEverything","query":{}}"#).unwrap_err();
        assert_eq!(err, FrameError::UnknownMethod("DeleteEverything".into()));
        assert_eq!(err.code(), "UNKNOWN_METHOD");
    }

    #[test]
    fn unparsable_text_is_malformed() {
        let err = Request::parse("not json").unwrap_err();
        assert_eq!(err.code(), "MALFORMED_FRAME");
        assert_eq!(err.method(), "");
    }

    #[test]
    fn profile_picture_is_decoded_from_data_url() {
        let frame = json!({"method":"UpdateProfilePicture","query":{"imageData":"data:image/png;base64,YWJj"}});
        assert_eq!(
            Request::parse(&frame.to_string()).unwrap(),
            Request::UpdateProfilePicture {
                image: b"abc".to_vec()
            }
        );

        let frame = json!({"method":"UpdateProfilePicture","query":{"imageData":"YWJj"}});
        assert!(Request::parse(&frame.to_string()).is_err());
    }

    #[test]
    fn error_frame_shape() {
        let frame = OutboundFrame::error("NOT_CHAT_MEMBER", "nope", "GetChat");
        assert_eq!(
            serde_json::to_value(&frame).unwrap(),
            json!({"method":"Error","data":{"code":"NOT_CHAT_MEMBER","message":"nope","method":"GetChat"}})
        );
    }
}
