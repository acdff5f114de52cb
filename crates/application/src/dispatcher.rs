//! 消息分发器
//!
//! 按到达顺序处理单个连接上的入站帧：解码为 [`Request`]，调用对应的业务操作，
//! 返回给调用者的应答帧，并对需要广播的操作执行扇出。

use std::sync::Arc;

use domain::UserId;

use crate::{
    broadcaster::SessionBroadcaster,
    dto::MessagePayload,
    error::ApplicationError,
    protocol::{methods, OutboundFrame, Request},
    services::ChatService,
};

pub struct MessageDispatcher {
    chat: Arc<ChatService>,
    broadcaster: SessionBroadcaster,
}

impl MessageDispatcher {
    pub fn new(chat: Arc<ChatService>, broadcaster: SessionBroadcaster) -> Self {
        Self { chat, broadcaster }
    }

    pub fn chat(&self) -> &Arc<ChatService> {
        &self.chat
    }

    /// 处理一条文本帧；返回 `None` 表示不需要回复（被拉黑策略静默丢弃）
    pub async fn handle_text(&self, user_id: UserId, text: &str) -> Option<OutboundFrame> {
        match Request::parse(text) {
            Ok(request) => self.handle(user_id, request).await,
            Err(err) => {
                tracing::warn!(user_id = %user_id, error = %err, "rejected inbound frame");
                Some(OutboundFrame::error(err.code(), err.to_string(), err.method()))
            }
        }
    }

    pub async fn handle(&self, user_id: UserId, request: Request) -> Option<OutboundFrame> {
        let method = request.method();
        tracing::debug!(user_id = %user_id, method, "handling request");

        match self.execute(user_id, request).await {
            Ok(reply) => Some(reply),
            Err(ApplicationError::BlockedInteraction) => {
                tracing::info!(user_id = %user_id, method, "request dropped by block policy");
                None
            }
            Err(err) => {
                tracing::warn!(user_id = %user_id, method, error = %err, "request failed");
                Some(OutboundFrame::error(err.code(), err.to_string(), method))
            }
        }
    }

    async fn execute(
        &self,
        user_id: UserId,
        request: Request,
    ) -> Result<OutboundFrame, ApplicationError> {
        match request {
            Request::SendMessage { target, body } => {
                let sent = self.chat.send_message(user_id, target, body).await?;
                let frame = OutboundFrame::from_payload(
                    methods::RCVD_MESSAGE,
                    &MessagePayload::from(&sent.message),
                )?;
                self.broadcaster.fan_out(&sent.recipients, &frame).await;
                Ok(frame)
            }
            Request::ReadMessages { channel_id, reader } => {
                let outcome = self.chat.read_messages(user_id, channel_id, reader).await?;
                let frame =
                    OutboundFrame::from_payload(methods::READED_MESSAGES, &outcome.receipt)?;
                self.broadcaster.fan_out(&outcome.recipients, &frame).await;
                Ok(frame)
            }
            Request::GetChats => {
                let chats = self.chat.list_chats(user_id).await?;
                Ok(OutboundFrame::from_payload(methods::GET_CHATS, &chats)?)
            }
            Request::GetChat { channel_id } => {
                let history = self.chat.get_chat(user_id, channel_id).await?;
                Ok(OutboundFrame::from_payload(methods::GET_CHAT, &history)?)
            }
            Request::GetUsers { prefix } => {
                let users = self.chat.search_users(user_id, &prefix).await?;
                Ok(OutboundFrame::from_payload(methods::GET_USERS, &users)?)
            }
            Request::CreateChat { peer } => {
                let created = self.chat.create_chat(user_id, peer).await?;
                let frame = OutboundFrame::from_payload(methods::CHAT_CREATED, &created.reply)?;
                if !created.notify.is_empty() {
                    self.broadcaster.fan_out(&created.notify, &frame).await;
                }
                Ok(frame)
            }
            Request::UpdateProfilePicture { image } => {
                let updated = self.chat.update_profile_picture(user_id, image).await?;
                Ok(OutboundFrame::from_payload(
                    methods::UPDATE_PROFILE_PICTURE,
                    &updated,
                )?)
            }
        }
    }
}
