use std::sync::Arc;

use domain::{
    channel_readed_for, profile_object_key, Channel, ChannelId, Message, MessageBody,
    NewChannel, NewMessage, PrivateChannelKey, ProfileUpdate, RepositoryError, Timestamp, User,
    UserId,
};

use crate::{
    clock::Clock,
    dto::{
        ChatCreated, ChatHistory, ChatList, ChatSummary, HistoryEntry, MemberInfo, PeerInfo,
        ProfileInfo, ProfilePictureUpdated, ReadReceipt, UserMatch,
    },
    error::ApplicationError,
    protocol::MessageTarget,
    repository::{ChannelRepository, MessageRepository, UserRepository},
    services::AdmissionPolicy,
    session::SessionRegistry,
    storage::{data_url, ObjectStore, MISSING_OBJECT_URL},
};

/// 头像统一以 JPEG 存储
pub const PROFILE_PICTURE_CONTENT_TYPE: &str = "image/jpeg";

pub struct ChatServiceDependencies {
    pub user_repository: Arc<dyn UserRepository>,
    pub channel_repository: Arc<dyn ChannelRepository>,
    pub message_repository: Arc<dyn MessageRepository>,
    pub object_store: Arc<dyn ObjectStore>,
    pub clock: Arc<dyn Clock>,
    pub sessions: Arc<SessionRegistry>,
    pub admission: Arc<AdmissionPolicy>,
}

/// 私聊解析结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedChannel {
    pub channel: Channel,
    pub created: bool,
}

/// 已持久化的消息以及需要广播的接收者
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub message: Message,
    pub recipients: Vec<UserId>,
}

#[derive(Debug, Clone)]
pub struct ReadOutcome {
    pub receipt: ReadReceipt,
    pub recipients: Vec<UserId>,
}

#[derive(Debug, Clone)]
pub struct CreatedChat {
    pub reply: ChatCreated,
    /// 仅在新建会话时包含对端
    pub notify: Vec<UserId>,
}

/// 用户在线状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OnlineStatus {
    pub is_online: bool,
    pub last_online: Timestamp,
}

pub struct ChatService {
    deps: ChatServiceDependencies,
}

impl ChatService {
    pub fn new(deps: ChatServiceDependencies) -> Self {
        Self { deps }
    }

    pub fn admission(&self) -> &Arc<AdmissionPolicy> {
        &self.deps.admission
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.deps.sessions
    }

    async fn require_user(&self, id: UserId) -> Result<User, ApplicationError> {
        self.deps
            .user_repository
            .find_by_id(id)
            .await?
            .ok_or(ApplicationError::UserNotFound)
    }

    // 会话必须存在且 `user_id` 为成员，返回全部成员
    async fn require_membership(
        &self,
        channel_id: ChannelId,
        user_id: UserId,
    ) -> Result<(Channel, Vec<User>), ApplicationError> {
        let channel = self
            .deps
            .channel_repository
            .find_by_id(channel_id)
            .await?
            .ok_or(ApplicationError::ChannelNotFound)?;
        let members = self.deps.channel_repository.list_members(channel_id).await?;
        if !members.iter().any(|m| m.id == user_id) {
            return Err(ApplicationError::NotChannelMember);
        }
        Ok((channel, members))
    }

    async fn picture_url(&self, user: &User) -> String {
        match user.profile_object_key() {
            Some(key) => self.deps.object_store.inline_url(&key).await,
            None => MISSING_OBJECT_URL.to_string(),
        }
    }

    /// 查找或创建两人私聊。会话名唯一约束是并发创建的最终仲裁者：
    /// 创建时遇到冲突就重新按名字读取胜出的那一行。
    pub async fn resolve_private_channel(
        &self,
        initiator: UserId,
        peer: UserId,
    ) -> Result<ResolvedChannel, ApplicationError> {
        let key = PrivateChannelKey::new(initiator, peer)?;
        let name = key.name();
        let channels = &self.deps.channel_repository;

        if let Some(channel) = channels.find_by_name(&name).await? {
            return Ok(ResolvedChannel {
                channel,
                created: false,
            });
        }

        for id in key.members() {
            self.require_user(id).await?;
        }

        let new_channel = NewChannel::private_pair(initiator, peer, self.deps.clock.now())?;
        match channels.create(new_channel).await {
            Ok(channel) => {
                tracing::info!(
                    channel_id = %channel.id,
                    name = %channel.name,
                    "private chat created"
                );
                Ok(ResolvedChannel {
                    channel,
                    created: true,
                })
            }
            Err(RepositoryError::Conflict) => {
                tracing::debug!(name = %name, "private chat created concurrently, re-reading");
                let channel = channels
                    .find_by_name(&name)
                    .await?
                    .ok_or(ApplicationError::ChannelNotFound)?;
                Ok(ResolvedChannel {
                    channel,
                    created: false,
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn send_message(
        &self,
        sender_id: UserId,
        target: MessageTarget,
        body: MessageBody,
    ) -> Result<SentMessage, ApplicationError> {
        let channel_id = match target {
            MessageTarget::Channel(channel_id) => channel_id,
            MessageTarget::Peer(peer) => {
                self.resolve_private_channel(sender_id, peer)
                    .await?
                    .channel
                    .id
            }
        };
        let (_, members) = self.require_membership(channel_id, sender_id).await?;
        let sender = members
            .iter()
            .find(|m| m.id == sender_id)
            .cloned()
            .ok_or(ApplicationError::NotChannelMember)?;

        self.deps.admission.check_send(&sender, &members).await?;

        let message = self
            .deps
            .message_repository
            .create(NewMessage::new(
                channel_id,
                sender_id,
                body,
                self.deps.clock.now(),
            ))
            .await?;
        tracing::debug!(
            channel_id = %channel_id,
            message_id = %message.id,
            sender_id = %sender_id,
            "message persisted"
        );

        Ok(SentMessage {
            message,
            recipients: others(&members, sender_id),
        })
    }

    pub async fn read_messages(
        &self,
        reader: UserId,
        channel_id: ChannelId,
        claimed_reader: Option<UserId>,
    ) -> Result<ReadOutcome, ApplicationError> {
        if claimed_reader.is_some_and(|claimed| claimed != reader) {
            return Err(ApplicationError::Authentication);
        }
        let (_, members) = self.require_membership(channel_id, reader).await?;
        let updated = self
            .deps
            .message_repository
            .mark_read(channel_id, reader)
            .await?;

        Ok(ReadOutcome {
            receipt: ReadReceipt {
                chat_id: channel_id,
                reader_id: reader,
                updated,
            },
            recipients: others(&members, reader),
        })
    }

    pub async fn list_chats(&self, user_id: UserId) -> Result<ChatList, ApplicationError> {
        let user = self.require_user(user_id).await?;
        let channels = self.deps.channel_repository.list_for_user(user_id).await?;

        let mut chats = Vec::with_capacity(channels.len());
        for channel in channels {
            let members = self.deps.channel_repository.list_members(channel.id).await?;
            let unread_count = self
                .deps
                .message_repository
                .count_unread(channel.id, user_id)
                .await?;
            let peer = members.iter().find(|m| m.id != user_id);
            let profile_picture = match peer {
                Some(peer) => self.picture_url(peer).await,
                None => MISSING_OBJECT_URL.to_string(),
            };

            chats.push(ChatSummary {
                id: channel.id,
                name: peer
                    .map(|p| p.username.clone())
                    .unwrap_or_else(|| channel.name.clone()),
                readed: unread_count == 0,
                is_private: channel.is_private,
                profile_picture,
                users: members
                    .iter()
                    .map(|m| MemberInfo::new(m, self.deps.sessions.is_online(m.id)))
                    .collect(),
                other_user_id: peer.map(|p| p.id),
                last_activity: peer.map(|p| p.last_online.to_rfc3339()),
                is_online: peer.is_some_and(|p| self.deps.sessions.is_online(p.id)),
                unread_count,
            });
        }

        let info = ProfileInfo::new(&user, self.picture_url(&user).await);
        Ok(ChatList { chats, info })
    }

    /// 完整历史（按创建时间升序）；`chat_id <= 0` 表示尚未创建，返回空历史
    pub async fn get_chat(
        &self,
        user_id: UserId,
        channel_id: ChannelId,
    ) -> Result<ChatHistory, ApplicationError> {
        if channel_id.value() <= 0 {
            return Ok(ChatHistory {
                chat_id: channel_id,
                messages: Vec::new(),
                readed: true,
                peer: None,
            });
        }

        let (_, members) = self.require_membership(channel_id, user_id).await?;
        let messages = self
            .deps
            .message_repository
            .list_for_channel(channel_id)
            .await?;

        let peer = match members.iter().find(|m| m.id != user_id) {
            Some(peer) => Some(PeerInfo {
                id: peer.id,
                username: peer.username.clone(),
                is_online: self.deps.sessions.is_online(peer.id),
                last_online: peer.last_online.to_rfc3339(),
                profile_picture: self.picture_url(peer).await,
                bio: peer.bio.clone(),
            }),
            None => None,
        };

        Ok(ChatHistory {
            chat_id: channel_id,
            readed: channel_readed_for(&messages, user_id),
            messages: messages.iter().map(HistoryEntry::from).collect(),
            peer,
        })
    }

    /// 按用户名前缀搜索，排除调用者本人
    pub async fn search_users(
        &self,
        user_id: UserId,
        prefix: &str,
    ) -> Result<Vec<UserMatch>, ApplicationError> {
        let found = self.deps.user_repository.search_by_prefix(prefix).await?;
        let mut matches = Vec::with_capacity(found.len());
        for user in found.into_iter().filter(|u| u.id != user_id) {
            let name = PrivateChannelKey::new(user_id, user.id)?.name();
            let chat_id = self
                .deps
                .channel_repository
                .find_by_name(&name)
                .await?
                .map(|channel| channel.id.value())
                .unwrap_or(-1);
            matches.push(UserMatch {
                id: user.id,
                username: user.username.clone(),
                profile_picture: self.picture_url(&user).await,
                chat_id,
            });
        }
        Ok(matches)
    }

    pub async fn create_chat(
        &self,
        user_id: UserId,
        peer: UserId,
    ) -> Result<CreatedChat, ApplicationError> {
        let resolved = self.resolve_private_channel(user_id, peer).await?;
        let key = PrivateChannelKey::new(user_id, peer)?;
        Ok(CreatedChat {
            reply: ChatCreated::new(&resolved.channel, key.members().to_vec(), resolved.created),
            notify: if resolved.created {
                vec![peer]
            } else {
                Vec::new()
            },
        })
    }

    /// 头像按内容 md5 寻址写入对象存储，再更新用户引用
    pub async fn update_profile_picture(
        &self,
        user_id: UserId,
        image: Vec<u8>,
    ) -> Result<ProfilePictureUpdated, ApplicationError> {
        self.require_user(user_id).await?;
        let stem = format!("{:x}", md5::compute(&image));
        let key = profile_object_key(&stem);
        let url = data_url(PROFILE_PICTURE_CONTENT_TYPE, &image);

        self.deps
            .object_store
            .put(&key, image, PROFILE_PICTURE_CONTENT_TYPE)
            .await?;
        self.deps
            .user_repository
            .update_profile_picture(user_id, stem)
            .await?;
        tracing::info!(user_id = %user_id, key = %key, "profile picture updated");

        Ok(ProfilePictureUpdated {
            profile_picture: url,
        })
    }

    /// 修改邮箱、用户名与简介；邮箱或用户名冲突时返回 `CONFLICT`
    pub async fn update_profile(
        &self,
        user_id: UserId,
        update: ProfileUpdate,
    ) -> Result<ProfileInfo, ApplicationError> {
        let user = match self
            .deps
            .user_repository
            .update_profile(user_id, &update)
            .await
        {
            Ok(user) => user,
            Err(RepositoryError::NotFound) => return Err(ApplicationError::UserNotFound),
            Err(err) => return Err(err.into()),
        };
        tracing::info!(user_id = %user_id, username = %user.username, "profile updated");
        let url = self.picture_url(&user).await;
        Ok(ProfileInfo::new(&user, url))
    }

    pub async fn online_status(&self, user_id: UserId) -> Result<OnlineStatus, ApplicationError> {
        let user = self.require_user(user_id).await?;
        Ok(OnlineStatus {
            is_online: self.deps.sessions.is_online(user_id),
            last_online: user.last_online,
        })
    }

    /// 会话中调用者与对端是否互相屏蔽
    pub async fn is_chat_mutually_blocked(
        &self,
        user_id: UserId,
        channel_id: ChannelId,
    ) -> Result<bool, ApplicationError> {
        let (_, members) = self.require_membership(channel_id, user_id).await?;
        for member in members.iter().filter(|m| m.id != user_id) {
            if self
                .deps
                .admission
                .is_mutually_blocked(user_id, member.id)
                .await?
            {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// 连接断开时记录最后在线时间
    pub async fn touch_last_online(&self, user_id: UserId) -> Result<(), ApplicationError> {
        self.deps
            .user_repository
            .touch_last_online(user_id, self.deps.clock.now())
            .await?;
        Ok(())
    }

    pub async fn find_user(&self, user_id: UserId) -> Result<Option<User>, ApplicationError> {
        Ok(self.deps.user_repository.find_by_id(user_id).await?)
    }
}

fn others(members: &[User], actor: UserId) -> Vec<UserId> {
    members
        .iter()
        .map(|m| m.id)
        .filter(|id| *id != actor)
        .collect()
}
