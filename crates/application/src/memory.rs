//! 内存实现
//!
//! 单进程内的仓储与对象存储，实现与 PostgreSQL 版本相同的约束（会话名唯一、
//! 批量已读、原子解封），用于开发环境和测试。

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use domain::{
    BlockRelation, Channel, ChannelId, Message, MessageId, NewChannel, NewMessage,
    ProfileUpdate, RepositoryError, Timestamp, User, UserId,
};
use tokio::sync::RwLock;

use crate::repository::{BlockRepository, ChannelRepository, MessageRepository, UserRepository};
use crate::storage::{ObjectStore, ObjectStoreError, StoredObject};

#[derive(Default)]
struct MemoryState {
    users: BTreeMap<UserId, User>,
    channels: BTreeMap<ChannelId, Channel>,
    channel_names: HashMap<String, ChannelId>,
    members: HashMap<ChannelId, Vec<UserId>>,
    messages: Vec<Message>,
    blocks: HashSet<BlockRelation>,
    next_user_id: i64,
    next_channel_id: i64,
    next_message_id: i64,
}

impl MemoryState {
    fn next_user_id(&mut self) -> UserId {
        self.next_user_id += 1;
        UserId::new(self.next_user_id)
    }

    fn next_channel_id(&mut self) -> ChannelId {
        self.next_channel_id += 1;
        ChannelId::new(self.next_channel_id)
    }

    fn next_message_id(&mut self) -> MessageId {
        self.next_message_id += 1;
        MessageId::new(self.next_message_id)
    }
}

/// 内存聊天仓储，同时实现用户、会话、消息、拉黑四个仓储接口
#[derive(Clone, Default)]
pub struct MemoryChatStore {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 新建用户（注册流程不在本服务内，开发与测试时用于准备数据）
    pub async fn add_user(&self, username: impl Into<String>, now: Timestamp) -> User {
        let mut state = self.state.write().await;
        let id = state.next_user_id();
        let user = User::new(id, username, now);
        state.users.insert(id, user.clone());
        user
    }

    /// 当前会话总数
    pub async fn channel_count(&self) -> usize {
        self.state.read().await.channels.len()
    }
}

#[async_trait]
impl UserRepository for MemoryChatStore {
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn search_by_prefix(&self, prefix: &str) -> Result<Vec<User>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .users
            .values()
            .filter(|user| user.username.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn update_profile_picture(
        &self,
        id: UserId,
        picture: String,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        let user = state.users.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        user.profile_picture = Some(picture);
        Ok(())
    }

    async fn update_profile(
        &self,
        id: UserId,
        update: &ProfileUpdate,
    ) -> Result<User, RepositoryError> {
        let mut state = self.state.write().await;
        let taken = state.users.values().any(|other| {
            other.id != id
                && (other.username == update.username()
                    || other.mail.as_deref() == Some(update.mail()))
        });
        if taken {
            return Err(RepositoryError::Conflict);
        }
        let user = state.users.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        update.apply(user);
        Ok(user.clone())
    }

    async fn touch_last_online(&self, id: UserId, at: Timestamp) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        if let Some(user) = state.users.get_mut(&id) {
            user.last_online = at;
        }
        Ok(())
    }

    async fn block_account_until(
        &self,
        id: UserId,
        until: Timestamp,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        let user = state.users.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        user.is_blocked = true;
        user.blocked_until = Some(until);
        Ok(())
    }

    async fn sweep_expired_blocks(&self, now: Timestamp) -> Result<u64, RepositoryError> {
        let mut state = self.state.write().await;
        let mut cleared = 0;
        for user in state.users.values_mut() {
            if user.block_expired(now) {
                user.is_blocked = false;
                cleared += 1;
            }
        }
        Ok(cleared)
    }
}

#[async_trait]
impl ChannelRepository for MemoryChatStore {
    async fn find_by_id(&self, id: ChannelId) -> Result<Option<Channel>, RepositoryError> {
        Ok(self.state.read().await.channels.get(&id).cloned())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Channel>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .channel_names
            .get(name)
            .and_then(|id| state.channels.get(id))
            .cloned())
    }

    async fn create(&self, channel: NewChannel) -> Result<Channel, RepositoryError> {
        let mut state = self.state.write().await;
        if state.channel_names.contains_key(&channel.name) {
            return Err(RepositoryError::Conflict);
        }
        if let Some(missing) = channel
            .members
            .iter()
            .find(|member| !state.users.contains_key(member))
        {
            return Err(RepositoryError::storage(format!(
                "foreign key violation: user {missing} does not exist"
            )));
        }

        let id = state.next_channel_id();
        let created = Channel {
            id,
            name: channel.name,
            description: channel.description,
            is_private: channel.is_private,
            creator_id: channel.creator_id,
            created_at: channel.created_at,
        };
        state.channel_names.insert(created.name.clone(), id);
        state.members.insert(id, channel.members);
        state.channels.insert(id, created.clone());
        Ok(created)
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Channel>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .channels
            .values()
            .filter(|channel| {
                state
                    .members
                    .get(&channel.id)
                    .is_some_and(|members| members.contains(&user_id))
            })
            .cloned()
            .collect())
    }

    async fn list_members(&self, channel_id: ChannelId) -> Result<Vec<User>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .members
            .get(&channel_id)
            .map(|members| {
                members
                    .iter()
                    .filter_map(|id| state.users.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl MessageRepository for MemoryChatStore {
    async fn create(&self, message: NewMessage) -> Result<Message, RepositoryError> {
        let mut state = self.state.write().await;
        if !state.channels.contains_key(&message.channel_id) {
            return Err(RepositoryError::NotFound);
        }
        let id = state.next_message_id();
        let persisted = message.persisted(id);
        state.messages.push(persisted.clone());
        Ok(persisted)
    }

    async fn list_for_channel(
        &self,
        channel_id: ChannelId,
    ) -> Result<Vec<Message>, RepositoryError> {
        let state = self.state.read().await;
        let mut messages: Vec<Message> = state
            .messages
            .iter()
            .filter(|m| m.channel_id == channel_id)
            .cloned()
            .collect();
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(messages)
    }

    async fn mark_read(
        &self,
        channel_id: ChannelId,
        reader: UserId,
    ) -> Result<u64, RepositoryError> {
        let mut state = self.state.write().await;
        let mut updated = 0;
        for message in state
            .messages
            .iter_mut()
            .filter(|m| m.channel_id == channel_id && m.is_unread_for(reader))
        {
            message.readed = true;
            updated += 1;
        }
        Ok(updated)
    }

    async fn count_unread(
        &self,
        channel_id: ChannelId,
        reader: UserId,
    ) -> Result<u64, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .messages
            .iter()
            .filter(|m| m.channel_id == channel_id && m.is_unread_for(reader))
            .count() as u64)
    }
}

#[async_trait]
impl BlockRepository for MemoryChatStore {
    async fn insert(&self, relation: BlockRelation) -> Result<(), RepositoryError> {
        self.state.write().await.blocks.insert(relation);
        Ok(())
    }

    async fn remove(&self, relation: BlockRelation) -> Result<(), RepositoryError> {
        self.state.write().await.blocks.remove(&relation);
        Ok(())
    }

    async fn exists(&self, blocker: UserId, blocked: UserId) -> Result<bool, RepositoryError> {
        Ok(self
            .state
            .read()
            .await
            .blocks
            .contains(&BlockRelation { blocker, blocked }))
    }

    async fn count_blockers(&self, blocked: UserId) -> Result<u64, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.blocks.iter().filter(|r| r.blocked == blocked).count() as u64)
    }
}

/// 内存对象存储
#[derive(Clone, Default)]
pub struct MemoryObjectStore {
    objects: Arc<RwLock<HashMap<String, StoredObject>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), ObjectStoreError> {
        if key.is_empty() {
            return Err(ObjectStoreError::InvalidKey(key.to_string()));
        }
        self.objects.write().await.insert(
            key.to_string(),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<StoredObject>, ObjectStoreError> {
        Ok(self.objects.read().await.get(key).cloned())
    }
}
