use async_trait::async_trait;
use domain::{
    BlockRelation, Channel, ChannelId, Message, NewChannel, NewMessage, ProfileUpdate,
    RepositoryError, Timestamp, User, UserId,
};

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError>;

    // 按用户名前缀搜索
    async fn search_by_prefix(&self, prefix: &str) -> Result<Vec<User>, RepositoryError>;

    async fn update_profile_picture(
        &self,
        id: UserId,
        picture: String,
    ) -> Result<(), RepositoryError>;

    // 邮箱或用户名被他人占用时返回 `RepositoryError::Conflict`
    async fn update_profile(
        &self,
        id: UserId,
        update: &ProfileUpdate,
    ) -> Result<User, RepositoryError>;

    async fn touch_last_online(&self, id: UserId, at: Timestamp) -> Result<(), RepositoryError>;

    // 账号级封禁，直到 `until`
    async fn block_account_until(
        &self,
        id: UserId,
        until: Timestamp,
    ) -> Result<(), RepositoryError>;

    // 一次性解除所有 `blocked_until <= now` 的账号封禁，返回解除数量
    async fn sweep_expired_blocks(&self, now: Timestamp) -> Result<u64, RepositoryError>;
}

#[async_trait]
pub trait ChannelRepository: Send + Sync {
    async fn find_by_id(&self, id: ChannelId) -> Result<Option<Channel>, RepositoryError>;
    async fn find_by_name(&self, name: &str) -> Result<Option<Channel>, RepositoryError>;

    // 会话名唯一；重名时返回 `RepositoryError::Conflict`
    async fn create(&self, channel: NewChannel) -> Result<Channel, RepositoryError>;

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Channel>, RepositoryError>;
    async fn list_members(&self, channel_id: ChannelId) -> Result<Vec<User>, RepositoryError>;
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn create(&self, message: NewMessage) -> Result<Message, RepositoryError>;

    // 按创建时间升序返回
    async fn list_for_channel(&self, channel_id: ChannelId)
        -> Result<Vec<Message>, RepositoryError>;

    // 将会话中非 `reader` 发送的未读消息全部标记为已读，返回更新条数
    async fn mark_read(&self, channel_id: ChannelId, reader: UserId)
        -> Result<u64, RepositoryError>;

    async fn count_unread(
        &self,
        channel_id: ChannelId,
        reader: UserId,
    ) -> Result<u64, RepositoryError>;
}

#[async_trait]
pub trait BlockRepository: Send + Sync {
    // 幂等插入
    async fn insert(&self, relation: BlockRelation) -> Result<(), RepositoryError>;
    async fn remove(&self, relation: BlockRelation) -> Result<(), RepositoryError>;
    async fn exists(&self, blocker: UserId, blocked: UserId) -> Result<bool, RepositoryError>;

    // 当前拉黑了 `blocked` 的不同用户数
    async fn count_blockers(&self, blocked: UserId) -> Result<u64, RepositoryError>;
}
