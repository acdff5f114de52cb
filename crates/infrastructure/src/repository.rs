use std::sync::Arc;

use application::repository::{
    BlockRepository, ChannelRepository, MessageRepository, UserRepository,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    BlockRelation, Channel, ChannelId, Message, MessageBody, MessageId, NewChannel, NewMessage,
    ProfileUpdate, RepositoryError, Timestamp, User, UserId,
};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};

fn map_sqlx_err(err: sqlx::Error) -> RepositoryError {
    match &err {
        sqlx::Error::RowNotFound => RepositoryError::NotFound,
        sqlx::Error::Database(db) if db.is_unique_violation() => RepositoryError::Conflict,
        _ => RepositoryError::storage(err.to_string()),
    }
}

fn invalid_data(message: impl Into<String>) -> RepositoryError {
    RepositoryError::storage(message)
}

// LIKE 前缀匹配时转义通配符
fn like_prefix(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len() + 1);
    for ch in prefix.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

#[derive(Debug, FromRow)]
struct UserRecord {
    id: i64,
    username: String,
    mail: Option<String>,
    is_blocked: bool,
    blocked_until: Option<DateTime<Utc>>,
    last_online: DateTime<Utc>,
    profile_picture: Option<String>,
    bio: String,
}

impl From<UserRecord> for User {
    fn from(value: UserRecord) -> Self {
        User {
            id: UserId::new(value.id),
            username: value.username,
            mail: value.mail,
            is_blocked: value.is_blocked,
            blocked_until: value.blocked_until,
            last_online: value.last_online,
            profile_picture: value.profile_picture,
            bio: value.bio,
        }
    }
}

const USER_COLUMNS: &str =
    "id, username, mail, is_blocked, blocked_until, last_online, profile_picture, bio";

#[derive(Debug, FromRow)]
struct ChannelRecord {
    id: i64,
    name: String,
    description: String,
    is_private: bool,
    creator_id: i64,
    created_at: DateTime<Utc>,
}

impl From<ChannelRecord> for Channel {
    fn from(value: ChannelRecord) -> Self {
        Channel {
            id: ChannelId::new(value.id),
            name: value.name,
            description: value.description,
            is_private: value.is_private,
            creator_id: UserId::new(value.creator_id),
            created_at: value.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct MessageRecord {
    id: i64,
    channel_id: i64,
    sender_id: i64,
    body: String,
    created_at: DateTime<Utc>,
    edited: bool,
    readed: bool,
}

impl TryFrom<MessageRecord> for Message {
    type Error = RepositoryError;

    fn try_from(value: MessageRecord) -> Result<Self, Self::Error> {
        let body = MessageBody::new(value.body).map_err(|err| invalid_data(err.to_string()))?;
        Ok(Message {
            id: MessageId::new(value.id),
            channel_id: ChannelId::new(value.channel_id),
            sender_id: UserId::new(value.sender_id),
            body,
            created_at: value.created_at,
            edited: value.edited,
            readed: value.readed,
        })
    }
}

#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 新建用户（注册流程在本服务之外，这里供初始化数据和测试使用）
    pub async fn create(&self, username: &str, now: Timestamp) -> Result<User, RepositoryError> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "INSERT INTO users (username, last_online) VALUES ($1, $2) RETURNING {USER_COLUMNS}"
        ))
        .bind(username)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(record.into())
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id.value())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(record.map(User::from))
    }

    async fn search_by_prefix(&self, prefix: &str) -> Result<Vec<User>, RepositoryError> {
        let records = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username LIKE $1 ESCAPE '\\' ORDER BY id"
        ))
        .bind(like_prefix(prefix))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(records.into_iter().map(User::from).collect())
    }

    async fn update_profile_picture(
        &self,
        id: UserId,
        picture: String,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE users SET profile_picture = $2 WHERE id = $1")
            .bind(id.value())
            .bind(picture)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn update_profile(
        &self,
        id: UserId,
        update: &ProfileUpdate,
    ) -> Result<User, RepositoryError> {
        // 唯一约束冲突由 map_sqlx_err 转为 Conflict；行不存在时为 NotFound
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "UPDATE users SET mail = $2, username = $3, bio = $4 WHERE id = $1 \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(id.value())
        .bind(update.mail())
        .bind(update.username())
        .bind(update.bio())
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(record.into())
    }

    async fn touch_last_online(&self, id: UserId, at: Timestamp) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE users SET last_online = $2 WHERE id = $1")
            .bind(id.value())
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        Ok(())
    }

    async fn block_account_until(
        &self,
        id: UserId,
        until: Timestamp,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE users SET is_blocked = TRUE, blocked_until = $2 WHERE id = $1",
        )
        .bind(id.value())
        .bind(until)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn sweep_expired_blocks(&self, now: Timestamp) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            "UPDATE users SET is_blocked = FALSE \
             WHERE is_blocked AND blocked_until IS NOT NULL AND blocked_until <= $1",
        )
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(result.rows_affected())
    }
}

#[derive(Clone)]
pub struct PgChannelRepository {
    pool: PgPool,
}

impl PgChannelRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChannelRepository for PgChannelRepository {
    async fn find_by_id(&self, id: ChannelId) -> Result<Option<Channel>, RepositoryError> {
        let record = sqlx::query_as::<_, ChannelRecord>(
            r#"
            SELECT id, name, description, is_private, creator_id, created_at
            FROM channels WHERE id = $1
            "#,
        )
        .bind(id.value())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(record.map(Channel::from))
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Channel>, RepositoryError> {
        let record = sqlx::query_as::<_, ChannelRecord>(
            r#"
            SELECT id, name, description, is_private, creator_id, created_at
            FROM channels WHERE name = $1
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(record.map(Channel::from))
    }

    async fn create(&self, channel: NewChannel) -> Result<Channel, RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;

        let record = sqlx::query_as::<_, ChannelRecord>(
            r#"
            INSERT INTO channels (name, description, is_private, creator_id, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, name, description, is_private, creator_id, created_at
            "#,
        )
        .bind(&channel.name)
        .bind(&channel.description)
        .bind(channel.is_private)
        .bind(channel.creator_id.value())
        .bind(channel.created_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;

        for member in &channel.members {
            sqlx::query("INSERT INTO user_channels (channel_id, user_id) VALUES ($1, $2)")
                .bind(record.id)
                .bind(member.value())
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_err)?;
        }

        tx.commit().await.map_err(map_sqlx_err)?;
        Ok(record.into())
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Channel>, RepositoryError> {
        let records = sqlx::query_as::<_, ChannelRecord>(
            r#"
            SELECT c.id, c.name, c.description, c.is_private, c.creator_id, c.created_at
            FROM channels c
            JOIN user_channels uc ON uc.channel_id = c.id
            WHERE uc.user_id = $1
            ORDER BY c.id
            "#,
        )
        .bind(user_id.value())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(records.into_iter().map(Channel::from).collect())
    }

    async fn list_members(&self, channel_id: ChannelId) -> Result<Vec<User>, RepositoryError> {
        let records = sqlx::query_as::<_, UserRecord>(
            r#"
            SELECT u.id, u.username, u.mail, u.is_blocked, u.blocked_until, u.last_online,
                   u.profile_picture, u.bio
            FROM users u
            JOIN user_channels uc ON uc.user_id = u.id
            WHERE uc.channel_id = $1
            ORDER BY u.id
            "#,
        )
        .bind(channel_id.value())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(records.into_iter().map(User::from).collect())
    }
}

#[derive(Clone)]
pub struct PgMessageRepository {
    pool: PgPool,
}

impl PgMessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    async fn create(&self, message: NewMessage) -> Result<Message, RepositoryError> {
        let record = sqlx::query_as::<_, MessageRecord>(
            r#"
            INSERT INTO messages (channel_id, sender_id, body, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id, channel_id, sender_id, body, created_at, edited, readed
            "#,
        )
        .bind(message.channel_id.value())
        .bind(message.sender_id.value())
        .bind(message.body.as_str())
        .bind(message.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Message::try_from(record)
    }

    async fn list_for_channel(
        &self,
        channel_id: ChannelId,
    ) -> Result<Vec<Message>, RepositoryError> {
        let records = sqlx::query_as::<_, MessageRecord>(
            r#"
            SELECT id, channel_id, sender_id, body, created_at, edited, readed
            FROM messages
            WHERE channel_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(channel_id.value())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        records.into_iter().map(Message::try_from).collect()
    }

    async fn mark_read(
        &self,
        channel_id: ChannelId,
        reader: UserId,
    ) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE messages SET readed = TRUE
            WHERE channel_id = $1 AND sender_id <> $2 AND NOT readed
            "#,
        )
        .bind(channel_id.value())
        .bind(reader.value())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(result.rows_affected())
    }

    async fn count_unread(
        &self,
        channel_id: ChannelId,
        reader: UserId,
    ) -> Result<u64, RepositoryError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM messages
            WHERE channel_id = $1 AND sender_id <> $2 AND NOT readed
            "#,
        )
        .bind(channel_id.value())
        .bind(reader.value())
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(count.max(0) as u64)
    }
}

#[derive(Clone)]
pub struct PgBlockRepository {
    pool: PgPool,
}

impl PgBlockRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BlockRepository for PgBlockRepository {
    async fn insert(&self, relation: BlockRelation) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO user_blocks (blocker_id, blocked_id)
            VALUES ($1, $2)
            ON CONFLICT (blocker_id, blocked_id) DO NOTHING
            "#,
        )
        .bind(relation.blocker.value())
        .bind(relation.blocked.value())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(())
    }

    async fn remove(&self, relation: BlockRelation) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM user_blocks WHERE blocker_id = $1 AND blocked_id = $2")
            .bind(relation.blocker.value())
            .bind(relation.blocked.value())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        Ok(())
    }

    async fn exists(&self, blocker: UserId, blocked: UserId) -> Result<bool, RepositoryError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM user_blocks WHERE blocker_id = $1 AND blocked_id = $2)",
        )
        .bind(blocker.value())
        .bind(blocked.value())
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(exists)
    }

    async fn count_blockers(&self, blocked: UserId) -> Result<u64, RepositoryError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(DISTINCT blocker_id) FROM user_blocks WHERE blocked_id = $1",
        )
        .bind(blocked.value())
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(count.max(0) as u64)
    }
}

pub struct PgStorage {
    pub pool: PgPool,
    pub user_repository: Arc<PgUserRepository>,
    pub channel_repository: Arc<PgChannelRepository>,
    pub message_repository: Arc<PgMessageRepository>,
    pub block_repository: Arc<PgBlockRepository>,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        Self {
            user_repository: Arc::new(PgUserRepository::new(pool.clone())),
            channel_repository: Arc::new(PgChannelRepository::new(pool.clone())),
            message_repository: Arc::new(PgMessageRepository::new(pool.clone())),
            block_repository: Arc::new(PgBlockRepository::new(pool.clone())),
            pool,
        }
    }
}

pub async fn create_pg_pool(
    database_url: &str,
    max_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}
