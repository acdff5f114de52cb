use std::sync::Arc;

use application::{
    repository::{BlockRepository, ChannelRepository, MessageRepository, UserRepository},
    storage::{ObjectStore, ObjectStoreError},
    MemoryChatStore, MemoryObjectStore,
};
use config::AppConfig;
use thiserror::Error;

use crate::{
    migrations::MIGRATOR,
    object_store::FsObjectStore,
    repository::{create_pg_pool, PgStorage},
};

#[derive(Debug, Error)]
pub enum InfrastructureError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("object store error: {0}")]
    ObjectStore(#[from] ObjectStoreError),
}

/// 仓储后端
#[derive(Clone)]
pub enum StorageBackend {
    Postgres(Arc<PgStorage>),
    /// 未配置数据库时使用进程内存储
    Memory(MemoryChatStore),
}

#[derive(Clone)]
pub struct Infrastructure {
    pub backend: StorageBackend,
    pub users: Arc<dyn UserRepository>,
    pub channels: Arc<dyn ChannelRepository>,
    pub messages: Arc<dyn MessageRepository>,
    pub blocks: Arc<dyn BlockRepository>,
    pub object_store: Arc<dyn ObjectStore>,
}

impl Infrastructure {
    pub async fn connect(config: &AppConfig) -> Result<Self, InfrastructureError> {
        let object_store: Arc<dyn ObjectStore> = match &config.storage.object_dir {
            Some(dir) => {
                tracing::info!(dir = %dir, "using filesystem object store");
                Arc::new(FsObjectStore::open(dir).await?)
            }
            None => {
                tracing::info!("using in-memory object store");
                Arc::new(MemoryObjectStore::new())
            }
        };

        match &config.database.url {
            Some(url) => {
                let pool = create_pg_pool(url, config.database.max_connections).await?;
                MIGRATOR.run(&pool).await?;
                tracing::info!("数据库连接成功，迁移已执行");
                Ok(Self::postgres(Arc::new(PgStorage::new(pool)), object_store))
            }
            None => {
                tracing::warn!("未配置数据库，使用内存仓储（数据不会持久化）");
                Ok(Self::in_memory(MemoryChatStore::new(), object_store))
            }
        }
    }

    pub fn postgres(storage: Arc<PgStorage>, object_store: Arc<dyn ObjectStore>) -> Self {
        Self {
            users: storage.user_repository.clone(),
            channels: storage.channel_repository.clone(),
            messages: storage.message_repository.clone(),
            blocks: storage.block_repository.clone(),
            backend: StorageBackend::Postgres(storage),
            object_store,
        }
    }

    pub fn in_memory(store: MemoryChatStore, object_store: Arc<dyn ObjectStore>) -> Self {
        Self {
            users: Arc::new(store.clone()),
            channels: Arc::new(store.clone()),
            messages: Arc::new(store.clone()),
            blocks: Arc::new(store.clone()),
            backend: StorageBackend::Memory(store),
            object_store,
        }
    }
}
