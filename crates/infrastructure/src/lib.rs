//! 基础设施层实现。
//!
//! 提供 PostgreSQL 仓储、本地目录对象存储以及按配置装配存储后端的构建器，
//! 实现应用层定义的接口。

pub mod builder;
pub mod migrations;
pub mod object_store;
pub mod repository;

pub use builder::{Infrastructure, InfrastructureError, StorageBackend};
pub use migrations::MIGRATOR;
pub use object_store::FsObjectStore;
pub use repository::{
    create_pg_pool, PgBlockRepository, PgChannelRepository, PgMessageRepository, PgStorage,
    PgUserRepository,
};
