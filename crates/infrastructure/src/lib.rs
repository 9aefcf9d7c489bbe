//! 基础设施层
//!
//! 应用层端口的具体实现：PostgreSQL 存储与 bcrypt 密码哈希。

pub mod db;
pub mod password;

pub use db::repositories::{
    PostgresChannelRepository, PostgresMessageRepository, PostgresUserRepository,
};
pub use db::{create_pg_pool, DbPool};
pub use password::BcryptPasswordHasher;
