//! 数据库连接池与错误映射。

use std::time::Duration;

use config::DatabaseConfig;
use domain::RepositoryError;
use sqlx::{postgres::PgPoolOptions, Pool, Postgres};

pub mod repositories;

pub type DbPool = Pool<Postgres>;

/// 按配置建立连接池。
///
/// 连接获取超时设置得比语句执行更短：池被打满时调用方应尽快拿到
/// [`RepositoryError::Timeout`] 并自行决定重试，而不是排队等待。
pub async fn create_pg_pool(config: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect(&config.url)
        .await
}

/// sqlx 错误到存储层错误的统一映射。
///
/// 唯一索引冲突与超时需要调用方区分处理，其余错误折叠成 Database。
pub(crate) fn map_sqlx_error(err: sqlx::Error) -> RepositoryError {
    match err {
        sqlx::Error::PoolTimedOut => RepositoryError::Timeout,
        sqlx::Error::RowNotFound => RepositoryError::NotFound,
        sqlx::Error::Database(db) if db.is_unique_violation() => RepositoryError::Conflict,
        other => RepositoryError::database(other.to_string()),
    }
}
