//! 频道存储的 PostgreSQL 实现

use std::sync::Arc;

use application::repository::ChannelRepository;
use async_trait::async_trait;
use domain::{ChannelId, ChannelRecord, RepositoryError};
use sqlx::{query, query_as, FromRow};

use crate::db::{map_sqlx_error, DbPool};

#[derive(Debug, Clone, FromRow)]
struct DbChannel {
    pub id: String,
    pub name: String,
}

impl TryFrom<DbChannel> for ChannelRecord {
    type Error = RepositoryError;

    fn try_from(row: DbChannel) -> Result<Self, Self::Error> {
        let id = ChannelId::parse(row.id)
            .map_err(|err| RepositoryError::database(err.to_string()))?;
        Ok(ChannelRecord::new(id, row.name))
    }
}

pub struct PostgresChannelRepository {
    pool: Arc<DbPool>,
}

impl PostgresChannelRepository {
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChannelRepository for PostgresChannelRepository {
    async fn find_by_id(&self, id: &ChannelId) -> Result<Option<ChannelRecord>, RepositoryError> {
        let row = query_as::<_, DbChannel>("SELECT id, name FROM channels WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&*self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(ChannelRecord::try_from).transpose()
    }

    async fn create_if_absent(&self, record: &ChannelRecord) -> Result<(), RepositoryError> {
        // 并发首次选择同一私聊频道时，落库由主键去重
        query("INSERT INTO channels (id, name) VALUES ($1, $2) ON CONFLICT (id) DO NOTHING")
            .bind(record.id.as_str())
            .bind(&record.name)
            .execute(&*self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn list_static(&self) -> Result<Vec<ChannelRecord>, RepositoryError> {
        let rows = query_as::<_, DbChannel>(
            r#"
            SELECT id, name
            FROM channels
            WHERE id NOT LIKE 'dm:%'
            ORDER BY id
            "#,
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(ChannelRecord::try_from).collect()
    }
}
