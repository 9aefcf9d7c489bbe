//! 消息存储的 PostgreSQL 实现
//!
//! 消息主键是 (channel_id, id)，id 由应用层在频道锁内分配，
//! 这里只负责持久化与按 id 翻页。

use std::sync::Arc;

use application::repository::MessageRepository;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{ChannelId, Message, MessageId, MessageText, RepositoryError, UserId};
use sqlx::{query, query_as, query_scalar, FromRow};

use crate::db::{map_sqlx_error, DbPool};

#[derive(Debug, Clone, FromRow)]
struct DbMessage {
    pub id: i64,
    pub user_id: i64,
    pub time: DateTime<Utc>,
    pub text: String,
}

impl TryFrom<DbMessage> for Message {
    type Error = RepositoryError;

    fn try_from(row: DbMessage) -> Result<Self, Self::Error> {
        let text = MessageText::new(row.text)
            .map_err(|err| RepositoryError::database(err.to_string()))?;
        Ok(Message::new(
            MessageId::new(row.id),
            UserId::new(row.user_id),
            row.time,
            text,
        ))
    }
}

pub struct PostgresMessageRepository {
    pool: Arc<DbPool>,
}

impl PostgresMessageRepository {
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageRepository for PostgresMessageRepository {
    async fn insert(&self, channel: &ChannelId, message: &Message) -> Result<(), RepositoryError> {
        query(
            r#"
            INSERT INTO messages (channel_id, id, user_id, time, text)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(channel.as_str())
        .bind(message.id.as_i64())
        .bind(message.user.as_i64())
        .bind(message.time)
        .bind(message.text.as_str())
        .execute(&*self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn list_recent(
        &self,
        channel: &ChannelId,
        limit: u32,
    ) -> Result<Vec<Message>, RepositoryError> {
        // 倒序取最新 N 条，再反转成升序
        let mut rows = query_as::<_, DbMessage>(
            r#"
            SELECT id, user_id, time, text
            FROM messages
            WHERE channel_id = $1
            ORDER BY id DESC
            LIMIT $2
            "#,
        )
        .bind(channel.as_str())
        .bind(limit as i64)
        .fetch_all(&*self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.reverse();
        rows.into_iter().map(Message::try_from).collect()
    }

    async fn list_before(
        &self,
        channel: &ChannelId,
        before: MessageId,
        limit: u32,
    ) -> Result<Vec<Message>, RepositoryError> {
        let mut rows = query_as::<_, DbMessage>(
            r#"
            SELECT id, user_id, time, text
            FROM messages
            WHERE channel_id = $1 AND id < $2
            ORDER BY id DESC
            LIMIT $3
            "#,
        )
        .bind(channel.as_str())
        .bind(before.as_i64())
        .bind(limit as i64)
        .fetch_all(&*self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.reverse();
        rows.into_iter().map(Message::try_from).collect()
    }

    async fn max_id(&self, channel: &ChannelId) -> Result<i64, RepositoryError> {
        let max: i64 =
            query_scalar("SELECT COALESCE(MAX(id), 0) FROM messages WHERE channel_id = $1")
                .bind(channel.as_str())
                .fetch_one(&*self.pool)
                .await
                .map_err(map_sqlx_error)?;
        Ok(max)
    }
}
