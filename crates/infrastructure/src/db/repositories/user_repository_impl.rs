//! 用户存储的 PostgreSQL 实现

use std::sync::Arc;

use application::repository::UserRepository;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{PasswordHash, RepositoryError, User, UserEmail, UserId, Username};
use sqlx::{query, query_as, FromRow};

use crate::db::{map_sqlx_error, DbPool};

/// 数据库用户行
#[derive(Debug, Clone, FromRow)]
struct DbUser {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<DbUser> for User {
    type Error = RepositoryError;

    fn try_from(row: DbUser) -> Result<Self, Self::Error> {
        // 行数据写入时已校验，这里解析失败说明库里有脏数据
        Ok(User {
            id: UserId::new(row.id),
            username: Username::parse(row.username)
                .map_err(|err| RepositoryError::database(err.to_string()))?,
            email: UserEmail::parse(row.email)
                .map_err(|err| RepositoryError::database(err.to_string()))?,
            password: PasswordHash::new(row.password_hash)
                .map_err(|err| RepositoryError::database(err.to_string()))?,
            created_at: row.created_at,
        })
    }
}

pub struct PostgresUserRepository {
    pool: Arc<DbPool>,
}

impl PostgresUserRepository {
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PostgresUserRepository {
    async fn create(
        &self,
        username: &Username,
        email: &UserEmail,
        password: &PasswordHash,
    ) -> Result<User, RepositoryError> {
        let row = query_as::<_, DbUser>(
            r#"
            INSERT INTO users (username, email, password_hash)
            VALUES ($1, $2, $3)
            RETURNING id, username, email, password_hash, created_at
            "#,
        )
        .bind(username.as_str())
        .bind(email.as_str())
        .bind(password.as_str())
        .fetch_one(&*self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.try_into()
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let row = query_as::<_, DbUser>(
            r#"
            SELECT id, username, email, password_hash, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id.as_i64())
        .fetch_optional(&*self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(User::try_from).transpose()
    }

    async fn find_by_login(&self, login: &str) -> Result<Option<User>, RepositoryError> {
        // 邮箱入库前统一小写，比较时把输入也转小写
        let row = query_as::<_, DbUser>(
            r#"
            SELECT id, username, email, password_hash, created_at
            FROM users
            WHERE username = $1 OR email = lower($1)
            "#,
        )
        .bind(login)
        .fetch_optional(&*self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(User::try_from).transpose()
    }

    async fn find_by_email(&self, email: &UserEmail) -> Result<Option<User>, RepositoryError> {
        let row = query_as::<_, DbUser>(
            r#"
            SELECT id, username, email, password_hash, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email.as_str())
        .fetch_optional(&*self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(User::try_from).transpose()
    }

    async fn update_password(
        &self,
        id: UserId,
        password: &PasswordHash,
    ) -> Result<(), RepositoryError> {
        let result = query("UPDATE users SET password_hash = $2 WHERE id = $1")
            .bind(id.as_i64())
            .bind(password.as_str())
            .execute(&*self.pool)
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}
