use async_trait::async_trait;
use domain::{
    ChannelId, ChannelRecord, Message, MessageId, PasswordHash, RepositoryError, User, UserEmail,
    UserId, Username,
};

/// 用户存储。唯一索引由底层存储保证，冲突以 [`RepositoryError::Conflict`] 上报。
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(
        &self,
        username: &Username,
        email: &UserEmail,
        password: &PasswordHash,
    ) -> Result<User, RepositoryError>;

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError>;

    /// 登录查找：`login` 可以是用户名或邮箱
    async fn find_by_login(&self, login: &str) -> Result<Option<User>, RepositoryError>;

    async fn find_by_email(&self, email: &UserEmail) -> Result<Option<User>, RepositoryError>;

    async fn update_password(
        &self,
        id: UserId,
        password: &PasswordHash,
    ) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ChannelRepository: Send + Sync {
    async fn find_by_id(&self, id: &ChannelId) -> Result<Option<ChannelRecord>, RepositoryError>;

    /// 幂等创建：并发创建同一频道只会落库一次
    async fn create_if_absent(&self, record: &ChannelRecord) -> Result<(), RepositoryError>;

    /// 所有静态频道（登录快照用）
    async fn list_static(&self) -> Result<Vec<ChannelRecord>, RepositoryError>;
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// 持久化一条消息。(channel, id) 是主键，重复插入以冲突上报。
    async fn insert(&self, channel: &ChannelId, message: &Message) -> Result<(), RepositoryError>;

    /// 频道内最新的 `limit` 条，按 id 升序返回
    async fn list_recent(
        &self,
        channel: &ChannelId,
        limit: u32,
    ) -> Result<Vec<Message>, RepositoryError>;

    /// 向过去翻页：id 小于 `before` 的最新 `limit` 条，按 id 升序返回
    async fn list_before(
        &self,
        channel: &ChannelId,
        before: MessageId,
        limit: u32,
    ) -> Result<Vec<Message>, RepositoryError>;

    /// 频道内已分配的最大消息 id；空频道为 0
    async fn max_id(&self, channel: &ChannelId) -> Result<i64, RepositoryError>;
}
