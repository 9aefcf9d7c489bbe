//! 存储接口的 PostgreSQL 实现。

mod channel_repository_impl;
mod message_repository_impl;
mod user_repository_impl;

pub use channel_repository_impl::PostgresChannelRepository;
pub use message_repository_impl::PostgresMessageRepository;
pub use user_repository_impl::PostgresUserRepository;
