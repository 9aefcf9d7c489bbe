//! 消息服务核心领域模型
//!
//! 包含用户、频道、消息、会话等核心实体，以及相关的校验规则。

pub mod channel;
pub mod errors;
pub mod message;
pub mod session;
pub mod user;
pub mod value_objects;

// 重新导出常用类型
pub use channel::{AppData, Channel, ChannelRecord};
pub use errors::{DomainError, DomainResult, RepositoryError};
pub use message::Message;
pub use session::{SessionState, TokenPair};
pub use user::{User, UserView};
pub use value_objects::{
    ChannelId, MessageId, MessageText, PasswordHash, Timestamp, UserEmail, UserId, Username,
};
