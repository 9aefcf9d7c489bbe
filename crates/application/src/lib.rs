//! 应用层实现。
//!
//! 这里提供围绕领域模型的用例服务：令牌签发与会话注册表、频道目录与
//! 消息路由、请求分发器，以及对外部适配器（密码哈希、存储、时钟）的抽象。

pub mod channels;
pub mod clock;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod password;
pub mod repository;
pub mod services;
pub mod session;
pub mod sweeper;
pub mod token;


pub use channels::ChannelDirectory;
pub use clock::{Clock, SystemClock};
pub use connection::{ConnectionHandle, ServerEvent};
pub use dispatch::{ApiResponse, Dispatcher, DispatcherDependencies};
pub use error::ApplicationError;
pub use password::{PasswordHasher, PasswordHasherError};
pub use repository::{ChannelRepository, MessageRepository, UserRepository};
pub use services::{
    AuthService, AuthServiceDependencies, ChatService, ChatServiceDependencies,
};
pub use session::{AuthenticatedUser, SessionRegistry};
