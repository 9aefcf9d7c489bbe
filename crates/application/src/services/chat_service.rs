use std::sync::Arc;

use domain::{Channel, Message, MessageId};
use uuid::Uuid;

use crate::{
    channels::ChannelDirectory, clock::Clock, error::ApplicationError,
    session::{AuthenticatedUser, SessionRegistry},
};

pub struct ChatServiceDependencies {
    pub registry: Arc<SessionRegistry>,
    pub directory: Arc<ChannelDirectory>,
    pub clock: Arc<dyn Clock>,
}

/// 频道与消息用例：选择、翻页、投递、断线清理。
/// 并发控制在 [`ChannelDirectory`] 内部，这里只做编排。
pub struct ChatService {
    deps: ChatServiceDependencies,
}

impl ChatService {
    pub fn new(deps: ChatServiceDependencies) -> Self {
        Self { deps }
    }

    /// 选择频道并返回快照。会话当前若绑定了实时连接，则该连接开始
    /// 接收此频道的推送。
    pub async fn select(
        &self,
        auth: &AuthenticatedUser,
        raw_channel: &str,
    ) -> Result<Channel, ApplicationError> {
        let connection = self.deps.registry.connection(auth.session_id).await;
        self.deps
            .directory
            .select(&auth.user, connection, raw_channel)
            .await
    }

    /// 取频道内更早的消息页。
    pub async fn history(
        &self,
        auth: &AuthenticatedUser,
        raw_channel: &str,
        before: Option<MessageId>,
        limit: u32,
    ) -> Result<Vec<Message>, ApplicationError> {
        self.deps
            .directory
            .history(auth.user.id, raw_channel, before, limit)
            .await
    }

    /// 投递消息。服务端盖时间戳，id 在频道内严格递增。
    pub async fn submit(
        &self,
        auth: &AuthenticatedUser,
        raw_channel: &str,
        text: &str,
    ) -> Result<Message, ApplicationError> {
        let now = self.deps.clock.now();
        self.deps
            .directory
            .submit(auth.user.id, raw_channel, text, now)
            .await
    }

    /// 实时连接断开：解除句柄绑定并把用户移出所有在场集合。
    pub async fn disconnect(&self, session_id: Uuid) {
        if let Some(user_id) = self.deps.registry.detach_connection(session_id).await {
            self.deps.directory.disconnect(user_id).await;
        }
    }
}
