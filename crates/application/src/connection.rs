//! 实时连接句柄。
//!
//! 每个已连接客户端对应一个有界 mpsc 发送端；推送走 `try_send`，
//! 单个收件人的信箱满或断开不影响其他收件人，也不影响触发推送的请求。

use domain::{ChannelId, Message};
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

/// 服务端主动推送给客户端的事件。
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// 频道内有新消息
    Message {
        channel: ChannelId,
        message: Message,
    },
}

/// 单个实时连接的推送端点。
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    session_id: Uuid,
    sender: mpsc::Sender<ServerEvent>,
}

impl ConnectionHandle {
    pub const MAILBOX_CAPACITY: usize = 64;

    pub fn new(session_id: Uuid) -> (Self, mpsc::Receiver<ServerEvent>) {
        let (sender, receiver) = mpsc::channel(Self::MAILBOX_CAPACITY);
        (Self { session_id, sender }, receiver)
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// 尽力投递。返回是否送入信箱；失败只记录，不向上传播。
    pub fn push(&self, event: ServerEvent) -> bool {
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(err) => {
                tracing::debug!(session_id = %self.session_id, error = %err, "push dropped");
                false
            }
        }
    }
}
