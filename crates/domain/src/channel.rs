use serde::{Deserialize, Serialize};

use crate::message::Message;
use crate::user::UserView;
use crate::value_objects::ChannelId;

/// 存储中的频道记录。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRecord {
    pub id: ChannelId,
    /// 展示名称，不保证唯一
    pub name: String,
}

impl ChannelRecord {
    pub fn new(id: ChannelId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }

    /// 私聊频道按需创建时的记录，名称直接用规范化 id
    pub fn direct(id: ChannelId) -> Self {
        let name = id.as_str().to_owned();
        Self { id, name }
    }
}

/// 返回给客户端的频道快照：最近 N 条消息窗口加当前在场用户。
///
/// `users` 是实时在场视图，不是持久化成员关系。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: ChannelId,
    pub name: String,
    pub messages: Vec<Message>,
    pub users: Vec<UserView>,
}

/// 登录时返回的初始数据快照。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppData {
    pub channels: Vec<Channel>,
}
