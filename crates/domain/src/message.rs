use serde::{Deserialize, Serialize};

use crate::value_objects::{MessageId, MessageText, Timestamp, UserId};

/// 频道内的一条消息。创建后不可变，归属于唯一一个频道。
///
/// `id` 在所属频道内严格递增；`time` 以 UNIX 秒序列化，与时区无关。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub user: UserId,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub time: Timestamp,
    pub text: MessageText,
}

impl Message {
    pub fn new(id: MessageId, user: UserId, time: Timestamp, text: MessageText) -> Self {
        Self {
            id,
            user,
            time,
            text,
        }
    }
}
