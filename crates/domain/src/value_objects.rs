use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// 统一的时间戳类型。
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// 用户唯一标识（数据库自增主键）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub i64);

impl UserId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for UserId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<UserId> for i64 {
    fn from(value: UserId) -> Self {
        value.0
    }
}

/// 消息标识。在所属频道内严格递增，可直接用于排序和翻页。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(pub i64);

impl MessageId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }

    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for MessageId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// 频道标识。
///
/// 字符串形式同时覆盖两类频道：
/// - 静态频道：`[a-z0-9_-]{1,64}`，必须已在存储中登记；
/// - 私聊频道：`dm:<a>:<b>`（a、b 为用户 id），首次选择时按需创建。
///
/// 私聊 id 解析时会规范化为 a < b 的形式，保证同一对用户映射到同一个频道。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelId(String);

impl ChannelId {
    pub const DIRECT_PREFIX: &'static str = "dm:";

    pub fn parse(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        if let Some(rest) = value.strip_prefix(Self::DIRECT_PREFIX) {
            return Self::parse_direct(rest);
        }
        if value.is_empty() || value.len() > 64 {
            return Err(DomainError::invalid("channel", "bad length"));
        }
        if !value
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
        {
            return Err(DomainError::invalid("channel", "bad characters"));
        }
        Ok(Self(value))
    }

    fn parse_direct(rest: &str) -> Result<Self, DomainError> {
        let (a, b) = rest
            .split_once(':')
            .ok_or_else(|| DomainError::invalid("channel", "malformed direct id"))?;
        let a: i64 = a
            .parse()
            .map_err(|_| DomainError::invalid("channel", "malformed direct id"))?;
        let b: i64 = b
            .parse()
            .map_err(|_| DomainError::invalid("channel", "malformed direct id"))?;
        if a <= 0 || b <= 0 || a == b {
            return Err(DomainError::invalid("channel", "malformed direct id"));
        }
        // 规范化：小 id 在前
        let (low, high) = if a < b { (a, b) } else { (b, a) };
        Ok(Self(format!("{}{}:{}", Self::DIRECT_PREFIX, low, high)))
    }

    /// 是否为按需创建的私聊频道
    pub fn is_direct(&self) -> bool {
        self.0.starts_with(Self::DIRECT_PREFIX)
    }

    /// 私聊频道的参与双方
    pub fn direct_peers(&self) -> Option<(UserId, UserId)> {
        let rest = self.0.strip_prefix(Self::DIRECT_PREFIX)?;
        let (a, b) = rest.split_once(':')?;
        Some((UserId::new(a.parse().ok()?), UserId::new(b.parse().ok()?)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 经过验证的用户名。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Username(String);

impl Username {
    pub fn parse(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into().trim().to_owned();
        if value.is_empty() {
            return Err(DomainError::invalid("username", "cannot be empty"));
        }
        if value.len() > 50 {
            return Err(DomainError::invalid("username", "too long"));
        }
        if value.contains('@') {
            // 登录时用户名和邮箱共用一个字段，用户名里不允许出现 @
            return Err(DomainError::invalid("username", "must not contain '@'"));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 经过验证的邮箱。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserEmail(String);

impl UserEmail {
    pub fn parse(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into().trim().to_lowercase();
        if value.is_empty() {
            return Err(DomainError::invalid("email", "cannot be empty"));
        }
        if !value.contains('@') {
            return Err(DomainError::invalid("email", "must contain '@'"));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserEmail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 经过外部哈希函数处理的密码。明文密码从不落入实体。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordHash(String);

impl PasswordHash {
    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let hash = value.into();
        if hash.trim().is_empty() {
            return Err(DomainError::invalid("password_hash", "cannot be empty"));
        }
        Ok(Self(hash))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// 消息正文。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageText(String);

impl MessageText {
    pub const MAX_LEN: usize = 4096;

    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(DomainError::invalid("text", "cannot be empty"));
        }
        if value.len() > Self::MAX_LEN {
            return Err(DomainError::invalid("text", "too long"));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
