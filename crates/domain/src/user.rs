use serde::{Deserialize, Serialize};

use crate::value_objects::{PasswordHash, Timestamp, UserEmail, UserId, Username};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: Username,
    pub email: UserEmail,
    #[serde(skip_serializing)] // 密码哈希不暴露给客户端
    pub password: PasswordHash,
    pub created_at: Timestamp,
}

impl User {
    pub fn set_password(&mut self, password: PasswordHash) {
        self.password = password;
    }
}

/// 对外暴露的用户视图。
///
/// 邮箱属于联系方式，只在用户查看自己时给出；其他用户看到的视图里
/// 邮箱一律缺省。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserView {
    pub id: UserId,
    pub username: Username,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<UserEmail>,
}

impl UserView {
    /// 其他用户可见的视图（隐藏邮箱）
    pub fn public(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: None,
        }
    }

    /// 本人可见的视图
    pub fn private(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: Some(user.email.clone()),
        }
    }
}
