use serde::{Deserialize, Serialize};

/// 一次登录实例的状态。
///
/// 过期不单独建状态：访问令牌和刷新令牌各带过期时间，由注册表在
/// 校验和清扫时判断。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Active,
    Revoked,
}

/// 一对访问/刷新令牌。两枚令牌原子地铸造，绑定到同一个会话。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    /// 不透明的短期访问令牌
    pub access_token: String,
    /// 访问令牌剩余有效秒数
    pub expires_in: i64,
    /// 长期刷新令牌，旋转后单次有效
    pub refresh_token: String,
}
