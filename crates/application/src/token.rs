//! 不透明令牌铸造。
//!
//! 令牌没有内部结构，校验完全依赖会话注册表的查表，这样撤销可以立即
//! 生效，不需要等待任何签名过期。

use data_encoding::BASE64URL_NOPAD;
use rand::RngCore;

/// 令牌随机部分的字节数（256 位）
const TOKEN_BYTES: usize = 32;

/// 铸造一枚新的不透明令牌。
pub fn mint() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    BASE64URL_NOPAD.encode(&bytes)
}
