use domain::{DomainError, RepositoryError};
use thiserror::Error;

use crate::password::PasswordHasherError;

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),
    #[error("repository error: {0}")]
    Repository(RepositoryError),
    #[error("password error: {0}")]
    Password(#[from] PasswordHasherError),
}

impl ApplicationError {
    /// 授权失败。文案刻意不区分令牌未知/过期/会话被撤销。
    pub fn unauthorized() -> Self {
        ApplicationError::Domain(DomainError::Unauthorized)
    }

    /// 对外可见的错误文案。
    ///
    /// 存储层超时和数据库故障统一收敛成笼统的说法，细节只进日志。
    pub fn public_message(&self) -> String {
        match self {
            ApplicationError::Domain(err) => err.to_string(),
            ApplicationError::Repository(RepositoryError::Timeout) => {
                "temporary failure, retry later".to_string()
            }
            ApplicationError::Repository(RepositoryError::NotFound) => "not found".to_string(),
            ApplicationError::Repository(_) | ApplicationError::Password(_) => {
                "internal error".to_string()
            }
        }
    }

    /// 是否为可安全重试的瞬态失败
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ApplicationError::Repository(RepositoryError::Timeout)
        )
    }
}

impl From<RepositoryError> for ApplicationError {
    fn from(value: RepositoryError) -> Self {
        match value {
            // 唯一索引冲突在应用层就是注册冲突
            RepositoryError::Conflict => {
                ApplicationError::Domain(DomainError::conflict("username or email"))
            }
            other => ApplicationError::Repository(other),
        }
    }
}
