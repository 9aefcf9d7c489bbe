use thiserror::Error;

/// 领域错误类型。
///
/// 授权失败统一用 [`DomainError::Unauthorized`] 表示，错误文案不区分
/// 令牌过期、令牌未知或会话被撤销，避免向持有旧令牌的调用方泄露会话状态。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("unauthorized")]
    Unauthorized,

    /// 唯一性冲突（注册时用户名或邮箱已存在）
    #[error("{resource} already exists")]
    Conflict { resource: String },

    /// 资源不存在（未知频道、翻页越界等）
    #[error("{resource} not found")]
    NotFound { resource: String },

    /// 输入不合法
    #[error("invalid {field}: {reason}")]
    Invalid { field: String, reason: String },
}

impl DomainError {
    pub fn conflict(resource: impl Into<String>) -> Self {
        Self::Conflict {
            resource: resource.into(),
        }
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// 存储层错误。
///
/// 核心不在内部自动重试：超时以 [`RepositoryError::Timeout`] 向上传播，
/// 由调用方决定退避重试策略。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// 唯一索引冲突
    #[error("conflict")]
    Conflict,

    #[error("not found")]
    NotFound,

    /// 连接或语句超时，可安全重试
    #[error("store timeout")]
    Timeout,

    #[error("database error: {0}")]
    Database(String),
}

impl RepositoryError {
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database(message.into())
    }
}

/// 领域结果类型
pub type DomainResult<T> = Result<T, DomainError>;
