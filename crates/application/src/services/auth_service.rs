use std::sync::Arc;

use domain::{AppData, DomainError, TokenPair, UserEmail, UserView, Username};
use serde::{Deserialize, Serialize};

use crate::{
    channels::ChannelDirectory,
    error::ApplicationError,
    password::PasswordHasher,
    repository::UserRepository,
    session::{AuthenticatedUser, SessionRegistry},
};

/// 登录成功后返回给客户端的初始数据。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginData {
    pub tokens: TokenPair,
    pub user: UserView,
    pub app_data: AppData,
}

pub struct AuthServiceDependencies {
    pub user_repository: Arc<dyn UserRepository>,
    pub password_hasher: Arc<dyn PasswordHasher>,
    pub registry: Arc<SessionRegistry>,
    pub directory: Arc<ChannelDirectory>,
    /// 改密时是否顺带撤销该用户的其他活跃会话
    pub revoke_sessions_on_password_change: bool,
}

pub struct AuthService {
    deps: AuthServiceDependencies,
}

impl AuthService {
    pub fn new(deps: AuthServiceDependencies) -> Self {
        Self { deps }
    }

    fn parse_password(password: &str) -> Result<&str, DomainError> {
        if password.is_empty() {
            return Err(DomainError::invalid("password", "cannot be empty"));
        }
        if password.len() > 128 {
            return Err(DomainError::invalid("password", "too long"));
        }
        Ok(password)
    }

    /// 注册新用户。用户名和邮箱全局唯一，冲突以 Conflict 上报。
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<UserView, ApplicationError> {
        let username = Username::parse(username)?;
        let email = UserEmail::parse(email)?;
        let password = Self::parse_password(password)?;

        let hash = self.deps.password_hasher.hash(password).await?;
        let user = self
            .deps
            .user_repository
            .create(&username, &email, &hash)
            .await?;

        tracing::info!(user_id = %user.id, username = %user.username, "user registered");
        Ok(UserView::private(&user))
    }

    /// 登录。`login` 可以是用户名或邮箱。
    ///
    /// 用户不存在和密码错误对外不可区分，防枚举。
    pub async fn login(&self, login: &str, password: &str) -> Result<LoginData, ApplicationError> {
        let user = self
            .deps
            .user_repository
            .find_by_login(login.trim())
            .await?
            .ok_or_else(ApplicationError::unauthorized)?;

        let password_ok = self
            .deps
            .password_hasher
            .verify(password, &user.password)
            .await?;
        if !password_ok {
            return Err(ApplicationError::unauthorized());
        }

        // 注册表里只存公开视图，在场列表不会带出邮箱
        let tokens = self.deps.registry.issue(UserView::public(&user)).await;
        let app_data = self.deps.directory.app_data().await?;

        tracing::info!(user_id = %user.id, "user logged in");
        Ok(LoginData {
            tokens,
            user: UserView::private(&user),
            app_data,
        })
    }

    /// 刷新令牌对。单次有效旋转在注册表内完成。
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, ApplicationError> {
        Ok(self.deps.registry.refresh(refresh_token).await?)
    }

    /// 登出：撤销会话并清理在场状态。
    pub async fn logout(&self, access_token: &str) -> Result<(), ApplicationError> {
        let (user_id, _connection) = self.deps.registry.revoke(access_token).await?;
        self.deps.directory.disconnect(user_id).await;
        Ok(())
    }

    /// 心跳：刷新会话的最后活跃时间。
    pub async fn heartbeat(&self, access_token: &str) -> Result<(), ApplicationError> {
        self.deps.registry.touch(access_token).await?;
        Ok(())
    }

    /// 修改密码。当前密码校验失败与令牌失效同样以 Unauthorized 上报。
    /// 其他活跃会话是否撤销由配置决定，默认保留。
    pub async fn change_password(
        &self,
        auth: &AuthenticatedUser,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), ApplicationError> {
        let new_password = Self::parse_password(new_password)?;

        let user = self
            .deps
            .user_repository
            .find_by_id(auth.user.id)
            .await?
            .ok_or_else(ApplicationError::unauthorized)?;

        let current_ok = self
            .deps
            .password_hasher
            .verify(current_password, &user.password)
            .await?;
        if !current_ok {
            return Err(ApplicationError::unauthorized());
        }

        let hash = self.deps.password_hasher.hash(new_password).await?;
        self.deps
            .user_repository
            .update_password(user.id, &hash)
            .await?;

        if self.deps.revoke_sessions_on_password_change {
            let revoked = self
                .deps
                .registry
                .revoke_all_for_user(user.id, auth.session_id)
                .await;
            tracing::info!(user_id = %user.id, revoked, "other sessions revoked after password change");
        }

        tracing::info!(user_id = %user.id, "password changed");
        Ok(())
    }

    /// 忘记密码。无论邮箱是否存在都返回成功，防枚举；
    /// 实际投递由外部协作方完成，这里只记录。
    pub async fn forgot_password(&self, email: &str) -> Result<(), ApplicationError> {
        let Ok(email) = UserEmail::parse(email) else {
            return Ok(());
        };
        match self.deps.user_repository.find_by_email(&email).await {
            Ok(Some(user)) => {
                tracing::info!(user_id = %user.id, "password reset requested");
            }
            Ok(None) => {
                tracing::debug!("password reset requested for unknown email");
            }
            Err(err) => {
                // 失败也不能把存储错误泄露成邮箱存在性信号
                tracing::warn!(error = %err, "password reset lookup failed");
            }
        }
        Ok(())
    }
}
