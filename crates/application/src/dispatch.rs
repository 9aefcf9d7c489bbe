//! 请求分发器。
//!
//! 把具名操作映射到各用例服务，并把结果统一包装成
//! `{success:true, data}` 或 `{success:false, error}`——二者互斥。
//! 传输层只负责把请求解码成这里的 DTO，语义全部在此。

use std::sync::Arc;

use domain::{Channel, Message, MessageId, UserId, Username};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::ApplicationError,
    services::{AuthService, ChatService, LoginData},
    session::SessionRegistry,
};

/// 具名操作。
pub mod ops {
    pub const REGISTER: &str = "register";
    pub const LOGIN: &str = "login";
    pub const REFRESH: &str = "refresh";
    pub const LOGOUT: &str = "logout";
    pub const CHANNEL: &str = "channel";
    pub const CHANNEL_MESSAGES: &str = "channel-messages";
    pub const MESSAGE: &str = "message";
    pub const HEARTBEAT: &str = "heartbeat";
    pub const FORGOT_PASSWORD: &str = "forgot-password";
    pub const CHANGE_PASSWORD: &str = "change-password";
}

/// 统一响应包装。构造函数保证 data 与 error 不会同时出现。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

// ---- 请求 DTO（字段名与客户端约定一致，camelCase） ----

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub client_id: String,
    pub username: String,
    pub password: String,
    pub email: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub client_id: String,
    /// 用户名或邮箱
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub client_id: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest {
    pub client_id: String,
    pub token: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelRequest {
    pub client_id: String,
    pub token: String,
    pub channel: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelMessagesRequest {
    pub client_id: String,
    pub token: String,
    pub channel: String,
    pub before_message_id: Option<i64>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRequest {
    pub client_id: String,
    pub token: String,
    pub channel: String,
    pub text: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatRequest {
    pub client_id: String,
    pub token: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForgotPasswordRequest {
    pub client_id: String,
    pub email: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub client_id: String,
    pub token: String,
    pub current_password: String,
    pub new_password: String,
}

// ---- 响应 DTO ----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterData {
    pub id: UserId,
    pub username: Username,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshData {
    pub tokens: domain::TokenPair,
}

/// 无数据的成功响应体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmptyData {}

pub struct DispatcherDependencies {
    pub clients: config::ClientConfig,
    pub registry: Arc<SessionRegistry>,
    pub auth_service: Arc<AuthService>,
    pub chat_service: Arc<ChatService>,
}

pub struct Dispatcher {
    deps: DispatcherDependencies,
}

const UNKNOWN_CLIENT: &str = "unknown client";
const MALFORMED_REQUEST: &str = "malformed request";
const UNKNOWN_OPERATION: &str = "unknown operation";

impl Dispatcher {
    pub fn new(deps: DispatcherDependencies) -> Self {
        Self { deps }
    }

    fn client_allowed(&self, client_id: &str) -> bool {
        let allowed = self.deps.clients.is_allowed(client_id);
        if !allowed {
            tracing::warn!(client_id, "request from unlisted client rejected");
        }
        allowed
    }

    fn failure_of<T>(err: ApplicationError) -> ApiResponse<T> {
        if err.is_transient() {
            tracing::warn!(error = %err, "transient failure surfaced to caller");
        } else {
            tracing::debug!(error = %err, "request failed");
        }
        ApiResponse::failure(err.public_message())
    }

    pub async fn register(&self, request: RegisterRequest) -> ApiResponse<RegisterData> {
        if !self.client_allowed(&request.client_id) {
            return ApiResponse::failure(UNKNOWN_CLIENT);
        }
        match self
            .deps
            .auth_service
            .register(&request.username, &request.email, &request.password)
            .await
        {
            Ok(user) => ApiResponse::ok(RegisterData {
                id: user.id,
                username: user.username,
            }),
            Err(err) => Self::failure_of(err),
        }
    }

    pub async fn login(&self, request: LoginRequest) -> ApiResponse<LoginData> {
        if !self.client_allowed(&request.client_id) {
            return ApiResponse::failure(UNKNOWN_CLIENT);
        }
        match self
            .deps
            .auth_service
            .login(&request.username, &request.password)
            .await
        {
            Ok(data) => ApiResponse::ok(data),
            Err(err) => Self::failure_of(err),
        }
    }

    pub async fn refresh(&self, request: RefreshRequest) -> ApiResponse<RefreshData> {
        if !self.client_allowed(&request.client_id) {
            return ApiResponse::failure(UNKNOWN_CLIENT);
        }
        match self.deps.auth_service.refresh(&request.refresh_token).await {
            Ok(tokens) => ApiResponse::ok(RefreshData { tokens }),
            Err(err) => Self::failure_of(err),
        }
    }

    pub async fn logout(&self, request: LogoutRequest) -> ApiResponse<EmptyData> {
        if !self.client_allowed(&request.client_id) {
            return ApiResponse::failure(UNKNOWN_CLIENT);
        }
        match self.deps.auth_service.logout(&request.token).await {
            Ok(()) => ApiResponse::ok(EmptyData {}),
            Err(err) => Self::failure_of(err),
        }
    }

    pub async fn channel(&self, request: ChannelRequest) -> ApiResponse<Channel> {
        if !self.client_allowed(&request.client_id) {
            return ApiResponse::failure(UNKNOWN_CLIENT);
        }
        let auth = match self.deps.registry.validate_access(&request.token).await {
            Ok(auth) => auth,
            Err(err) => return Self::failure_of(err.into()),
        };
        match self
            .deps
            .chat_service
            .select(&auth, &request.channel)
            .await
        {
            Ok(channel) => ApiResponse::ok(channel),
            Err(err) => Self::failure_of(err),
        }
    }

    pub async fn channel_messages(
        &self,
        request: ChannelMessagesRequest,
    ) -> ApiResponse<Vec<Message>> {
        if !self.client_allowed(&request.client_id) {
            return ApiResponse::failure(UNKNOWN_CLIENT);
        }
        let auth = match self.deps.registry.validate_access(&request.token).await {
            Ok(auth) => auth,
            Err(err) => return Self::failure_of(err.into()),
        };
        let before = request.before_message_id.map(MessageId::new);
        let limit = request.limit.unwrap_or(50);
        match self
            .deps
            .chat_service
            .history(&auth, &request.channel, before, limit)
            .await
        {
            Ok(messages) => ApiResponse::ok(messages),
            Err(err) => Self::failure_of(err),
        }
    }

    pub async fn message(&self, request: MessageRequest) -> ApiResponse<Message> {
        if !self.client_allowed(&request.client_id) {
            return ApiResponse::failure(UNKNOWN_CLIENT);
        }
        let auth = match self.deps.registry.validate_access(&request.token).await {
            Ok(auth) => auth,
            Err(err) => return Self::failure_of(err.into()),
        };
        match self
            .deps
            .chat_service
            .submit(&auth, &request.channel, &request.text)
            .await
        {
            Ok(message) => ApiResponse::ok(message),
            Err(err) => Self::failure_of(err),
        }
    }

    pub async fn heartbeat(&self, request: HeartbeatRequest) -> ApiResponse<EmptyData> {
        if !self.client_allowed(&request.client_id) {
            return ApiResponse::failure(UNKNOWN_CLIENT);
        }
        match self.deps.auth_service.heartbeat(&request.token).await {
            Ok(()) => ApiResponse::ok(EmptyData {}),
            Err(err) => Self::failure_of(err),
        }
    }

    pub async fn forgot_password(&self, request: ForgotPasswordRequest) -> ApiResponse<EmptyData> {
        if !self.client_allowed(&request.client_id) {
            return ApiResponse::failure(UNKNOWN_CLIENT);
        }
        match self.deps.auth_service.forgot_password(&request.email).await {
            Ok(()) => ApiResponse::ok(EmptyData {}),
            Err(err) => Self::failure_of(err),
        }
    }

    pub async fn change_password(&self, request: ChangePasswordRequest) -> ApiResponse<EmptyData> {
        if !self.client_allowed(&request.client_id) {
            return ApiResponse::failure(UNKNOWN_CLIENT);
        }
        let auth = match self.deps.registry.validate_access(&request.token).await {
            Ok(auth) => auth,
            Err(err) => return Self::failure_of(err.into()),
        };
        match self
            .deps
            .auth_service
            .change_password(&auth, &request.current_password, &request.new_password)
            .await
        {
            Ok(()) => ApiResponse::ok(EmptyData {}),
            Err(err) => Self::failure_of(err),
        }
    }

    /// 按操作名分发。传输层可以走这里，也可以直接调用类型化方法。
    pub async fn dispatch(&self, op: &str, payload: Value) -> Value {
        fn respond<T: Serialize>(response: ApiResponse<T>) -> Value {
            serde_json::to_value(response).unwrap_or_else(|err| {
                tracing::error!(error = %err, "response serialization failed");
                serde_json::json!({ "success": false, "error": "internal error" })
            })
        }

        fn decode<T: serde::de::DeserializeOwned>(payload: Value) -> Result<T, Value> {
            serde_json::from_value(payload)
                .map_err(|_| respond::<EmptyData>(ApiResponse::failure(MALFORMED_REQUEST)))
        }

        match op {
            ops::REGISTER => match decode(payload) {
                Ok(req) => respond(self.register(req).await),
                Err(v) => v,
            },
            ops::LOGIN => match decode(payload) {
                Ok(req) => respond(self.login(req).await),
                Err(v) => v,
            },
            ops::REFRESH => match decode(payload) {
                Ok(req) => respond(self.refresh(req).await),
                Err(v) => v,
            },
            ops::LOGOUT => match decode(payload) {
                Ok(req) => respond(self.logout(req).await),
                Err(v) => v,
            },
            ops::CHANNEL => match decode(payload) {
                Ok(req) => respond(self.channel(req).await),
                Err(v) => v,
            },
            ops::CHANNEL_MESSAGES => match decode(payload) {
                Ok(req) => respond(self.channel_messages(req).await),
                Err(v) => v,
            },
            ops::MESSAGE => match decode(payload) {
                Ok(req) => respond(self.message(req).await),
                Err(v) => v,
            },
            ops::HEARTBEAT => match decode(payload) {
                Ok(req) => respond(self.heartbeat(req).await),
                Err(v) => v,
            },
            ops::FORGOT_PASSWORD => match decode(payload) {
                Ok(req) => respond(self.forgot_password(req).await),
                Err(v) => v,
            },
            ops::CHANGE_PASSWORD => match decode(payload) {
                Ok(req) => respond(self.change_password(req).await),
                Err(v) => v,
            },
            _ => respond::<EmptyData>(ApiResponse::failure(UNKNOWN_OPERATION)),
        }
    }

    /// 传输层建立实时连接时用：校验令牌并返回会话身份。
    pub async fn authenticate(
        &self,
        client_id: &str,
        token: &str,
    ) -> Result<crate::session::AuthenticatedUser, ApplicationError> {
        if !self.client_allowed(client_id) {
            return Err(ApplicationError::unauthorized());
        }
        Ok(self.deps.registry.validate_access(token).await?)
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.deps.registry
    }

    pub fn chat_service(&self) -> &Arc<ChatService> {
        &self.deps.chat_service
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_never_carries_both_data_and_error() {
        let ok = ApiResponse::ok(EmptyData {});
        assert!(ok.success && ok.data.is_some() && ok.error.is_none());

        let fail: ApiResponse<EmptyData> = ApiResponse::failure("nope");
        assert!(!fail.success && fail.data.is_none() && fail.error.is_some());
    }

    #[test]
    fn envelope_serializes_without_absent_fields() {
        let fail: ApiResponse<EmptyData> = ApiResponse::failure("nope");
        let json = serde_json::to_value(&fail).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "success": false, "error": "nope" })
        );
    }
}
