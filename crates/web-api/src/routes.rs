use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use application::dispatch::{
    ApiResponse, ChangePasswordRequest, ChannelMessagesRequest, ChannelRequest, EmptyData,
    ForgotPasswordRequest, HeartbeatRequest, LoginRequest, LogoutRequest, MessageRequest,
    RefreshData, RefreshRequest, RegisterData, RegisterRequest,
};
use application::services::LoginData;
use domain::{Channel, Message};

use crate::state::AppState;
use crate::ws_connection;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api", api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
        .route("/channel", post(channel))
        .route("/channel-messages", post(channel_messages))
        .route("/message", post(message))
        .route("/heartbeat", post(heartbeat))
        .route("/forgot-password", post(forgot_password))
        .route("/change-password", post(change_password))
        .route("/ws", get(ws_connection::upgrade))
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Json<ApiResponse<RegisterData>> {
    Json(state.dispatcher.register(payload).await)
}

async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Json<ApiResponse<LoginData>> {
    Json(state.dispatcher.login(payload).await)
}

async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Json<ApiResponse<RefreshData>> {
    Json(state.dispatcher.refresh(payload).await)
}

async fn logout(
    State(state): State<AppState>,
    Json(payload): Json<LogoutRequest>,
) -> Json<ApiResponse<EmptyData>> {
    Json(state.dispatcher.logout(payload).await)
}

async fn channel(
    State(state): State<AppState>,
    Json(payload): Json<ChannelRequest>,
) -> Json<ApiResponse<Channel>> {
    Json(state.dispatcher.channel(payload).await)
}

async fn channel_messages(
    State(state): State<AppState>,
    Json(payload): Json<ChannelMessagesRequest>,
) -> Json<ApiResponse<Vec<Message>>> {
    Json(state.dispatcher.channel_messages(payload).await)
}

async fn message(
    State(state): State<AppState>,
    Json(payload): Json<MessageRequest>,
) -> Json<ApiResponse<Message>> {
    Json(state.dispatcher.message(payload).await)
}

async fn heartbeat(
    State(state): State<AppState>,
    Json(payload): Json<HeartbeatRequest>,
) -> Json<ApiResponse<EmptyData>> {
    Json(state.dispatcher.heartbeat(payload).await)
}

async fn forgot_password(
    State(state): State<AppState>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> Json<ApiResponse<EmptyData>> {
    Json(state.dispatcher.forgot_password(payload).await)
}

async fn change_password(
    State(state): State<AppState>,
    Json(payload): Json<ChangePasswordRequest>,
) -> Json<ApiResponse<EmptyData>> {
    Json(state.dispatcher.change_password(payload).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    #[tokio::test]
    async fn health_is_always_up() {
        let app = Router::new().route("/health", get(health));
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
