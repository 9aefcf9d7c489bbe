//! Web API 层。
//!
//! 提供 Axum 路由，把 HTTP / WebSocket 请求解码后委托给应用层的
//! 请求分发器。响应一律是 HTTP 200 加统一包装，语义错误在包装里表达。

mod routes;
mod state;
mod ws_connection;

pub use routes::router;
pub use state::AppState;
