//! WebSocket 实时连接。
//!
//! 连接建立时校验令牌并把推送句柄挂到会话上；之后连接只承载服务端
//! 推送，客户端的请求仍然走 HTTP。断开时解除句柄并清理在场状态。

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use application::connection::ConnectionHandle;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsQuery {
    pub client_id: String,
    pub token: String,
}

pub async fn upgrade(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query))
}

async fn handle_socket(mut socket: WebSocket, state: AppState, query: WsQuery) {
    let auth = match state
        .dispatcher
        .authenticate(&query.client_id, &query.token)
        .await
    {
        Ok(auth) => auth,
        Err(err) => {
            tracing::debug!(error = %err, "websocket handshake rejected");
            let _ = socket.send(WsMessage::Close(None)).await;
            return;
        }
    };
    let session_id = auth.session_id;

    let (handle, mut events) = ConnectionHandle::new(session_id);
    if state
        .dispatcher
        .registry()
        .attach_connection(session_id, handle)
        .await
        .is_err()
    {
        // 会话在握手与挂载之间被撤销
        let _ = socket.send(WsMessage::Close(None)).await;
        return;
    }
    tracing::info!(session_id = %session_id, user_id = %auth.user.id, "websocket connected");

    let (mut sender, mut incoming) = socket.split();

    // 所有对 sender 的写操作通过命令通道串行化
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<WsCommand>(32);

    let send_task = {
        let cmd_tx = cmd_tx.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(cmd) = cmd_rx.recv() => {
                        let message = match cmd {
                            WsCommand::SendText(text) => WsMessage::Text(text.into()),
                            WsCommand::SendPong(data) => WsMessage::Pong(data.into()),
                        };
                        if sender.send(message).await.is_err() {
                            break;
                        }
                    }
                    event = events.recv() => {
                        let Some(event) = event else { break };
                        let payload = match serde_json::to_string(&event) {
                            Ok(json) => json,
                            Err(err) => {
                                tracing::warn!(error = %err, "push serialization failed");
                                continue;
                            }
                        };
                        if cmd_tx.send(WsCommand::SendText(payload)).await.is_err() {
                            break;
                        }
                    }
                }
            }
        })
    };

    let recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = incoming.next().await {
            match message {
                WsMessage::Close(_) => break,
                WsMessage::Ping(data) => {
                    if cmd_tx.send(WsCommand::SendPong(data.to_vec())).await.is_err() {
                        break;
                    }
                }
                // 客户端的请求都走 HTTP，连接上行只用于心跳帧
                WsMessage::Pong(_) | WsMessage::Text(_) | WsMessage::Binary(_) => {}
            }
        }
    });

    tokio::select! {
        _ = send_task => {}
        _ = recv_task => {}
    }

    state.dispatcher.chat_service().disconnect(session_id).await;
    tracing::info!(session_id = %session_id, "websocket disconnected");
}

/// WebSocket 写操作命令
#[derive(Debug)]
enum WsCommand {
    SendText(String),
    SendPong(Vec<u8>),
}
