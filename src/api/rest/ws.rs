use std::sync::Arc;

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use futures::SinkExt;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::api::rest::auth::{actor_from_token, bearer_token, origin};
use crate::error::AppError;
use crate::models::actor::Actor;
use crate::notify::ConnectionId;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum ClientCommand {
    Join { channel: String },
    Leave { channel: String },
}

#[derive(Debug, Deserialize)]
pub struct WsParams {
    /// Browsers cannot set headers on an upgrade request.
    pub token: Option<String>,
}

pub async fn ws_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let actor = match bearer_token(&headers)
        .or(params.token.as_deref())
        .ok_or_else(|| AppError::Unauthenticated("missing bearer token".to_string()))
        .and_then(|token| actor_from_token(&state.jwt_secret, token, origin(&headers)))
    {
        Ok(actor) => actor,
        Err(err) => return err.into_response(),
    };

    match ws {
        Ok(ws) => ws.on_upgrade(move |socket| handle_socket(socket, state, actor)),
        Err(rejection) => rejection.into_response(),
    }
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, actor: Actor) {
    let (mut sender, mut receiver) = socket.split();
    let (connection, rx) = state.fanout.connect();
    let (reply_tx, mut reply_rx) = mpsc::channel::<String>(16);
    state.metrics.ws_connections.inc();

    info!(connection_id = %connection, user_id = %actor.user_id, "websocket client connected");

    let mut notifications = ReceiverStream::new(rx);
    let send_task = tokio::spawn(async move {
        loop {
            let json = tokio::select! {
                Some(notification) = notifications.next() => {
                    match serde_json::to_string(&notification) {
                        Ok(json) => json,
                        Err(err) => {
                            warn!(error = %err, "failed to serialize notification for ws");
                            continue;
                        }
                    }
                }
                Some(reply) = reply_rx.recv() => reply,
                else => break,
            };

            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    let recv_state = state.clone();
    let recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    let reply = apply_command(&recv_state, &actor, connection, &text).await;
                    if reply_tx.send(reply.to_string()).await.is_err() {
                        break;
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    state.fanout.disconnect(connection);
    state.metrics.ws_connections.dec();
    info!(connection_id = %connection, "websocket client disconnected");
}

async fn apply_command(
    state: &AppState,
    actor: &Actor,
    connection: ConnectionId,
    text: &str,
) -> serde_json::Value {
    let command = match serde_json::from_str::<ClientCommand>(text) {
        Ok(command) => command,
        Err(err) => {
            debug!(connection_id = %connection, error = %err, "ignoring malformed ws command");
            return json!({ "error": "bad_request", "message": "unrecognised command" });
        }
    };

    match command {
        ClientCommand::Join { channel } => {
            let joined = state
                .orchestrator
                .authorize_channel(actor, &channel)
                .await
                .and_then(|_| {
                    state
                        .fanout
                        .join(connection, &channel)
                        .map_err(|err| AppError::Internal(err.to_string()))
                });
            match joined {
                Ok(()) => json!({ "ack": "join", "channel": channel }),
                Err(err) => {
                    warn!(connection_id = %connection, channel = %channel, error = %err, "join refused");
                    json!({ "error": err.code(), "message": err.to_string() })
                }
            }
        }
        ClientCommand::Leave { channel } => {
            state.fanout.leave(connection, &channel);
            json!({ "ack": "leave", "channel": channel })
        }
    }
}
