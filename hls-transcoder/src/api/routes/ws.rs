//! Live push channel over WebSocket.
//!
//! Each connection registers one channel and receives
//! `{"event":"connected","id":...}` first. The id goes into the `socket-id`
//! header of transcode requests; that job's notifications are then sent as
//! JSON text frames on this socket.

use std::time::Duration;

use axum::{
    Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tracing::{debug, warn};

use crate::api::server::AppState;
use crate::progress::PushNotification;

/// Heartbeat ping interval in seconds.
const HEARTBEAT_INTERVAL_SECS: u64 = 30;

pub fn router() -> Router<AppState> {
    Router::new().route("/ws", get(push_channel_ws))
}

async fn push_channel_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

fn encode(notification: &PushNotification) -> Option<Message> {
    match serde_json::to_string(notification) {
        Ok(text) => Some(Message::Text(text.into())),
        Err(e) => {
            warn!("Failed to encode push notification: {}", e);
            None
        }
    }
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (handle, mut notifications) = state.channels.register();
    let channel_id = handle.id().to_string();
    drop(handle);

    let (mut sender, mut receiver) = socket.split();

    let connected = PushNotification::Connected {
        id: channel_id.clone(),
    };
    if let Some(msg) = encode(&connected)
        && sender.send(msg).await.is_err()
    {
        debug!(channel_id = %channel_id, "Client disconnected before registration");
        state.channels.unregister(&channel_id);
        return;
    }

    let mut heartbeat_interval =
        tokio::time::interval(Duration::from_secs(HEARTBEAT_INTERVAL_SECS));
    // The first tick completes immediately.
    heartbeat_interval.tick().await;
    let mut awaiting_pong = false;

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(channel_id = %channel_id, "Client closed push channel");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        awaiting_pong = false;
                    }
                    Some(Err(e)) => {
                        debug!(channel_id = %channel_id, "WebSocket error: {}", e);
                        break;
                    }
                    // Client text/binary frames carry nothing for us.
                    Some(Ok(_)) => {}
                }
            }

            notification = notifications.recv() => {
                let Some(notification) = notification else {
                    break;
                };
                if let Some(msg) = encode(&notification)
                    && let Err(e) = sender.send(msg).await
                {
                    debug!(channel_id = %channel_id, "Failed to push notification: {}", e);
                    break;
                }
            }

            _ = heartbeat_interval.tick() => {
                if awaiting_pong {
                    debug!(channel_id = %channel_id, "Client failed to respond to Ping, closing connection");
                    break;
                }
                if sender.send(Message::Ping(Bytes::new())).await.is_ok() {
                    awaiting_pong = true;
                } else {
                    debug!(channel_id = %channel_id, "Failed to send Ping, closing connection");
                    break;
                }
            }
        }
    }

    state.channels.unregister(&channel_id);
    let _ = sender.close().await;
}
