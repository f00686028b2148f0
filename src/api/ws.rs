//! Fan-out channel over WebSocket.

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::State,
    response::Response,
};
use tracing::{debug, info};

use super::AppState;
use crate::hub::{FanOutHub, SubscriberId};
use crate::models::{WsClientMessage, WsServerEvent};

/// WebSocket handler for per-match update streaming
pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let hub = state.hub.clone();
    let (id, mut rx) = hub.register();
    info!("🔌 WebSocket client connected ({})", id);

    loop {
        tokio::select! {
            // Frames queued by the hub: updates, acks, pongs
            frame = rx.recv() => {
                let Some(frame) = frame else { break };
                if socket.send(Message::Text(frame.to_string())).await.is_err() {
                    break;
                }
            }
            // Handle incoming messages from client
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if text.trim() == "ping" {
                            // Legacy plain text ping
                            if socket.send(Message::Text("pong".to_string())).await.is_err() {
                                break;
                            }
                            continue;
                        }
                        let reply = handle_client_text(&hub, id, &text);
                        hub.send_to(id, &reply);
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        debug!(%id, error = %e, "websocket receive failed");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    hub.on_disconnect(id);
    info!("🔌 WebSocket client disconnected ({})", id);
}

/// Applies one client frame to the hub and returns the reply.
pub fn handle_client_text(hub: &FanOutHub, id: SubscriberId, text: &str) -> WsServerEvent {
    match serde_json::from_str::<WsClientMessage>(text) {
        Ok(WsClientMessage::Subscribe { event_key }) => {
            hub.join(&event_key, id);
            WsServerEvent::Subscribed { event_key }
        }
        Ok(WsClientMessage::Unsubscribe { event_key }) => {
            hub.leave(&event_key, id);
            WsServerEvent::Unsubscribed { event_key }
        }
        Ok(WsClientMessage::Ping { timestamp }) => WsServerEvent::Pong {
            timestamp: if timestamp > 0 {
                timestamp
            } else {
                chrono::Utc::now().timestamp_millis()
            },
        },
        Err(e) => WsServerEvent::Error {
            message: format!("unrecognized message: {}", e),
        },
    }
}
