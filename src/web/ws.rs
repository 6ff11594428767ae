//! Viewer-facing WebSocket endpoint.
//!
//! Each connection gets one reader task (parses inbound JSON, updates
//! subscriptions, dispatches to the Supervisor/Control Plane) and one
//! writer task (drains the client's outbound queue, sends periodic
//! pings). The two communicate only through the `ViewerClient` they
//! share; neither ever locks the other's half directly.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::WS_PING_INTERVAL;
use crate::hub::{ClientMessage, ViewerClient};
use crate::state::AppState;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let client_id = Uuid::new_v4().to_string();
    let client = ViewerClient::new(client_id.clone());
    state.hub.register(client.clone());
    info!(%client_id, "viewer client connected");

    let (sender, receiver) = socket.split();
    let writer = tokio::spawn(writer_loop(client.clone(), sender));

    reader_loop(&state, &client, receiver).await;

    client.close();
    let _ = writer.await;

    state.hub.unregister(&client_id);
    for device_id in client.subscribed_devices() {
        state.supervisor.remove_viewer(&device_id);
    }
    info!(%client_id, "viewer client disconnected");
}

/// Blocks on socket reads; processes inbound JSON; updates subscription
/// state; calls the Supervisor/Control Plane.
async fn reader_loop(
    state: &Arc<AppState>,
    client: &Arc<ViewerClient>,
    mut receiver: futures::stream::SplitStream<WebSocket>,
) {
    while let Some(msg) = receiver.next().await {
        let msg = match msg {
            Ok(msg) => msg,
            Err(e) => {
                warn!(client_id = %client.id, error = %e, "websocket read error");
                break;
            }
        };

        match msg {
            Message::Text(text) => {
                if let Err(e) = handle_client_message(state, client, &text).await {
                    warn!(client_id = %client.id, error = %e, "dropping malformed control message");
                }
            }
            Message::Binary(_) => {
                debug!(client_id = %client.id, "ignoring unexpected binary frame from client");
            }
            Message::Pong(_) => {}
            Message::Ping(_) => {}
            Message::Close(_) => break,
        }
    }
}

/// Parses and routes one inbound JSON message.
/// Serialization errors are logged and the message dropped; control
/// errors never terminate the socket.
async fn handle_client_message(
    state: &Arc<AppState>,
    client: &Arc<ViewerClient>,
    text: &str,
) -> Result<(), serde_json::Error> {
    let msg: ClientMessage = serde_json::from_str(text)?;

    match msg {
        ClientMessage::Subscribe { device_id } => {
            // Resolve and prime *before* adding this device to the
            // client's subscription set: broadcast only enqueues to
            // subscribed clients, so deferring `subscribe` until after
            // the primer is enqueued guarantees no live NAL can reach
            // this client ahead of it, even though resolving the
            // transport id suspends on an `.await`.
            match state.resolve_transport_id(&device_id).await {
                Ok(transport_id) => {
                    if let Some(primer) = state.supervisor.add_viewer(&device_id, &transport_id) {
                        let packet = crate::hub::encode_video_packet(&device_id, &primer);
                        state.hub.send_to_client(&client.id, packet);
                    }
                    client.subscribe(&device_id);
                }
                Err(e) => {
                    warn!(client_id = %client.id, %device_id, error = %e, "subscribe to unresolvable device id");
                }
            }
        }
        ClientMessage::Unsubscribe { device_id } => {
            client.unsubscribe(&device_id);
            state.supervisor.remove_viewer(&device_id);
        }
        ClientMessage::Tap { device_id, x, y } => {
            if let Err(e) = state.control_plane.tap(&device_id, x, y).await {
                warn!(client_id = %client.id, %device_id, error = %e, "tap dispatch failed");
            }
        }
        ClientMessage::Swipe {
            device_id,
            x1,
            y1,
            x2,
            y2,
            duration_ms,
        } => {
            if let Err(e) = state
                .control_plane
                .swipe(&device_id, x1, y1, x2, y2, duration_ms)
                .await
            {
                warn!(client_id = %client.id, %device_id, error = %e, "swipe dispatch failed");
            }
        }
        ClientMessage::Key {
            device_id,
            action,
            keycode,
            meta,
        } => {
            if let Err(e) = state.control_plane.key(&device_id, action, keycode, meta).await {
                warn!(client_id = %client.id, %device_id, error = %e, "key dispatch failed");
            }
        }
        ClientMessage::Text { device_id, text } => {
            if let Err(e) = state.control_plane.text(&device_id, &text).await {
                warn!(client_id = %client.id, %device_id, error = %e, "text dispatch failed");
            }
        }
        ClientMessage::Clipboard {
            device_id,
            text,
            paste,
        } => {
            if let Err(e) = state.control_plane.clipboard(&device_id, &text, paste).await {
                warn!(client_id = %client.id, %device_id, error = %e, "clipboard dispatch failed");
            }
        }
        ClientMessage::RequestKeyframe { device_id } => {
            if let Some(primer) = state.supervisor.primer_bundle(&device_id) {
                let packet = crate::hub::encode_video_packet(&device_id, &primer);
                state.hub.send_to_client(&client.id, packet);
            }
        }
    }

    Ok(())
}

/// Drains the client's outbound queue and writes frames, disambiguating
/// JSON control replies from binary NAL packets by their first
/// non-whitespace byte. Also drives the periodic ping that
/// keeps the read-deadline on the other end alive.
async fn writer_loop(client: Arc<ViewerClient>, mut sender: futures::stream::SplitSink<WebSocket, Message>) {
    let mut ping_interval = tokio::time::interval(WS_PING_INTERVAL);
    ping_interval.tick().await; // first tick fires immediately; skip it

    loop {
        tokio::select! {
            packet = client.recv() => {
                let Some(packet) = packet else { break };
                let frame = if looks_like_json(&packet) {
                    Message::Text(String::from_utf8_lossy(&packet).into_owned())
                } else {
                    Message::Binary(packet.to_vec())
                };
                if tokio::time::timeout(WS_PING_INTERVAL, sender.send(frame)).await.is_err() {
                    warn!(client_id = %client.id, "write deadline exceeded, dropping client");
                    break;
                }
            }
            _ = ping_interval.tick() => {
                if tokio::time::timeout(WS_PING_INTERVAL, sender.send(Message::Ping(vec![]))).await.is_err() {
                    warn!(client_id = %client.id, "ping deadline exceeded, dropping client");
                    break;
                }
            }
        }
    }

    let _ = sender.close().await;
}

fn looks_like_json(packet: &[u8]) -> bool {
    packet
        .iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|&b| b == b'{' || b == b'[')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_nal_is_not_json() {
        assert!(!looks_like_json(&[0x00, 0x00, 0x00, 0x01, 0x67]));
    }

    #[test]
    fn json_object_is_detected_through_leading_whitespace() {
        assert!(looks_like_json(b"  {\"type\":\"subscribe\"}"));
    }

    #[test]
    fn empty_packet_is_not_json() {
        assert!(!looks_like_json(&[]));
    }
}
