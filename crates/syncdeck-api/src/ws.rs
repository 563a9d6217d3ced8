//! Push channel: forwards hub events to one WebSocket subscriber.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use syncdeck_core::hub::HubEvent;
use tokio::sync::broadcast::error::RecvError;

use crate::routes::AppState;

pub async fn handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| serve(socket, state))
}

/// Text frame for a hub event
pub fn encode_event(event: &HubEvent) -> Option<String> {
    match serde_json::to_string(event) {
        Ok(text) => Some(text),
        Err(error) => {
            tracing::warn!("Could not encode hub event: {error}");
            None
        }
    }
}

/// Reply to an inbound text frame
pub fn echo_reply(text: &str) -> String {
    json!({ "type": "echo", "data": text }).to_string()
}

async fn serve(socket: WebSocket, state: AppState) {
    // Subscribe before splitting so nothing published after the upgrade is missed.
    let mut events = state.engine.subscribe();
    let (mut sender, mut receiver) = socket.split();
    let (reply_tx, mut reply_rx) = tokio::sync::mpsc::channel::<Message>(16);
    tracing::info!(
        subscribers = state.engine.hub().subscriber_count(),
        "WebSocket subscriber connected"
    );

    let mut send_task = tokio::spawn(async move {
        loop {
            let message = tokio::select! {
                received = events.recv() => match received {
                    Ok(event) => match encode_event(&event) {
                        Some(text) => Message::Text(text.into()),
                        None => continue,
                    },
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "WebSocket subscriber lagged; events dropped");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
                reply = reply_rx.recv() => match reply {
                    Some(message) => message,
                    None => break,
                },
            };
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            let reply = match message {
                Message::Text(text) => Message::Text(echo_reply(text.as_str()).into()),
                Message::Ping(payload) => Message::Pong(payload),
                Message::Close(_) => break,
                Message::Binary(_) | Message::Pong(_) => continue,
            };
            if reply_tx.send(reply).await.is_err() {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
    tracing::info!("WebSocket subscriber disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use syncdeck_core::models::DaemonStatus;

    #[test]
    fn echo_wraps_inbound_text() {
        let reply: serde_json::Value = serde_json::from_str(&echo_reply("ping")).unwrap();
        assert_eq!(reply, json!({"type": "echo", "data": "ping"}));
    }

    #[test]
    fn events_are_encoded_as_tagged_json() {
        let text = encode_event(&HubEvent::DaemonStatus {
            status: DaemonStatus::Running,
        })
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value, json!({"type": "daemon-status", "status": "running"}));
    }
}
