use super::AppState;
use crate::events::{AgentEvent, EventKind, EventReceiver};
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use chrono::Local;
use tokio::sync::broadcast::error::RecvError;

/// GET /ws/logs: stream every [`AgentEvent`] as a JSON text frame.
pub async fn ws_logs_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let events = state.controller.engine().events().subscribe();
    ws.on_upgrade(move |socket| handle_socket(socket, events))
}

async fn handle_socket(mut socket: WebSocket, mut events: EventReceiver) {
    let connected = system_event("Connected to Sentinel log stream.");
    if send_event(&mut socket, &connected).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    if send_event(&mut socket, &event).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    let notice =
                        system_event(format!("{skipped} log events dropped (slow consumer)."));
                    if send_event(&mut socket, &notice).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(Message::Ping(data))) => {
                    if socket.send(Message::Pong(data)).await.is_err() {
                        break;
                    }
                }
                Some(Ok(_)) => {}
                Some(Err(error)) => {
                    tracing::debug!("websocket receive error: {error}");
                    break;
                }
            },
        }
    }
}

fn system_event(message: impl Into<String>) -> AgentEvent {
    AgentEvent {
        timestamp: Local::now(),
        kind: EventKind::System,
        message: message.into(),
        details: serde_json::Value::Object(serde_json::Map::new()),
    }
}

async fn send_event(socket: &mut WebSocket, event: &AgentEvent) -> Result<(), axum::Error> {
    let json = serde_json::to_string(event).unwrap_or_default();
    socket.send(Message::Text(json.into())).await
}
