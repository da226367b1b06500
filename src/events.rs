use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

/// Default buffer of the log stream; slow subscribers lag rather than block.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Category of an [`AgentEvent`]. Step names double as event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Monitor,
    Diagnose,
    Plan,
    Approve,
    Execute,
    Verify,
    Report,
    Escalate,
    StatusUpdate,
    Security,
    Warning,
    Error,
    System,
}

/// One entry of the operator-facing log stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEvent {
    pub timestamp: DateTime<Local>,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub message: String,
    #[serde(default)]
    pub details: Value,
}

pub type EventReceiver = broadcast::Receiver<AgentEvent>;

/// Broadcast fan-out of [`AgentEvent`]s to any number of subscribers.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<AgentEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn emit(&self, kind: EventKind, message: impl Into<String>) {
        self.emit_with(kind, message, Value::Object(serde_json::Map::new()));
    }

    /// Log through `tracing` and publish. Having no subscribers is not an error.
    pub fn emit_with(&self, kind: EventKind, message: impl Into<String>, details: Value) {
        let message = message.into();
        match kind {
            EventKind::Error => tracing::error!(kind = ?kind, "{message}"),
            EventKind::Warning | EventKind::Escalate | EventKind::Security => {
                tracing::warn!(kind = ?kind, "{message}");
            }
            _ => tracing::info!(kind = ?kind, "{message}"),
        }

        let _ = self.sender.send(AgentEvent {
            timestamp: Local::now(),
            kind,
            message,
            details,
        });
    }
}
