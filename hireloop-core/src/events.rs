//! Status events: broadcast to subscribers and mirrored into `tracing`.
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Info => "info",
            Severity::Success => "success",
            Severity::Warning => "warning",
            Severity::Error => "error",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusEvent {
    pub message: String,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
}

/// Bounded, lossy fan-out. Emitting never blocks; with no subscribers the
/// event only reaches the log.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<StatusEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, severity: Severity, message: impl Into<String>) -> StatusEvent {
        let event = StatusEvent {
            message: message.into(),
            severity,
            timestamp: Utc::now(),
        };
        match severity {
            Severity::Info | Severity::Success => {
                tracing::info!(severity = %severity, "{}", event.message)
            }
            Severity::Warning => tracing::warn!("{}", event.message),
            Severity::Error => tracing::error!("{}", event.message),
        }
        let _ = self.tx.send(event.clone());
        event
    }

    pub fn info(&self, message: impl Into<String>) -> StatusEvent {
        self.emit(Severity::Info, message)
    }

    pub fn success(&self, message: impl Into<String>) -> StatusEvent {
        self.emit(Severity::Success, message)
    }

    pub fn warning(&self, message: impl Into<String>) -> StatusEvent {
        self.emit(Severity::Warning, message)
    }

    pub fn error(&self, message: impl Into<String>) -> StatusEvent {
        self.emit(Severity::Error, message)
    }
}
