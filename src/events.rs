//! Notifications for whatever presents memos to the user.
//!
//! Events are fire-and-forget: publishing with nobody listening is fine, and
//! a subscriber that falls behind loses the oldest events.

use serde::Serialize;
use std::fmt;
use tokio::sync::broadcast;

use crate::models::Memo;

const DEFAULT_CAPACITY: usize = 64;

/// State of the save-everything pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Local edits are waiting to be pushed.
    Dirty,
    Processing,
    Failed,
    Success,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncStatus::Dirty => write!(f, "dirty"),
            SyncStatus::Processing => write!(f, "processing"),
            SyncStatus::Failed => write!(f, "failed"),
            SyncStatus::Success => write!(f, "success"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MemoEvent {
    /// The server assigned `new_id` to the locally created memo `old_id`.
    IdChanged { old_id: i64, new_id: i64 },
    Deleted(i64),
    /// Free text for a status area.
    Status(String),
    SyncStatus(SyncStatus),
    /// The memo currently on screen was merged with a newer server copy.
    OpenMemoReplaced(Memo),
}

#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<MemoEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MemoEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: MemoEvent) {
        tracing::debug!(?event, "emitting event");
        let _ = self.sender.send(event);
    }

    pub fn status(&self, message: impl Into<String>) {
        self.emit(MemoEvent::Status(message.into()));
    }

    pub fn sync_status(&self, status: SyncStatus) {
        self.emit(MemoEvent::SyncStatus(status));
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::new();
        bus.emit(MemoEvent::Deleted(1));
    }

    #[tokio::test]
    async fn test_subscriber_receives_in_order() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.emit(MemoEvent::IdChanged {
            old_id: -2,
            new_id: 3,
        });
        bus.sync_status(SyncStatus::Success);

        assert_eq!(
            rx.recv().await.unwrap(),
            MemoEvent::IdChanged {
                old_id: -2,
                new_id: 3
            }
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            MemoEvent::SyncStatus(SyncStatus::Success)
        );
    }

    #[test]
    fn test_sync_status_display() {
        assert_eq!(SyncStatus::Processing.to_string(), "processing");
        assert_eq!(
            serde_json::to_string(&SyncStatus::Failed).unwrap(),
            "\"failed\""
        );
    }
}
