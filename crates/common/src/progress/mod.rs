//! Progress bus - in-process publish/subscribe for stage updates
//!
//! Fans ingestion, embedding, and query progress out to connected push
//! subscribers. Delivery is best-effort broadcast: no persistence, no
//! replay, and slow subscribers drop events rather than blocking
//! publishers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Broadcast buffer size; lagging receivers skip over dropped events
const BUS_CAPACITY: usize = 1024;

/// Event channel names
pub mod channels {
    use crate::db::models::Source;

    pub fn sync_progress(source: Source) -> String {
        format!("sync:{}:progress", source)
    }

    pub fn sync_complete(source: Source) -> String {
        format!("sync:{}:complete", source)
    }

    pub fn sync_error(source: Source) -> String {
        format!("sync:{}:error", source)
    }

    pub const EMBEDDINGS_PROGRESS: &str = "embeddings:progress";
    pub const RAG_PROGRESS: &str = "rag:progress";
    pub const RAG_COMPLETE: &str = "rag:complete";
    pub const RAG_ERROR: &str = "rag:error";
}

/// One stage update on the bus
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Channel name, e.g. `sync:email:progress`
    pub channel: String,

    /// Sync id or query id this event belongs to
    pub scope_id: String,

    /// Owning principal, used by the push-channel edge to filter
    pub user_id: Option<String>,

    pub timestamp: DateTime<Utc>,

    pub payload: serde_json::Value,
}

impl ProgressEvent {
    pub fn new(
        channel: impl Into<String>,
        scope_id: impl Into<String>,
        user_id: Option<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            channel: channel.into(),
            scope_id: scope_id.into(),
            user_id,
            timestamp: Utc::now(),
            payload,
        }
    }
}

/// In-process broadcast hub
#[derive(Clone)]
pub struct ProgressBus {
    sender: broadcast::Sender<ProgressEvent>,
}

impl ProgressBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BUS_CAPACITY);
        Self { sender }
    }

    /// Publish an event. Best-effort: having no subscribers is not an
    /// error, and publishers never block.
    pub fn publish(&self, event: ProgressEvent) {
        tracing::trace!(
            channel = %event.channel,
            scope_id = %event.scope_id,
            "Progress event"
        );
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events; callers filter by user or channel
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.sender.subscribe()
    }

    /// Currently connected subscriber count
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ProgressBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::Source;

    #[tokio::test]
    async fn test_publish_and_receive() {
        let bus = ProgressBus::new();
        let mut receiver = bus.subscribe();

        bus.publish(ProgressEvent::new(
            channels::sync_progress(Source::Email),
            "sync-1",
            Some("u".to_string()),
            serde_json::json!({"stage": "fetching", "percentage": 10}),
        ));

        let event = receiver.recv().await.unwrap();
        assert_eq!(event.channel, "sync:email:progress");
        assert_eq!(event.scope_id, "sync-1");
        assert_eq!(event.user_id.as_deref(), Some("u"));
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let bus = ProgressBus::new();
        // Must not panic or error
        bus.publish(ProgressEvent::new(
            channels::RAG_PROGRESS,
            "q-1",
            None,
            serde_json::json!({}),
        ));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_events_arrive_in_publish_order() {
        let bus = ProgressBus::new();
        let mut receiver = bus.subscribe();

        for i in 0..5 {
            bus.publish(ProgressEvent::new(
                channels::EMBEDDINGS_PROGRESS,
                "run-1",
                None,
                serde_json::json!({"seq": i}),
            ));
        }

        for i in 0..5 {
            let event = receiver.recv().await.unwrap();
            assert_eq!(event.payload["seq"], i);
        }
    }
}
