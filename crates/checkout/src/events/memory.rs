//! In-memory webhook event queue for tests and local development.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{EventQueueError, StoredEvent, WebhookEventQueue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EventState {
    Pending,
    Processed,
    Failed,
}

struct MemoryEvent {
    event: StoredEvent,
    state: EventState,
}

/// Webhook event queue held entirely in memory.
#[derive(Default)]
pub struct MemoryEventQueue {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    events: Vec<MemoryEvent>,
    seen: HashMap<String, Uuid>,
}

impl MemoryEventQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of events parked as failed.
    pub async fn failed_count(&self) -> usize {
        let inner = self.inner.lock().await;
        inner
            .events
            .iter()
            .filter(|e| e.state == EventState::Failed)
            .count()
    }
}

#[async_trait]
impl WebhookEventQueue for MemoryEventQueue {
    async fn enqueue(
        &self,
        provider_event_id: &str,
        payload: &serde_json::Value,
    ) -> Result<bool, EventQueueError> {
        let mut inner = self.inner.lock().await;
        if inner.seen.contains_key(provider_event_id) {
            return Ok(false);
        }
        let id = Uuid::new_v4();
        inner.seen.insert(provider_event_id.to_string(), id);
        inner.events.push(MemoryEvent {
            event: StoredEvent {
                id,
                provider_event_id: provider_event_id.to_string(),
                payload: payload.clone(),
                attempts: 0,
            },
            state: EventState::Pending,
        });
        Ok(true)
    }

    async fn claim_pending(&self, limit: i64) -> Result<Vec<StoredEvent>, EventQueueError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .events
            .iter()
            .filter(|e| e.state == EventState::Pending)
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .map(|e| e.event.clone())
            .collect())
    }

    async fn mark_processed(&self, id: Uuid) -> Result<(), EventQueueError> {
        let mut inner = self.inner.lock().await;
        if let Some(e) = inner.events.iter_mut().find(|e| e.event.id == id) {
            e.event.attempts += 1;
            e.state = EventState::Processed;
        }
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, terminal: bool) -> Result<(), EventQueueError> {
        let mut inner = self.inner.lock().await;
        if let Some(e) = inner.events.iter_mut().find(|e| e.event.id == id) {
            e.event.attempts += 1;
            e.state = if terminal {
                EventState::Failed
            } else {
                EventState::Pending
            };
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn test_duplicate_enqueue_collapses() {
        let queue = MemoryEventQueue::new();
        let payload = json!({"type": "payment_intent.succeeded"});

        assert!(queue.enqueue("evt_1", &payload).await.expect("enqueue"));
        assert!(!queue.enqueue("evt_1", &payload).await.expect("enqueue"));
        assert_eq!(queue.claim_pending(10).await.expect("claim").len(), 1);
    }

    #[tokio::test]
    async fn test_mark_failed_requeues_until_terminal() {
        let queue = MemoryEventQueue::new();
        let payload = json!({});
        queue.enqueue("evt_1", &payload).await.expect("enqueue");

        let claimed = queue.claim_pending(10).await.expect("claim");
        let id = claimed.first().expect("one event").id;

        queue.mark_failed(id, false).await.expect("retryable");
        assert_eq!(queue.claim_pending(10).await.expect("claim").len(), 1);

        queue.mark_failed(id, true).await.expect("terminal");
        assert!(queue.claim_pending(10).await.expect("claim").is_empty());
        assert_eq!(queue.failed_count().await, 1);
    }
}
