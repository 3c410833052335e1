//! Background workers: webhook settlement and reservation expiry.
//!
//! One in-process settlement worker drains the durable event queue; a
//! second loop sweeps reservations older than the configured TTL. Both are
//! spawned from `main` and run until the process exits.

use std::sync::Arc;
use std::time::Duration;

use crate::events::{EventQueueError, StoredEvent, WebhookEventQueue};
use crate::payments::webhook;
use crate::reconcile;
use crate::store::InventoryStore;

/// Events claimed per polling pass.
const CLAIM_BATCH: i64 = 16;

/// Attempts before a transiently failing event is parked as failed.
pub const MAX_ATTEMPTS: i32 = 5;

/// Polling interval for the settlement worker.
const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Sweep interval for expired reservations.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Drain one batch of pending events. Returns how many were claimed.
///
/// # Errors
///
/// Returns [`EventQueueError`] when the queue itself is unreachable;
/// per-event failures are recorded on the event and do not abort the batch.
pub async fn run_once(
    queue: &dyn WebhookEventQueue,
    store: &dyn InventoryStore,
) -> Result<usize, EventQueueError> {
    let events = queue.claim_pending(CLAIM_BATCH).await?;
    let claimed = events.len();

    for event in events {
        process_one(queue, store, &event).await?;
    }

    Ok(claimed)
}

async fn process_one(
    queue: &dyn WebhookEventQueue,
    store: &dyn InventoryStore,
    stored: &StoredEvent,
) -> Result<(), EventQueueError> {
    let event = match webhook::parse_event(&stored.payload) {
        Ok(event) => event,
        Err(e) => {
            // Retrying cannot fix a malformed payload.
            tracing::error!(
                event_id = stored.provider_event_id,
                error = %e,
                "stored webhook event unparseable; parking as failed"
            );
            return queue.mark_failed(stored.id, true).await;
        }
    };

    match reconcile::process_event(&event, store).await {
        Ok(outcome) => {
            tracing::debug!(
                event_id = stored.provider_event_id,
                outcome = ?outcome,
                "webhook event settled"
            );
            queue.mark_processed(stored.id).await
        }
        Err(e) => {
            let terminal = stored.attempts + 1 >= MAX_ATTEMPTS;
            if terminal {
                tracing::error!(
                    event_id = stored.provider_event_id,
                    attempts = stored.attempts + 1,
                    error = %e,
                    alert = "reconciliation_failure",
                    "webhook event exhausted retries; parking as failed"
                );
            } else {
                tracing::warn!(
                    event_id = stored.provider_event_id,
                    attempts = stored.attempts + 1,
                    error = %e,
                    "webhook event processing failed; will retry"
                );
            }
            queue.mark_failed(stored.id, terminal).await
        }
    }
}

/// Settlement worker loop. Never returns.
pub async fn run_event_worker(
    queue: Arc<dyn WebhookEventQueue>,
    store: Arc<dyn InventoryStore>,
) {
    tracing::info!("settlement worker started");
    loop {
        match run_once(queue.as_ref(), store.as_ref()).await {
            // Drained a full batch; poll again immediately.
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            Ok(n) if n == CLAIM_BATCH as usize => {}
            Ok(_) => tokio::time::sleep(POLL_INTERVAL).await,
            Err(e) => {
                tracing::error!(error = %e, "settlement worker pass failed");
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        }
    }
}

/// Reservation expiry loop. Never returns.
pub async fn run_reservation_sweeper(store: Arc<dyn InventoryStore>, ttl: chrono::Duration) {
    tracing::info!(ttl_secs = ttl.num_seconds(), "reservation sweeper started");
    loop {
        tokio::time::sleep(SWEEP_INTERVAL).await;
        match store.expire_reservations(ttl).await {
            Ok(0) => {}
            Ok(swept) => tracing::info!(swept, "expired reservations released"),
            Err(e) => tracing::error!(error = %e, "reservation sweep failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use quayside_core::{AddressId, BuyerId, ItemId, ItemStatus, Money};
    use serde_json::json;

    use crate::events::MemoryEventQueue;
    use crate::store::MemoryInventoryStore;

    use super::*;

    async fn reserved_store() -> (MemoryInventoryStore, Vec<ItemId>, BuyerId) {
        let store = MemoryInventoryStore::new();
        let items = vec![ItemId::generate(), ItemId::generate()];
        store.insert_item(items[0], Money::from_minor(1_000)).await;
        store.insert_item(items[1], Money::from_minor(2_000)).await;
        let buyer = BuyerId::generate();
        store.reserve(&items, buyer).await.expect("reserve");
        (store, items, buyer)
    }

    fn succeeded_payload(buyer: BuyerId, items: &[ItemId], amount: i64) -> serde_json::Value {
        let csv = items
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        json!({
            "id": "evt_worker_1",
            "type": "payment_intent.succeeded",
            "data": { "object": {
                "id": "pi_worker_1",
                "amount_received": amount,
                "metadata": {
                    "app": "quayside-checkout",
                    "buyer_id": buyer.to_string(),
                    "item_ids": csv,
                    "address_id": AddressId::generate().to_string(),
                    "declared_subtotal": "3000"
                }
            }}
        })
    }

    #[tokio::test]
    async fn test_run_once_settles_queued_event() {
        let (store, items, buyer) = reserved_store().await;
        let queue = MemoryEventQueue::new();
        queue
            .enqueue("evt_worker_1", &succeeded_payload(buyer, &items, 3_650))
            .await
            .expect("enqueue");

        let claimed = run_once(&queue, &store).await.expect("runs");
        assert_eq!(claimed, 1);
        for id in &items {
            assert_eq!(store.status_of(*id).await, Some(ItemStatus::Sold));
        }

        // Queue drained.
        let claimed = run_once(&queue, &store).await.expect("runs");
        assert_eq!(claimed, 0);
    }

    #[tokio::test]
    async fn test_unparseable_event_parked_as_failed() {
        let (store, _, _) = reserved_store().await;
        let queue = MemoryEventQueue::new();
        queue
            .enqueue(
                "evt_bad",
                &json!({"id": "evt_bad", "type": "payment_intent.succeeded"}),
            )
            .await
            .expect("enqueue");

        run_once(&queue, &store).await.expect("runs");
        assert_eq!(queue.failed_count().await, 1);

        // Parked events are not re-claimed.
        let claimed = run_once(&queue, &store).await.expect("runs");
        assert_eq!(claimed, 0);
    }
}
