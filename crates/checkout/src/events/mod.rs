//! Durable webhook event queue.
//!
//! The webhook endpoint acknowledges the provider synchronously after the
//! signature check and hands the payload to this queue; the worker claims
//! pending rows and runs settlement. Persisting the event first makes
//! processing failures observable and retryable instead of silently lost.

pub mod memory;
pub mod postgres;

pub use memory::MemoryEventQueue;
pub use postgres::PgEventQueue;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

/// Errors from the event queue.
#[derive(Debug, Error)]
pub enum EventQueueError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// A webhook event persisted for asynchronous processing.
#[derive(Debug, Clone)]
pub struct StoredEvent {
    pub id: Uuid,
    /// Provider-assigned event id; unique, collapses duplicate delivery.
    pub provider_event_id: String,
    pub payload: serde_json::Value,
    /// Processing attempts so far (before the current one).
    pub attempts: i32,
}

/// Queue of webhook events awaiting settlement processing.
#[async_trait]
pub trait WebhookEventQueue: Send + Sync {
    /// Persist an event for processing.
    ///
    /// Returns `false` when an event with the same provider event id was
    /// already stored (at-least-once delivery collapses here).
    ///
    /// # Errors
    ///
    /// `Database` on insert failure.
    async fn enqueue(
        &self,
        provider_event_id: &str,
        payload: &serde_json::Value,
    ) -> Result<bool, EventQueueError>;

    /// Claim up to `limit` pending events for processing.
    ///
    /// # Errors
    ///
    /// `Database` on query failure.
    async fn claim_pending(&self, limit: i64) -> Result<Vec<StoredEvent>, EventQueueError>;

    /// Mark an event as successfully processed.
    ///
    /// # Errors
    ///
    /// `Database` on update failure.
    async fn mark_processed(&self, id: Uuid) -> Result<(), EventQueueError>;

    /// Record a failed attempt. With `terminal` the event stops retrying
    /// and is parked as `failed` for operational follow-up.
    ///
    /// # Errors
    ///
    /// `Database` on update failure.
    async fn mark_failed(&self, id: Uuid, terminal: bool) -> Result<(), EventQueueError>;
}
